use std::io::{self, Write};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};

use signal_hook::consts::SIGCHLD;
use signal_hook::iterator::Signals;
use tracing::debug;

use crate::error::ShellError;
use crate::job_control;
use crate::jobs::{JobId, JobState, JobTable, Process};
use crate::status::{ChangeKind, StatusChange};

/// Pending SIGCHLD notices the channel holds. One is enough to trigger a
/// full drain; extras are dropped.
const NOTICE_CAPACITY: usize = 16;

/// Converts child status changes into job-table updates.
///
/// Foreground waits call [`Reaper::wait_for_job`]. Everything else arrives
/// as a SIGCHLD notice on a bounded channel and is applied when the command
/// loop calls [`Reaper::reap_pending`], so the table is only ever touched
/// from the loop's thread.
pub struct Reaper {
    notices: Receiver<()>,
}

impl Reaper {
    /// Start forwarding SIGCHLD notices from a signal thread.
    pub fn install() -> io::Result<Self> {
        let (tx, reaper) = Self::channel();
        let mut signals = Signals::new([SIGCHLD])?;
        std::thread::Builder::new()
            .name("sigchld".into())
            .spawn(move || {
                for _ in signals.forever() {
                    // Full means a drain is already pending.
                    let _ = tx.try_send(());
                }
            })?;
        Ok(reaper)
    }

    /// A reaper fed by the returned sender instead of a signal thread.
    pub fn channel() -> (SyncSender<()>, Self) {
        let (tx, rx) = mpsc::sync_channel(NOTICE_CAPACITY);
        (tx, Self { notices: rx })
    }

    /// Apply every status change the kernel has queued, if a notice says
    /// there may be some. Only flags and status words are written.
    pub fn reap_pending(&self, table: &mut JobTable) -> Result<usize, ShellError> {
        if !self.take_notices() {
            return Ok(0);
        }

        let mut applied = 0;
        while let Some((pid, raw)) = job_control::poll_any_child()? {
            if let Some(change) = StatusChange::decode(pid, raw) {
                apply(table, &change)?;
                applied += 1;
            }
        }
        Ok(applied)
    }

    fn take_notices(&self) -> bool {
        let mut pending = false;
        loop {
            match self.notices.try_recv() {
                Ok(()) => pending = true,
                Err(TryRecvError::Empty) => return pending,
                // No signal thread: poll every time.
                Err(TryRecvError::Disconnected) => return true,
            }
        }
    }

    /// Block until the job stops or every one of its processes has exited.
    /// Only the job's own process group is waited on.
    pub fn wait_for_job(
        &self,
        table: &mut JobTable,
        id: JobId,
        out: &mut dyn Write,
    ) -> Result<JobState, ShellError> {
        let Some(pgid) = table.get(id).and_then(|job| job.pgid) else {
            return Ok(table.get(id).map_or(JobState::Completed, |job| job.state()));
        };

        while let Some((pid, raw)) = job_control::wait_group(pgid)? {
            let Some(change) = StatusChange::decode(pid, raw) else {
                continue;
            };
            let process = table
                .get_mut(id)
                .and_then(|job| job.find_process(pid))
                .ok_or(ShellError::UnknownProcess(pid))?;
            record(process, &change);

            if let ChangeKind::Stopped(_) = change.kind {
                if let Some(job) = table.get(id) {
                    let _ = writeln!(out, "[{}]+ Stopped    {}", pgid, job.command_text);
                }
                return Ok(JobState::Stopped);
            }
        }

        Ok(table.get(id).map_or(JobState::Completed, |job| job.state()))
    }
}

/// Record one status change on the process it names. A pid the table does
/// not know means the table and the kernel disagree.
pub fn apply(table: &mut JobTable, change: &StatusChange) -> Result<(), ShellError> {
    let process = table
        .find_process(change.pid)
        .ok_or(ShellError::UnknownProcess(change.pid))?;
    record(process, change);
    Ok(())
}

fn record(process: &mut Process, change: &StatusChange) {
    match change.kind {
        ChangeKind::Stopped(_) => {
            process.stopped = true;
            process.completed = false;
        }
        ChangeKind::Exited(_) | ChangeKind::Signaled(_) => {
            process.completed = true;
            process.stopped = false;
        }
        ChangeKind::Continued => {
            process.stopped = false;
        }
    }
    if change.kind != ChangeKind::Continued {
        process.status = change.raw;
    }

    debug!(pid = change.pid, kind = ?change.kind, raw = change.raw, "child status changed");
}
