use std::io::Write;

use tracing::debug;

use crate::builtins::{self, BuiltinAction};
use crate::error::ShellError;
use crate::job_control::{self, TerminalControl};
use crate::jobs::{Job, JobTable, Pid};
use crate::reaper::Reaper;
use crate::spawner;

/// Everything the command loop owns: the job table, the terminal, and the
/// source of child status changes.
pub struct Shell<T: TerminalControl> {
    pub(crate) table: JobTable,
    pub(crate) terminal: T,
    pub(crate) reaper: Reaper,
    /// Process group that gets the terminal back after a foreground job.
    pub(crate) shell_pgid: Pid,
}

impl<T: TerminalControl> Shell<T> {
    pub fn new(terminal: T, reaper: Reaper, shell_pgid: Pid) -> Self {
        Self {
            table: JobTable::new(),
            terminal,
            reaper,
            shell_pgid,
        }
    }

    /// Apply status changes that arrived since the last call.
    pub fn reap_pending(&mut self) -> Result<usize, ShellError> {
        self.reaper.reap_pending(&mut self.table)
    }

    /// Track `job` and run it: as a built-in if its leading command is one,
    /// otherwise as a launched pipeline.
    pub fn run(
        &mut self,
        job: Job,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<BuiltinAction, ShellError> {
        let builtin = builtins::is_builtin(job.leading_program());
        let id = self.table.append(job);

        if builtin {
            return builtins::execute(self, id, stdout, stderr);
        }
        spawner::launch(self, id, stdout, stderr)?;
        Ok(BuiltinAction::Continue)
    }

    /// Kill every process that has not completed and forget all jobs.
    pub fn shutdown(&mut self) {
        if self.table.is_empty() {
            return;
        }
        debug!(jobs = self.table.len(), "shutting down");
        for id in self.table.ids() {
            let Some(job) = self.table.remove(id) else {
                continue;
            };
            for process in job.processes.iter().filter(|p| !p.completed) {
                if let Some(pid) = process.pid {
                    debug!(pid, "killing on exit");
                    let _ = job_control::kill_process(pid);
                }
            }
        }
    }
}
