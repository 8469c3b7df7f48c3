use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::RawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use crate::error::ShellError;
use crate::job_control::{self, TerminalControl};
use crate::jobs::{Job, JobId, Pid, StdioMode};
use crate::shell::Shell;
use crate::status;

/// Exit status recorded for a stage whose program could not be started.
const EXEC_FAILURE_CODE: i32 = 127;

/// Launch every stage of job `id` as one process group, wired with pipes.
///
/// Redirection files are opened before anything is forked; if one cannot be
/// opened the job is dropped from the table and nothing runs. A foreground
/// job owns the terminal until it stops or finishes, after which the shell
/// takes it back.
pub fn launch<T: TerminalControl>(
    shell: &mut Shell<T>,
    id: JobId,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<(), ShellError> {
    let Some(job) = shell.table.get(id) else {
        return Ok(());
    };
    let foreground = job.foreground;
    let command_text = job.command_text.clone();
    let stages: Vec<Vec<String>> = job.processes.iter().map(|p| p.argv.clone()).collect();

    let (input, output) = match open_redirections(job) {
        Ok(files) => files,
        Err(e) => {
            let _ = writeln!(err, "dsh: {e}");
            shell.table.remove(id);
            return Ok(());
        }
    };

    let tty = if foreground { shell.terminal.tty_fd() } else { None };
    let mut inbound = input.map(Stdio::from);
    let mut output = output.map(Stdio::from);
    let mut announced = false;
    let count = stages.len();

    for (i, argv) in stages.iter().enumerate() {
        let (stdout, next_inbound) = if i + 1 == count {
            (output.take(), None)
        } else {
            let (reader, writer) = os_pipe::pipe().map_err(ShellError::Pipe)?;
            (Some(Stdio::from(writer)), Some(Stdio::from(reader)))
        };

        let group = shell.table.get(id).and_then(|job| job.pgid);
        let spawned = spawn_stage(argv, inbound.take(), stdout, group.unwrap_or(0), tty);
        // The write end went into the stage's Command and is closed by now;
        // only the read end travels on to the next stage.
        inbound = next_inbound;

        let pid = match spawned {
            Ok(pid) => pid,
            Err(e) if is_fork_failure(&e) => return Err(ShellError::Fork(e)),
            Err(e) => {
                let _ = writeln!(err, "dsh: {}: {e}", argv[0]);
                if let Some(process) = shell.table.get_mut(id).map(|job| &mut job.processes[i]) {
                    process.completed = true;
                    process.status = status::exited_status(EXEC_FAILURE_CODE);
                }
                continue;
            }
        };

        let Some(job) = shell.table.get_mut(id) else {
            break;
        };
        let pgid = *job.pgid.get_or_insert(pid);
        job.processes[i].pid = Some(pid);
        if let Err(e) = job_control::set_process_group(pid, pgid) {
            warn!(pid, pgid, error = %e, "setpgid from the shell failed");
        }
        debug!(pid, pgid, stage = i, program = %argv[0], "stage launched");

        if !announced {
            announced = true;
            let _ = writeln!(out, "{pgid}(Lanuched): {command_text}");
            let _ = out.flush();
            if foreground {
                let _ = shell.terminal.grant_terminal(pgid);
            }
        }
    }

    if !foreground {
        return Ok(());
    }
    // A child may have taken the terminal before its exec failed, so the
    // shell reclaims it even when nothing was launched.
    let waited = if announced {
        shell.reaper.wait_for_job(&mut shell.table, id, out).map(Some)
    } else {
        Ok(None)
    };
    let _ = shell.terminal.grant_terminal(shell.shell_pgid);
    if let Some(state) = waited? {
        debug!(?state, "foreground job returned");
    }
    Ok(())
}

fn spawn_stage(
    argv: &[String],
    stdin: Option<Stdio>,
    stdout: Option<Stdio>,
    pgid: Pid,
    tty: Option<RawFd>,
) -> io::Result<Pid> {
    let mut command = Command::new(&argv[0]);
    command.args(&argv[1..]);
    if let Some(stdin) = stdin {
        command.stdin(stdin);
    }
    if let Some(stdout) = stdout {
        command.stdout(stdout);
    }
    // SAFETY: prepare_child only calls async-signal-safe functions.
    unsafe {
        command.pre_exec(move || job_control::prepare_child(pgid, tty));
    }

    let child = command.spawn()?;
    Ok(child.id() as Pid)
}

/// The kernel could not create the process at all, as opposed to the new
/// process failing to start its program.
fn is_fork_failure(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::EAGAIN | libc::ENOMEM))
}

fn open_redirections(job: &Job) -> io::Result<(Option<File>, Option<File>)> {
    let input = match (job.stdin_mode, job.processes.first().and_then(|p| p.input_file.as_deref())) {
        (StdioMode::File, Some(path)) => Some(open_input(path)?),
        _ => None,
    };
    let output = match (job.stdout_mode, job.processes.last().and_then(|p| p.output_file.as_deref())) {
        (StdioMode::File, Some(path)) => Some(open_output(path)?),
        _ => None,
    };
    Ok((input, output))
}

fn open_input(path: &Path) -> io::Result<File> {
    File::open(path).map_err(|e| annotate(path, e))
}

fn open_output(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o644)
        .open(path)
        .map_err(|e| annotate(path, e))
}

fn annotate(path: &Path, err: io::Error) -> io::Error {
    io::Error::new(err.kind(), format!("{}: {err}", path.display()))
}
