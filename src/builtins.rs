use std::io::Write;

use tracing::debug;

use crate::error::ShellError;
use crate::job_control::{self, TerminalControl};
use crate::jobs::{JobId, JobTable, Pid};
use crate::shell::Shell;

/// The list of all builtin command names.
const BUILTINS: &[&str] = &["quit", "jobs", "cd", "bg", "fg"];

#[derive(Debug, PartialEq)]
pub enum BuiltinAction {
    Continue,
    Exit(i32),
}

/// Returns true if the command name is a shell builtin.
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Run the builtin named by job `id`. The job is only a placeholder for the
/// command line and is removed from the table before anything else happens.
pub fn execute<T: TerminalControl>(
    shell: &mut Shell<T>,
    id: JobId,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<BuiltinAction, ShellError> {
    let Some(job) = shell.table.remove(id) else {
        return Ok(BuiltinAction::Continue);
    };
    let argv = job
        .processes
        .into_iter()
        .next()
        .map(|p| p.argv)
        .unwrap_or_default();
    let Some((program, args)) = argv.split_first() else {
        return Ok(BuiltinAction::Continue);
    };
    debug!(builtin = %program, ?args, "dispatching builtin");

    match program.as_str() {
        "quit" => {
            shell.shutdown();
            Ok(BuiltinAction::Exit(0))
        }
        "jobs" => {
            builtin_jobs(&mut shell.table, stdout);
            Ok(BuiltinAction::Continue)
        }
        "cd" => {
            builtin_cd(args, stderr);
            Ok(BuiltinAction::Continue)
        }
        "bg" => {
            builtin_bg(shell, args, stderr);
            Ok(BuiltinAction::Continue)
        }
        "fg" => builtin_fg(shell, args, stdout, stderr).map(|()| BuiltinAction::Continue),
        _ => {
            let _ = writeln!(stderr, "dsh: unknown builtin: {program}");
            Ok(BuiltinAction::Continue)
        }
    }
}

/// Print every tracked job, then forget the completed ones.
fn builtin_jobs(table: &mut JobTable, stdout: &mut dyn Write) {
    for (_, job) in table.iter() {
        let _ = writeln!(
            stdout,
            "{}({}) {}",
            job.display_pgid(),
            job.state(),
            job.command_text
        );
    }
    table.sweep_completed();
}

fn builtin_cd(args: &[String], stderr: &mut dyn Write) {
    let target = match args {
        [dir] => dir.clone(),
        [] => match std::env::var("HOME") {
            Ok(home) => home,
            Err(_) => {
                let _ = writeln!(stderr, "cd: HOME not set");
                return;
            }
        },
        _ => {
            let _ = writeln!(stderr, "cd: too many arguments");
            return;
        }
    };

    if let Err(e) = std::env::set_current_dir(&target) {
        let _ = writeln!(stderr, "cd: {target}: {e}");
    }
}

/// Resume a stopped job in the background.
fn builtin_bg<T: TerminalControl>(shell: &mut Shell<T>, args: &[String], stderr: &mut dyn Write) {
    let Some((id, pgid)) = resolve_target("bg", args, &shell.table, stderr) else {
        return;
    };

    if let Err(e) = job_control::send_continue_to_group(pgid) {
        let _ = writeln!(stderr, "bg: kill (SIGCONT): {e}");
    }
    if let Some(job) = shell.table.get_mut(id) {
        job.clear_stopped();
    }
}

/// Bring a job to the foreground, continue it and wait for it.
fn builtin_fg<T: TerminalControl>(
    shell: &mut Shell<T>,
    args: &[String],
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<(), ShellError> {
    let Some((id, pgid)) = resolve_target("fg", args, &shell.table, stderr) else {
        return Ok(());
    };

    let _ = shell.terminal.grant_terminal(pgid);
    if let Err(e) = job_control::send_continue_to_group(pgid) {
        let _ = writeln!(stderr, "fg: kill (SIGCONT): {e}");
    }
    if let Some(job) = shell.table.get_mut(id) {
        job.clear_stopped();
    }

    // The terminal comes back to the shell even if the wait failed.
    let waited = shell.reaper.wait_for_job(&mut shell.table, id, stdout);
    let _ = shell.terminal.grant_terminal(shell.shell_pgid);
    let state = waited?;
    debug!(pgid, ?state, "fg returned");
    Ok(())
}

// ── Helpers ──

/// Pick the job a `bg`/`fg` acts on: the group named by the argument, or the
/// first stopped job. `None` means there is nothing to do; any problem has
/// already been reported.
fn resolve_target(
    name: &str,
    args: &[String],
    table: &JobTable,
    stderr: &mut dyn Write,
) -> Option<(JobId, Pid)> {
    match args {
        [] => {
            let id = table.find_stopped_job()?;
            let pgid = table.get(id)?.pgid?;
            Some((id, pgid))
        }
        [arg] => {
            let Ok(pgid) = arg.trim_start_matches('%').parse::<Pid>() else {
                let _ = writeln!(stderr, "{name}: {arg}: invalid process group id");
                return None;
            };
            match table.find_job(pgid) {
                Some(id) => Some((id, pgid)),
                None => {
                    let _ = writeln!(stderr, "{name}: {pgid}: no such job");
                    None
                }
            }
        }
        _ => {
            let _ = writeln!(stderr, "{name}: too many arguments");
            None
        }
    }
}
