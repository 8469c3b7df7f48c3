use std::io;
use std::os::fd::RawFd;

use tracing::{debug, warn};

use crate::jobs::Pid;

/// Signals a job-control shell keeps away from itself and hands back to
/// default in every child it launches.
const JOB_CONTROL_SIGNALS: [libc::c_int; 4] =
    [libc::SIGTSTP, libc::SIGTTIN, libc::SIGTTOU, libc::SIGQUIT];

/// Signals reset to `SIG_DFL` in a child right before the program image is
/// replaced.
const CHILD_DEFAULT_SIGNALS: [libc::c_int; 7] = [
    libc::SIGINT,
    libc::SIGQUIT,
    libc::SIGTSTP,
    libc::SIGTTIN,
    libc::SIGTTOU,
    libc::SIGCHLD,
    libc::SIGPIPE,
];

pub(crate) fn set_process_group(pid: Pid, pgid: Pid) -> io::Result<()> {
    loop {
        let rc = unsafe { libc::setpgid(pid, pgid) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(code) if code == libc::EINTR => continue,
            // Already exec'd or gone; the child set its own group.
            Some(code) if code == libc::EACCES || code == libc::ESRCH => return Ok(()),
            _ => return Err(err),
        }
    }
}

#[cfg(test)]
pub(crate) fn process_group_id(pid: Pid) -> io::Result<Pid> {
    loop {
        let rc = unsafe { libc::getpgid(pid) };
        if rc >= 0 {
            return Ok(rc);
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

/// Send `signal` to every process in group `pgid`.
pub(crate) fn signal_group(pgid: Pid, signal: libc::c_int) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid process group id",
        ));
    }

    loop {
        let rc = unsafe { libc::kill(-pgid, signal) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

pub(crate) fn send_continue_to_group(pgid: Pid) -> io::Result<()> {
    signal_group(pgid, libc::SIGCONT)
}

pub(crate) fn kill_process(pid: Pid) -> io::Result<()> {
    if unsafe { libc::kill(pid, libc::SIGKILL) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Blocking wait for the next stop or exit inside group `pgid`.
/// `Ok(None)` once the group has no children left to report.
pub(crate) fn wait_group(pgid: Pid) -> io::Result<Option<(Pid, libc::c_int)>> {
    wait_pid(-pgid, libc::WUNTRACED)
}

/// Non-blocking poll of any child for exits, stops and continues.
/// `Ok(None)` when nothing is pending or there are no children.
pub(crate) fn poll_any_child() -> io::Result<Option<(Pid, libc::c_int)>> {
    wait_pid(-1, libc::WNOHANG | libc::WUNTRACED | libc::WCONTINUED)
}

fn wait_pid(target: Pid, options: libc::c_int) -> io::Result<Option<(Pid, libc::c_int)>> {
    let mut raw_status: libc::c_int = 0;

    loop {
        let rc = unsafe { libc::waitpid(target, &mut raw_status, options) };
        if rc > 0 {
            return Ok(Some((rc, raw_status)));
        }
        if rc == 0 {
            return Ok(None);
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(code) if code == libc::EINTR => continue,
            Some(code) if code == libc::ECHILD => return Ok(None),
            _ => return Err(err),
        }
    }
}

/// Hands the controlling terminal to a process group.
pub trait TerminalControl {
    /// Make `pgid` the terminal's foreground process group.
    fn grant_terminal(&mut self, pgid: Pid) -> io::Result<()>;

    /// Descriptor children should use to take the terminal themselves, or
    /// `None` when there is no terminal to hand over.
    fn tty_fd(&self) -> Option<RawFd> {
        None
    }
}

/// The shell's controlling terminal. A no-op when the shell is not
/// interactive.
#[derive(Debug)]
pub struct Tty {
    fd: Option<RawFd>,
}

impl Tty {
    /// Set the shell up for job control. Interactive shells wait until they
    /// are in the foreground, ignore the job-control signals, move into
    /// their own process group and take the terminal. Returns the
    /// controller and the shell's process group.
    pub fn acquire(interactive: bool) -> io::Result<(Self, Pid)> {
        if !interactive {
            ignore_signal(libc::SIGTSTP)?;
            return Ok((Self { fd: None }, unsafe { libc::getpgrp() }));
        }

        let fd = libc::STDIN_FILENO;
        loop {
            let shell_pgid = unsafe { libc::getpgrp() };
            let foreground = unsafe { libc::tcgetpgrp(fd) };
            if foreground < 0 {
                return Err(io::Error::last_os_error());
            }
            if foreground == shell_pgid {
                break;
            }
            signal_group(shell_pgid, libc::SIGTTIN)?;
        }

        for signal in JOB_CONTROL_SIGNALS {
            ignore_signal(signal)?;
        }

        let shell_pid = unsafe { libc::getpid() };
        if unsafe { libc::getpgrp() } != shell_pid {
            set_process_group(shell_pid, shell_pid)?;
        }
        set_terminal_foreground(fd, shell_pid)?;
        debug!(pgid = shell_pid, "shell owns the terminal");

        Ok((Self { fd: Some(fd) }, shell_pid))
    }
}

impl TerminalControl for Tty {
    fn grant_terminal(&mut self, pgid: Pid) -> io::Result<()> {
        match self.fd {
            Some(fd) => set_terminal_foreground(fd, pgid).inspect_err(|e| {
                warn!(pgid, error = %e, "cannot hand over the terminal");
            }),
            None => Ok(()),
        }
    }

    fn tty_fd(&self) -> Option<RawFd> {
        self.fd
    }
}

fn ignore_signal(signal: libc::c_int) -> io::Result<()> {
    if unsafe { libc::signal(signal, libc::SIG_IGN) } == libc::SIG_ERR {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Child-side half of a launch: join `pgid` (0 = own pid), optionally take
/// the terminal, and restore default signal handling. Runs between fork and
/// exec, so it only makes async-signal-safe calls.
pub(crate) fn prepare_child(pgid: Pid, tty: Option<RawFd>) -> io::Result<()> {
    let pid = unsafe { libc::getpid() };
    let pgid = if pgid == 0 { pid } else { pgid };
    set_process_group(0, pgid)?;

    if let Some(fd) = tty {
        // SIGTTOU is still ignored here, inherited from the shell.
        if unsafe { libc::tcsetpgrp(fd, pgid) } != 0 {
            return Err(io::Error::last_os_error());
        }
    }

    for signal in CHILD_DEFAULT_SIGNALS {
        unsafe { libc::signal(signal, libc::SIG_DFL) };
    }
    Ok(())
}

struct SignalIgnoreGuard {
    signal: libc::c_int,
    previous: libc::sighandler_t,
}

impl SignalIgnoreGuard {
    fn ignore(signal: libc::c_int) -> io::Result<Self> {
        let previous = unsafe { libc::signal(signal, libc::SIG_IGN) };
        if previous == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { signal, previous })
    }
}

impl Drop for SignalIgnoreGuard {
    fn drop(&mut self) {
        unsafe {
            libc::signal(self.signal, self.previous);
        }
    }
}

fn set_terminal_foreground(fd: RawFd, pgid: Pid) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid process group id",
        ));
    }

    let _sigttou = SignalIgnoreGuard::ignore(libc::SIGTTOU)?;
    loop {
        let rc = unsafe { libc::tcsetpgrp(fd, pgid) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

/// Terminal controller for tests: records every grant instead of touching a
/// real terminal.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingTerminal {
    pub grants: Vec<Pid>,
    /// Handed to children as their terminal when set.
    pub tty: Option<RawFd>,
}

#[cfg(test)]
impl TerminalControl for RecordingTerminal {
    fn grant_terminal(&mut self, pgid: Pid) -> io::Result<()> {
        self.grants.push(pgid);
        Ok(())
    }

    fn tty_fd(&self) -> Option<RawFd> {
        self.tty
    }
}
