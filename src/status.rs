use crate::jobs::Pid;

/// What a `waitpid` report says happened to a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Exited(i32),
    Signaled(i32),
    Stopped(i32),
    Continued,
}

/// One child status change: the unit the reaper applies to the job table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub pid: Pid,
    pub kind: ChangeKind,
    /// The undecoded status word, kept on the process entry.
    pub raw: i32,
}

impl StatusChange {
    /// Decode a raw wait status. Returns `None` for words that describe none
    /// of the known transitions.
    pub fn decode(pid: Pid, raw: libc::c_int) -> Option<Self> {
        let kind = if libc::WIFSTOPPED(raw) {
            ChangeKind::Stopped(libc::WSTOPSIG(raw))
        } else if libc::WIFCONTINUED(raw) {
            ChangeKind::Continued
        } else if let Some(code) = exit_code_from_wait_status(raw) {
            if libc::WIFSIGNALED(raw) {
                ChangeKind::Signaled(libc::WTERMSIG(raw))
            } else {
                ChangeKind::Exited(code)
            }
        } else {
            return None;
        };
        Some(Self { pid, kind, raw })
    }
}

/// Shell-style exit code for a terminated child: the exit status, or
/// `128 + signal` when it was killed by a signal.
pub fn exit_code_from_wait_status(raw_status: libc::c_int) -> Option<i32> {
    if libc::WIFEXITED(raw_status) {
        return Some(libc::WEXITSTATUS(raw_status));
    }

    if libc::WIFSIGNALED(raw_status) {
        let signal = libc::WTERMSIG(raw_status);
        return Some(128 + signal);
    }

    None
}

/// Raw status word for a normal exit with `code`.
pub fn exited_status(code: i32) -> i32 {
    (code & 0xff) << 8
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn decodes_normal_exit() {
        let change = StatusChange::decode(42, exited_status(3)).unwrap();
        assert_eq!(change.kind, ChangeKind::Exited(3));
        assert_eq!(change.raw, 3 << 8);
        assert_eq!(exit_code_from_wait_status(change.raw), Some(3));
    }

    #[test]
    fn decodes_signal_death() {
        let change = StatusChange::decode(42, libc::SIGKILL).unwrap();
        assert_eq!(change.kind, ChangeKind::Signaled(libc::SIGKILL));
        assert_eq!(exit_code_from_wait_status(change.raw), Some(128 + libc::SIGKILL));
    }

    #[test]
    fn decodes_stop_and_continue() {
        let stopped = (libc::SIGTSTP << 8) | 0x7f;
        assert_eq!(
            StatusChange::decode(7, stopped).unwrap().kind,
            ChangeKind::Stopped(libc::SIGTSTP)
        );
        assert_eq!(StatusChange::decode(7, 0xffff).unwrap().kind, ChangeKind::Continued);
        assert_eq!(exit_code_from_wait_status(stopped), None);
    }
}
