use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// OS process id / process-group id.
pub type Pid = libc::pid_t;

/// Stable handle for a job inside the [`JobTable`]. Ids are never reused,
/// so their order is the order jobs were appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(u64);

/// Where a job's stdin/stdout comes from at the ends of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StdioMode {
    #[default]
    Inherit,
    File,
}

/// State derived from the flags of a job's processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Stopped,
    Completed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobState::Running => "running",
            JobState::Stopped => "stopped",
            JobState::Completed => "completed",
        })
    }
}

/// One pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Process {
    pub pid: Option<Pid>,
    pub argv: Vec<String>,
    pub input_file: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
    pub stopped: bool,
    pub completed: bool,
    /// Raw wait status of the last reported change.
    pub status: i32,
}

impl Process {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            pid: None,
            argv,
            input_file: None,
            output_file: None,
            stopped: false,
            completed: false,
            status: 0,
        }
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("")
    }
}

/// One pipeline: the unit of foreground/background control.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    /// `None` until the first stage is launched; then that stage's pid.
    pub pgid: Option<Pid>,
    pub processes: Vec<Process>,
    pub command_text: String,
    pub stdin_mode: StdioMode,
    pub stdout_mode: StdioMode,
    pub foreground: bool,
}

impl Job {
    pub fn new(processes: Vec<Process>, command_text: String, foreground: bool) -> Self {
        let stdin_mode = match processes.first() {
            Some(p) if p.input_file.is_some() => StdioMode::File,
            _ => StdioMode::Inherit,
        };
        let stdout_mode = match processes.last() {
            Some(p) if p.output_file.is_some() => StdioMode::File,
            _ => StdioMode::Inherit,
        };
        Self {
            pgid: None,
            processes,
            command_text,
            stdin_mode,
            stdout_mode,
            foreground,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.processes.iter().all(|p| p.completed)
    }

    pub fn is_stopped(&self) -> bool {
        !self.processes.iter().any(|p| p.completed) && self.processes.iter().any(|p| p.stopped)
    }

    pub fn state(&self) -> JobState {
        if self.is_completed() {
            JobState::Completed
        } else if self.is_stopped() {
            JobState::Stopped
        } else {
            JobState::Running
        }
    }

    /// Name of the leading program, used to recognize built-ins.
    pub fn leading_program(&self) -> &str {
        self.processes.first().map(Process::program).unwrap_or("")
    }

    /// Group id for display; `-1` for a job that never launched a stage.
    pub fn display_pgid(&self) -> Pid {
        self.pgid.unwrap_or(-1)
    }

    /// The live process with `pid`. Completed entries are skipped: their
    /// pid may already belong to a newer child.
    pub fn find_process(&mut self, pid: Pid) -> Option<&mut Process> {
        self.processes
            .iter_mut()
            .find(|p| !p.completed && p.pid == Some(pid))
    }

    pub fn clear_stopped(&mut self) {
        for process in &mut self.processes {
            process.stopped = false;
        }
    }
}

/// The shell's job table: every tracked pipeline, in insertion order.
#[derive(Debug)]
pub struct JobTable {
    jobs: BTreeMap<JobId, Job>,
    next_id: u64,
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTable {
    pub fn new() -> Self {
        Self {
            jobs: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Insert a job at the tail of the table.
    pub fn append(&mut self, job: Job) -> JobId {
        let id = JobId(self.next_id);
        self.next_id += 1;
        self.jobs.insert(id, job);
        id
    }

    pub fn remove(&mut self, id: JobId) -> Option<Job> {
        self.jobs.remove(&id)
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(&id)
    }

    pub fn get_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.jobs.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Snapshot of ids in table order. Safe to mutate the table while
    /// walking it.
    pub fn ids(&self) -> Vec<JobId> {
        self.jobs.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (JobId, &Job)> {
        self.jobs.iter().map(|(id, job)| (*id, job))
    }

    /// The live process with `pid`, in any job.
    pub fn find_process(&mut self, pid: Pid) -> Option<&mut Process> {
        self.jobs.values_mut().find_map(|job| job.find_process(pid))
    }

    /// Job led by group `pgid`. A job that has not completed wins over an
    /// unswept completed one holding a reused group id.
    pub fn find_job(&self, pgid: Pid) -> Option<JobId> {
        self.iter()
            .filter(|(_, job)| job.pgid == Some(pgid))
            .min_by_key(|(_, job)| job.is_completed())
            .map(|(id, _)| id)
    }

    /// First job, in table order, whose derived state is stopped.
    pub fn find_stopped_job(&self) -> Option<JobId> {
        self.iter()
            .find(|(_, job)| job.is_stopped())
            .map(|(id, _)| id)
    }

    /// Remove every completed job. Returns how many were removed.
    pub fn sweep_completed(&mut self) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, job| !job.is_completed());
        before - self.jobs.len()
    }
}

#[cfg(test)]
pub(crate) fn job_from(argvs: &[&[&str]], foreground: bool) -> Job {
    let processes = argvs
        .iter()
        .map(|argv| Process::new(argv.iter().map(|s| s.to_string()).collect()))
        .collect();
    let text = argvs
        .iter()
        .map(|argv| argv.join(" "))
        .collect::<Vec<_>>()
        .join(" | ");
    Job::new(processes, text, foreground)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_flags(flags: &[(bool, bool)]) -> Job {
        const TRUE: &[&str] = &["true"];
        let argvs = vec![TRUE; flags.len()];
        let mut job = job_from(&argvs, true);
        for (process, (stopped, completed)) in job.processes.iter_mut().zip(flags) {
            process.stopped = *stopped;
            process.completed = *completed;
        }
        job
    }

    fn launched(table: &mut JobTable, pgid: Pid, text: &str) -> JobId {
        let mut job = job_from(&[&[text]], false);
        job.pgid = Some(pgid);
        job.processes[0].pid = Some(pgid);
        table.append(job)
    }

    #[test]
    fn derived_state_all_completed() {
        assert_eq!(with_flags(&[(false, true), (false, true)]).state(), JobState::Completed);
    }

    #[test]
    fn derived_state_stopped_needs_no_completed_stage() {
        assert_eq!(with_flags(&[(true, false), (true, false)]).state(), JobState::Stopped);
        assert_eq!(with_flags(&[(true, false), (false, false)]).state(), JobState::Stopped);
        assert_eq!(with_flags(&[(true, false), (false, true)]).state(), JobState::Running);
    }

    #[test]
    fn derived_state_running() {
        assert_eq!(with_flags(&[(false, false)]).state(), JobState::Running);
        assert_eq!(with_flags(&[(false, true), (false, false)]).state(), JobState::Running);
    }

    #[test]
    fn state_display_strings() {
        assert_eq!(JobState::Completed.to_string(), "completed");
        assert_eq!(JobState::Stopped.to_string(), "stopped");
        assert_eq!(JobState::Running.to_string(), "running");
    }

    #[test]
    fn stdio_modes_follow_pipeline_ends() {
        let mut first = Process::new(vec!["sort".into()]);
        first.input_file = Some("in.txt".into());
        let mut last = Process::new(vec!["uniq".into()]);
        last.output_file = Some("out.txt".into());
        let job = Job::new(vec![first, last], "sort < in.txt | uniq > out.txt".into(), true);
        assert_eq!(job.stdin_mode, StdioMode::File);
        assert_eq!(job.stdout_mode, StdioMode::File);
        assert_eq!(job.display_pgid(), -1);
    }

    #[test]
    fn lookups_by_pid_and_pgid() {
        let mut table = JobTable::new();
        let a = launched(&mut table, 100, "a");
        let b = launched(&mut table, 200, "b");

        assert_eq!(table.find_job(200), Some(b));
        assert_eq!(table.find_job(100), Some(a));
        assert_eq!(table.find_job(300), None);
        assert!(table.find_process(100).is_some());
        assert!(table.find_process(999).is_none());
    }

    #[test]
    fn reused_pid_resolves_to_the_live_process() {
        let mut table = JobTable::new();
        let old = launched(&mut table, 700, "old");
        table.get_mut(old).unwrap().processes[0].completed = true;
        let new = launched(&mut table, 700, "new");

        assert_eq!(table.find_job(700), Some(new));
        table.find_process(700).unwrap().completed = true;

        assert_eq!(table.get(new).unwrap().state(), JobState::Completed);
        assert!(table.find_process(700).is_none());
    }

    #[test]
    fn find_stopped_job_returns_first_in_order() {
        let mut table = JobTable::new();
        let _running = launched(&mut table, 10, "running");
        let first = launched(&mut table, 20, "first");
        let second = launched(&mut table, 30, "second");
        for id in [first, second] {
            table.get_mut(id).unwrap().processes[0].stopped = true;
        }
        assert_eq!(table.find_stopped_job(), Some(first));
    }

    #[test]
    fn removing_head_keeps_rest_in_order() {
        let mut table = JobTable::new();
        let a = launched(&mut table, 1, "a");
        let b = launched(&mut table, 2, "b");
        let c = launched(&mut table, 3, "c");

        assert!(table.remove(a).is_some());
        assert_eq!(table.ids(), vec![b, c]);
        assert!(table.remove(a).is_none());
    }

    #[test]
    fn remove_during_snapshot_iteration() {
        let mut table = JobTable::new();
        for pgid in 1..=4 {
            launched(&mut table, pgid, "x");
        }
        for id in table.ids() {
            if table.get(id).and_then(|j| j.pgid).is_some_and(|g| g % 2 == 0) {
                table.remove(id);
            }
        }
        let left: Vec<_> = table.iter().map(|(_, j)| j.display_pgid()).collect();
        assert_eq!(left, vec![1, 3]);
    }

    #[test]
    fn sweep_is_idempotent_and_stable() {
        let mut table = JobTable::new();
        let a = launched(&mut table, 1, "a");
        let done = launched(&mut table, 2, "done");
        let c = launched(&mut table, 3, "c");
        table.get_mut(done).unwrap().processes[0].completed = true;

        assert_eq!(table.sweep_completed(), 1);
        assert_eq!(table.ids(), vec![a, c]);
        assert_eq!(table.sweep_completed(), 0);
        assert_eq!(table.ids(), vec![a, c]);
    }

    #[test]
    fn appended_ids_increase() {
        let mut table = JobTable::new();
        let a = table.append(job_from(&[&["a"]], true));
        table.remove(a);
        let b = table.append(job_from(&[&["b"]], true));
        assert!(b > a);
        assert_eq!(table.len(), 1);
    }
}
