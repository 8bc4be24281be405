//! Job table
//!
//! A job is a command line that is not being waited on in the foreground:
//! either started with `&` or stopped while in the foreground. Jobs are
//! numbered from 1; a new job takes one more than the highest live id.

use std::fmt;

use tickos_api::{Fd, Pid, ProcessStatus, STDIN_FILENO, STDOUT_FILENO};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Stopped,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Running => write!(f, "running"),
            JobStatus::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: usize,
    pub pid: Pid,
    pub command: String,
    pub status: JobStatus,
    /// Redirection handles the shell opened for this job
    pub stdin: Fd,
    pub stdout: Fd,
}

impl Job {
    /// Handles the shell has to close once the job is gone
    pub fn owned_handles(&self) -> Vec<Fd> {
        let stdin = (self.stdin != STDIN_FILENO).then_some(self.stdin);
        let stdout = (self.stdout != STDOUT_FILENO).then_some(self.stdout);
        stdin.into_iter().chain(stdout).collect()
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.id, self.command, self.status)
    }
}

/// What a wait report did to the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Finished(Job),
    Stopped(Job),
    Continued(Job),
}

#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Vec<Job>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pid: Pid, command: String, status: JobStatus, handles: (Fd, Fd)) -> usize {
        let id = self.jobs.iter().map(|job| job.id).max().unwrap_or(0) + 1;
        self.jobs.push(Job {
            id,
            pid,
            command,
            status,
            stdin: handles.0,
            stdout: handles.1,
        });
        id
    }

    pub fn get(&self, id: usize) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id == id)
    }

    /// Job named by `fg`/`bg`: the given id, or the newest job
    pub fn select(&self, id: Option<usize>) -> Option<&Job> {
        match id {
            Some(id) => self.get(id),
            None => self.jobs.iter().max_by_key(|job| job.id),
        }
    }

    pub fn set_status(&mut self, id: usize, status: JobStatus) {
        if let Some(job) = self.jobs.iter_mut().find(|job| job.id == id) {
            job.status = status;
        }
    }

    pub fn remove(&mut self, id: usize) -> Option<Job> {
        let index = self.jobs.iter().position(|job| job.id == id)?;
        Some(self.jobs.remove(index))
    }

    /// Applies the latest known status of `pid`. Only changes are
    /// returned, so a stopped job reported again stays quiet.
    pub fn update(&mut self, pid: Pid, status: ProcessStatus) -> Option<JobEvent> {
        let index = self.jobs.iter().position(|job| job.pid == pid)?;
        if status.is_terminated() {
            return Some(JobEvent::Finished(self.jobs.remove(index)));
        }
        let job = &mut self.jobs[index];
        match status {
            ProcessStatus::Stopped if job.status == JobStatus::Running => {
                job.status = JobStatus::Stopped;
                Some(JobEvent::Stopped(job.clone()))
            }
            ProcessStatus::Ready | ProcessStatus::Blocked if job.status == JobStatus::Stopped => {
                job.status = JobStatus::Running;
                Some(JobEvent::Continued(job.clone()))
            }
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_follow_the_highest_live_job() {
        let mut jobs = JobTable::new();
        assert_eq!(jobs.add(2, "busy".into(), JobStatus::Running, (0, 1)), 1);
        assert_eq!(jobs.add(3, "sleep 5".into(), JobStatus::Running, (0, 1)), 2);
        jobs.remove(1);
        assert_eq!(jobs.add(4, "cat".into(), JobStatus::Running, (0, 1)), 3);
        jobs.remove(2);
        jobs.remove(3);
        assert_eq!(jobs.add(5, "echo".into(), JobStatus::Running, (0, 1)), 1);
    }

    #[test]
    fn stop_is_reported_once() {
        let mut jobs = JobTable::new();
        jobs.add(2, "busy".into(), JobStatus::Running, (0, 1));
        assert!(matches!(jobs.update(2, ProcessStatus::Stopped), Some(JobEvent::Stopped(_))));
        assert_eq!(jobs.update(2, ProcessStatus::Stopped), None);
        assert_eq!(jobs.get(1).unwrap().to_string(), "[1] busy (stopped)");
        assert!(matches!(jobs.update(2, ProcessStatus::Blocked), Some(JobEvent::Continued(_))));
        assert_eq!(jobs.update(2, ProcessStatus::Ready), None);
        assert!(matches!(jobs.update(2, ProcessStatus::Signaled), Some(JobEvent::Finished(_))));
        assert!(jobs.is_empty());
    }

    #[test]
    fn unknown_pid_is_ignored() {
        let mut jobs = JobTable::new();
        assert_eq!(jobs.update(9, ProcessStatus::Exited), None);
    }

    #[test]
    fn owned_handles_skip_the_terminal() {
        let mut jobs = JobTable::new();
        jobs.add(2, "cat < a > b".into(), JobStatus::Running, (2, 3));
        jobs.add(3, "echo > c".into(), JobStatus::Running, (0, 4));
        assert_eq!(jobs.get(1).unwrap().owned_handles(), vec![2, 3]);
        assert_eq!(jobs.get(2).unwrap().owned_handles(), vec![4]);
    }
}
