//! Process identity for in-progress download claims
//!
//! A claim records the pid and the start time of the process holding it.
//! The start time tells a live owner apart from a later process that
//! reused the same pid.

use std::sync::OnceLock;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

static CURRENT: OnceLock<ProcessOwner> = OnceLock::new();

/// The process that holds an in-progress claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOwner {
    pub pid: u32,
    /// Process start time, seconds since the epoch
    pub started: i64,
}

impl ProcessOwner {
    /// The running process
    pub fn current() -> Self {
        *CURRENT.get_or_init(|| {
            let pid = std::process::id();
            let mut system = System::new();
            let started = start_time(&mut system, pid).unwrap_or(0);
            Self { pid, started }
        })
    }

    /// Whether this exact process is still running
    pub fn is_alive(&self) -> bool {
        let mut system = System::new();
        self.is_alive_in(&mut system)
    }

    pub(crate) fn is_alive_in(&self, system: &mut System) -> bool {
        if *self == Self::current() {
            return true;
        }
        start_time(system, self.pid) == Some(self.started)
    }
}

fn start_time(system: &mut System, pid: u32) -> Option<i64> {
    let pid = Pid::from_u32(pid);
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing(),
    );
    system
        .process(pid)
        .and_then(|process| i64::try_from(process.start_time()).ok())
}
