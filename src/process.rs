// Process presence - detects (and optionally terminates) running Chrome processes
use std::thread;
use std::time::{Duration, Instant};
use sysinfo::{Pid, Process, Signal, System};
use tracing::{debug, info, warn};

pub const CHROME_PROCESS: &str = "chrome";
const FORCE_CLOSE_GRACE: Duration = Duration::from_secs(3);
const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub trait ProcessProbe {
    /// Number of live processes whose name contains `name` (case-insensitive).
    fn running_count(&self, name: &str) -> usize;

    fn is_running(&self, name: &str) -> bool {
        self.running_count(name) > 0
    }

    /// Terminate matching processes; returns how many were signalled.
    fn force_close(&self, name: &str) -> usize;
}

/// Live process table via sysinfo. Never matches the current process.
pub struct SystemProcesses;

impl SystemProcesses {
    fn snapshot() -> System {
        let mut system = System::new();
        system.refresh_processes();
        system
    }

    fn matching_pids(system: &System, name: &str) -> Vec<Pid> {
        let own = sysinfo::get_current_pid().ok();
        system
            .processes()
            .values()
            .filter(|p| Some(p.pid()) != own)
            .filter(|p| name_matches(p.name(), name))
            .map(Process::pid)
            .collect()
    }
}

impl ProcessProbe for SystemProcesses {
    fn running_count(&self, name: &str) -> usize {
        let system = Self::snapshot();
        let count = Self::matching_pids(&system, name).len();
        debug!("{} process(es) matching '{}'", count, name);
        count
    }

    fn force_close(&self, name: &str) -> usize {
        let mut system = Self::snapshot();
        let pids = Self::matching_pids(&system, name);
        info!("Terminating {} '{}' process(es)...", pids.len(), name);

        for pid in &pids {
            if let Some(process) = system.process(*pid) {
                // Platforms without SIGTERM get a hard kill straight away
                if process.kill_with(Signal::Term).is_none() {
                    process.kill();
                }
            }
        }

        let deadline = Instant::now() + FORCE_CLOSE_GRACE;
        loop {
            system.refresh_processes();
            let alive: Vec<Pid> = pids
                .iter()
                .copied()
                .filter(|pid| system.process(*pid).is_some())
                .collect();
            if alive.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                warn!("{} process(es) ignored terminate; killing", alive.len());
                for pid in alive {
                    if let Some(process) = system.process(pid) {
                        process.kill();
                    }
                }
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }

        pids.len()
    }
}

fn name_matches(process_name: &str, target: &str) -> bool {
    process_name
        .to_lowercase()
        .contains(&target.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_matching_is_case_insensitive_substring() {
        assert!(name_matches("chrome", CHROME_PROCESS));
        assert!(name_matches("Google Chrome Helper (Renderer)", CHROME_PROCESS));
        assert!(name_matches("chrome.exe", CHROME_PROCESS));
        assert!(!name_matches("firefox", CHROME_PROCESS));
    }

    #[test]
    fn test_current_process_is_never_counted() {
        let system = SystemProcesses::snapshot();
        let own = sysinfo::get_current_pid().unwrap();
        let own_name = system.process(own).map(|p| p.name().to_string());
        if let Some(own_name) = own_name {
            let pids = SystemProcesses::matching_pids(&system, &own_name);
            assert!(!pids.contains(&own));
        }
    }
}
