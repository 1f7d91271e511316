use sysinfo::{Pid, Signal, System};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Terminate,
    Kill,
}

/// Lookup and signalling of host processes.
///
/// The default implementation matches by name, so any process whose command
/// line mentions the daemon counts as the daemon. A PID-file backed table can
/// replace it where that heuristic is too loose.
pub trait ProcessTable: Send + Sync {
    /// Pid of a process whose name is `needle` or whose arguments contain it.
    fn find(&self, needle: &str) -> Option<u32>;

    /// Returns whether the signal was delivered.
    fn signal(&self, pid: u32, signal: StopSignal) -> bool;
}

/// Scans the live process table on every call; nothing is cached because the
/// daemon may be started or killed by anyone.
#[derive(Debug, Default)]
pub struct SysinfoProcessTable;

impl ProcessTable for SysinfoProcessTable {
    fn find(&self, needle: &str) -> Option<u32> {
        let mut system = System::new();
        system.refresh_processes();
        let own_pid = std::process::id();

        system
            .processes()
            .values()
            .filter(|process| process.pid().as_u32() != own_pid)
            .filter(|process| matches_process(process.name(), process.cmd(), needle))
            .map(|process| process.pid().as_u32())
            .min()
    }

    fn signal(&self, pid: u32, signal: StopSignal) -> bool {
        let mut system = System::new();
        let pid = Pid::from_u32(pid);
        if !system.refresh_process(pid) {
            return false;
        }
        match system.process(pid) {
            Some(process) => match signal {
                StopSignal::Terminate => process.kill_with(Signal::Term).unwrap_or(false),
                StopSignal::Kill => process.kill(),
            },
            None => false,
        }
    }
}

pub fn matches_process(name: &str, cmd: &[String], needle: &str) -> bool {
    name == needle || cmd.iter().any(|arg| arg.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_by_name_or_argument() {
        assert!(matches_process("spotifyd", &[], "spotifyd"));
        assert!(matches_process(
            "ld-linux",
            &["/home/pi/.local/bin/spotifyd".into(), "--no-daemon".into()],
            "spotifyd"
        ));
        assert!(!matches_process("bash", &["bash".into()], "spotifyd"));
    }

    #[test]
    fn unknown_pid_cannot_be_signalled() {
        assert!(!SysinfoProcessTable.signal(u32::MAX - 1, StopSignal::Terminate));
    }
}
