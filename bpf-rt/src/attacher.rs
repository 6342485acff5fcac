//! The daemon's attach loop: for each requested tracepoint, find the pinned
//! program the loader left behind, open it, and bind it to the kernel
//! tracepoint. Process-level concerns (argv overwrite, thread name,
//! scheduling priority, blocking forever) live in the `attacher` binary,
//! since they aren't meaningfully testable as library code.

use std::fs;
use std::path::Path;

use crate::paths;
use crate::sys;

/// Outcome of attaching a single requested tracepoint.
#[derive(Debug, PartialEq, Eq)]
pub enum AttachOutcome {
    Attached,
    NotPinned,
    OpenFailed(String),
    AttachFailed(String),
}

/// Attempts to attach `program_name`'s pinned program for `category/event`,
/// under `bpf_root`. Never panics or aborts the caller; every failure is
/// returned as an [`AttachOutcome`] variant for the caller to log.
pub fn attach_one(bpf_root: &str, program_name: &str, category: &str, event: &str) -> AttachOutcome {
    let expected_name = paths::tracepoint_pin_name(program_name, category, event);
    let pin_path = Path::new(bpf_root).join(&expected_name);
    if !is_regular_file(&pin_path) {
        return AttachOutcome::NotPinned;
    }

    let prog_fd = match sys::open_pinned(&pin_path) {
        Ok(fd) => fd,
        Err(e) => return AttachOutcome::OpenFailed(e.to_string()),
    };
    match sys::attach_tracepoint(prog_fd, category, event) {
        Ok(_perf_fd) => AttachOutcome::Attached,
        Err(e) => AttachOutcome::AttachFailed(e.to_string()),
    }
}

/// Attaches every requested `category/event` tracepoint, logging each
/// outcome and continuing past failures, per the daemon's "no failure
/// aborts" policy.
pub fn attach_all(bpf_root: &str, program_name: &str, tracepoints: &[(String, String)]) -> Vec<AttachOutcome> {
    tracepoints
        .iter()
        .map(|(category, event)| {
            let outcome = attach_one(bpf_root, program_name, category, event);
            match &outcome {
                AttachOutcome::Attached => {
                    log::info!("attached {program_name} to tracepoint {category}/{event}")
                }
                AttachOutcome::NotPinned => {
                    log::warn!("no pinned program found for {program_name} tracepoint {category}/{event}")
                }
                AttachOutcome::OpenFailed(msg) => {
                    log::warn!("failed to open pinned program for {category}/{event}: {msg}")
                }
                AttachOutcome::AttachFailed(msg) => {
                    log::warn!("failed to attach {program_name} to {category}/{event}: {msg}")
                }
            }
            outcome
        })
        .collect()
}

fn is_regular_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_pin_is_reported_as_not_pinned() {
        let dir = tempdir().unwrap();
        let outcome = attach_one(dir.path().to_str().unwrap(), "util_monitor", "sched", "sched_switch");
        assert_eq!(outcome, AttachOutcome::NotPinned);
    }

    #[test]
    fn attach_all_continues_past_individual_failures() {
        let dir = tempdir().unwrap();
        let tracepoints = vec![
            ("sched".to_string(), "sched_switch".to_string()),
            ("sched".to_string(), "sched_wakeup".to_string()),
        ];
        let outcomes = attach_all(dir.path().to_str().unwrap(), "util_monitor", &tracepoints);
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| *o == AttachOutcome::NotPinned));
    }

    #[test]
    fn candidate_name_matches_expected_pin_filename() {
        let dir = tempdir().unwrap();
        let expected = paths::tracepoint_pin_name("util_monitor", "sched", "sched_switch");
        std::fs::write(dir.path().join(&expected), b"not a real fd, just presence").unwrap();
        // open_pinned will fail against this non-BPF file, which is expected:
        // this test only verifies the "found pinned object" branch is taken.
        let outcome = attach_one(dir.path().to_str().unwrap(), "util_monitor", "sched", "sched_switch");
        assert!(matches!(outcome, AttachOutcome::OpenFailed(_)));
    }
}
