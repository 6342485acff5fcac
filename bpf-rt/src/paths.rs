//! Naming conventions for object-file sections and pinned BPF objects.

pub const BPF_ROOT: &str = "/sys/fs/bpf";

pub const MAP_SECTION_PREFIX: &str = "bpf_map_";
pub const PROG_SECTION_PREFIX: &str = "bpf_prog_";
pub const LICENSE_SECTION: &str = "license";
pub const DEFAULT_LICENSE: &str = "GPL";

/// The kernel's BPF program type enum, restricted to the tags this loader
/// recognizes by section-name prefix (see the prefix table in
/// [`program_kind`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgramKind {
    Unspecified,
    SocketFilter,
    Kprobe,
    SchedCls,
    TracePoint,
    Xdp,
    PerfEvent,
    CgroupSkb,
    CgroupSock,
}

impl ProgramKind {
    /// The numeric `BPF_PROG_TYPE_*` value the kernel expects in `prog_load`.
    pub fn as_kernel_value(self) -> u32 {
        match self {
            ProgramKind::Unspecified => 0,
            ProgramKind::SocketFilter => 1,
            ProgramKind::Kprobe => 2,
            ProgramKind::SchedCls => 3,
            ProgramKind::TracePoint => 5,
            ProgramKind::Xdp => 6,
            ProgramKind::PerfEvent => 7,
            ProgramKind::CgroupSkb => 8,
            ProgramKind::CgroupSock => 9,
        }
    }
}

const PREFIX_TABLE: &[(&str, ProgramKind)] = &[
    ("skfilter", ProgramKind::SocketFilter),
    ("kprobe", ProgramKind::Kprobe),
    ("uprobe", ProgramKind::Kprobe),
    ("schedcls", ProgramKind::SchedCls),
    ("tracepoint", ProgramKind::TracePoint),
    ("xdp", ProgramKind::Xdp),
    ("perf_event", ProgramKind::PerfEvent),
    ("cgroupskb", ProgramKind::CgroupSkb),
    ("cgroupsock", ProgramKind::CgroupSock),
];

/// Matches the tag immediately following [`PROG_SECTION_PREFIX`] against the
/// fixed prefix table. Unrecognized tags yield `Unspecified`, which the
/// kernel will itself reject.
pub fn program_kind(section_name: &str) -> ProgramKind {
    let Some(tag_and_path) = section_name.strip_prefix(PROG_SECTION_PREFIX) else {
        return ProgramKind::Unspecified;
    };
    PREFIX_TABLE
        .iter()
        .find(|(tag, _)| tag_and_path.starts_with(*tag))
        .map(|(_, kind)| *kind)
        .unwrap_or(ProgramKind::Unspecified)
}

/// Strips the program-section prefix, leaving the kind tag followed by the
/// `<category>/<event>` tracepoint path, then replaces `/` with `_`. The
/// kind tag is kept: `bpf_prog_tracepoint/sched/sched_switch` becomes
/// `tracepoint_sched_sched_switch`, matching `getBpfProgName` in the original.
pub fn prog_pin_name(section_name: &str) -> String {
    let without_prefix = section_name
        .strip_prefix(PROG_SECTION_PREFIX)
        .unwrap_or(section_name);
    without_prefix.replace('/', "_")
}

/// `<bpf-root>/map_<program-name>_<map-name>`.
pub fn map_pin_path(bpf_root: &str, program_name: &str, map_name: &str) -> std::path::PathBuf {
    std::path::Path::new(bpf_root).join(format!("map_{program_name}_{map_name}"))
}

/// `<bpf-root>/prog_<program-name>_<pin-name>`, where `pin-name` already has
/// any path separators normalized to underscores.
pub fn prog_pin_path(bpf_root: &str, program_name: &str, pin_name: &str) -> std::path::PathBuf {
    std::path::Path::new(bpf_root).join(format!("prog_{program_name}_{pin_name}"))
}

/// The attacher's candidate filename for a `<category>/<event>` tracepoint
/// pinned by a loader run with the given program name.
pub fn tracepoint_pin_name(program_name: &str, category: &str, event: &str) -> String {
    format!("prog_{program_name}_tracepoint_{category}_{event}")
}

/// The relocation section name that accompanies program section `section_name`.
pub fn relocation_section_name(section_name: &str) -> String {
    format!(".rel{section_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kprobe_and_uprobe_share_a_kind() {
        assert_eq!(program_kind("bpf_prog_kprobe/do_sys_open"), ProgramKind::Kprobe);
        assert_eq!(program_kind("bpf_prog_uprobe/some_lib"), ProgramKind::Kprobe);
    }

    #[test]
    fn unknown_prefix_is_unspecified() {
        assert_eq!(program_kind("bpf_prog_unknownthing/x"), ProgramKind::Unspecified);
    }

    #[test]
    fn pin_name_strips_prefix_and_normalizes_path_keeping_the_tag() {
        assert_eq!(
            prog_pin_name("bpf_prog_tracepoint/sched/sched_switch"),
            "tracepoint_sched_sched_switch"
        );
    }

    #[test]
    fn tracepoint_filename_law() {
        assert_eq!(
            tracepoint_pin_name("util_monitor", "sched", "sched_switch"),
            "prog_util_monitor_tracepoint_sched_sched_switch"
        );
    }

    #[test]
    fn relocation_name_prefixes_with_dot_rel() {
        assert_eq!(
            relocation_section_name("bpf_prog_tracepoint/sched/sched_switch"),
            ".relbpf_prog_tracepoint/sched/sched_switch"
        );
    }
}
