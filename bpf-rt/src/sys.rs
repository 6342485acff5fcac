//! Kernel Interface (KI): thin wrappers over the `bpf(2)` syscall family and
//! the performance-event interface, each built from a zero-initialized
//! kernel-ABI union, mirroring `cu_libbpf.h` in the original C loader.
//!
//! This module never links a general-purpose BPF library; every struct below
//! is a minimal hand-rolled view of the relevant slice of `linux/bpf.h` and
//! `linux/perf_event.h`, built through [`libc::syscall`] directly.

use std::ffi::CString;
use std::fs;
use std::mem::size_of;
use std::path::Path;

use crate::error::{Error, Result};
use crate::map::MapFlags;

const BPF_OBJ_NAME_LEN: usize = 16;
const BPF_MAXINSNS: usize = 4096;
pub const BPF_PSEUDO_MAP_FD: u8 = 1;

const BPF_MAP_CREATE: libc::c_long = 0;
const BPF_MAP_LOOKUP_ELEM: libc::c_long = 1;
const BPF_MAP_UPDATE_ELEM: libc::c_long = 2;
const BPF_MAP_DELETE_ELEM: libc::c_long = 3;
const BPF_PROG_LOAD: libc::c_long = 5;
const BPF_OBJ_PIN: libc::c_long = 6;
const BPF_OBJ_GET: libc::c_long = 7;

const PERF_TYPE_TRACEPOINT: u32 = 2;

#[repr(C)]
#[derive(Clone, Copy)]
struct MapCreateAttr {
    map_type: u32,
    key_size: u32,
    value_size: u32,
    max_entries: u32,
    map_flags: u32,
    inner_map_fd: u32,
    numa_node: u32,
    map_name: [u8; BPF_OBJ_NAME_LEN],
    map_ifindex: u32,
    btf_fd: u32,
    btf_key_type_id: u32,
    btf_value_type_id: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct ProgLoadAttr {
    prog_type: u32,
    insn_cnt: u32,
    insns: u64,
    license: u64,
    log_level: u32,
    log_size: u32,
    log_buf: u64,
    kern_version: u32,
    prog_flags: u32,
    prog_name: [u8; BPF_OBJ_NAME_LEN],
    prog_ifindex: u32,
    expected_attach_type: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct ObjAttr {
    pathname: u64,
    bpf_fd: u32,
    file_flags: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct MapElemAttr {
    map_fd: u32,
    _pad: u32,
    key: u64,
    value: u64,
    flags: u64,
}

#[repr(C)]
union BpfAttr {
    map_create: MapCreateAttr,
    prog_load: ProgLoadAttr,
    obj: ObjAttr,
    map_elem: MapElemAttr,
}

fn bpf_syscall(cmd: libc::c_long, attr: &BpfAttr, op: &'static str) -> Result<i64> {
    let ret = unsafe {
        libc::syscall(
            libc::SYS_bpf,
            cmd,
            attr as *const BpfAttr,
            size_of::<BpfAttr>(),
        )
    };
    if ret < 0 {
        return Err(Error::Syscall {
            op,
            errno: unsafe { *libc::__errno_location() },
        });
    }
    Ok(ret)
}

fn name_field(name: &str) -> Result<[u8; BPF_OBJ_NAME_LEN]> {
    if name.len() >= BPF_OBJ_NAME_LEN {
        return Err(Error::InvalidInput(format!(
            "name \"{name}\" exceeds the kernel's object-name limit"
        )));
    }
    let mut field = [0u8; BPF_OBJ_NAME_LEN];
    field[..name.len()].copy_from_slice(name.as_bytes());
    Ok(field)
}

/// Creates a kernel map object. Returns its file descriptor.
pub fn create_map(
    kind: u32,
    name: &str,
    key_size: u32,
    value_size: u32,
    max_entries: u32,
    flags: u32,
) -> Result<i32> {
    let map_name = name_field(name)?;
    let attr = BpfAttr {
        map_create: MapCreateAttr {
            map_type: kind,
            key_size,
            value_size,
            max_entries,
            map_flags: flags,
            inner_map_fd: 0,
            numa_node: 0,
            map_name,
            map_ifindex: 0,
            btf_fd: 0,
            btf_key_type_id: 0,
            btf_value_type_id: 0,
        },
    };
    bpf_syscall(BPF_MAP_CREATE, &attr, "create_map").map(|fd| fd as i32)
}

/// Parses `/proc/version`'s `Linux version MAJOR.MINOR.SUB[-...]` preamble
/// into the kernel's packed version encoding.
pub fn kernel_version() -> Result<u32> {
    const PREFIX: &str = "Linux version ";
    let contents = fs::read_to_string("/proc/version")?;
    let rest = contents
        .strip_prefix(PREFIX)
        .ok_or_else(|| Error::InvalidInput("/proc/version has unexpected format".to_string()))?;
    let version = rest.split('-').next().unwrap_or(rest);
    let mut parts = version.split('.');
    let major: u32 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::InvalidInput("could not parse kernel major version".to_string()))?;
    let minor: u32 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::InvalidInput("could not parse kernel minor version".to_string()))?;
    let sub: u32 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::InvalidInput("could not parse kernel sublevel version".to_string()))?;
    Ok((major << 24) | (minor << 16) | sub)
}

/// Loads a BPF program into the verifier. Returns its file descriptor.
pub fn load_program(kind: u32, name: &str, insns: &[u8], license: &str) -> Result<i32> {
    let prog_name = name_field(name)?;
    if insns.len() % crate::insn::INSN_SIZE != 0 {
        return Err(Error::InvalidInput(
            "instruction stream length is not a multiple of the instruction record size".to_string(),
        ));
    }
    let insn_cnt = crate::insn::insn_count(insns.len());
    if insn_cnt > BPF_MAXINSNS {
        return Err(Error::InvalidInput(format!(
            "program has {insn_cnt} instructions, exceeding the kernel's limit of {BPF_MAXINSNS}"
        )));
    }
    let license_c = CString::new(license)
        .map_err(|_| Error::InvalidInput("license string contains an interior NUL".to_string()))?;

    let attr = BpfAttr {
        prog_load: ProgLoadAttr {
            prog_type: kind,
            insn_cnt: insn_cnt as u32,
            insns: insns.as_ptr() as u64,
            license: license_c.as_ptr() as u64,
            log_level: 0,
            log_size: 0,
            log_buf: 0,
            kern_version: kernel_version().unwrap_or(0),
            prog_flags: 0,
            prog_name,
            prog_ifindex: 0,
            expected_attach_type: 0,
        },
    };
    bpf_syscall(BPF_PROG_LOAD, &attr, "load_program").map(|fd| fd as i32)
}

/// Pins a kernel object (map or program) at `path`.
pub fn pin_object(fd: i32, path: &Path) -> Result<()> {
    let path_c = path_to_cstring(path)?;
    let attr = BpfAttr {
        obj: ObjAttr {
            pathname: path_c.as_ptr() as u64,
            bpf_fd: fd as u32,
            file_flags: 0,
        },
    };
    bpf_syscall(BPF_OBJ_PIN, &attr, "pin_object").map(|_| ())
}

/// Re-acquires a file descriptor for a previously pinned object.
pub fn open_pinned(path: &Path) -> Result<i32> {
    let path_c = path_to_cstring(path)?;
    let attr = BpfAttr {
        obj: ObjAttr {
            pathname: path_c.as_ptr() as u64,
            bpf_fd: 0,
            file_flags: 0,
        },
    };
    bpf_syscall(BPF_OBJ_GET, &attr, "open_pinned").map(|fd| fd as i32)
}

fn path_to_cstring(path: &Path) -> Result<CString> {
    let s = path
        .to_str()
        .ok_or_else(|| Error::InvalidInput(format!("{} is not valid unicode", path.display())))?;
    CString::new(s).map_err(|_| Error::InvalidInput("path contains an interior NUL".to_string()))
}

#[repr(C)]
struct PerfEventAttr {
    type_: u32,
    size: u32,
    config: u64,
    sample_period: u64,
    sample_type: u64,
    read_format: u64,
    flags: u64,
    wakeup_events: u32,
    bp_type: u32,
    config1: u64,
    config2: u64,
    branch_sample_type: u64,
    sample_regs_user: u64,
    sample_stack_user: u32,
    clockid: i32,
    sample_regs_intr: u64,
    aux_watermark: u32,
    sample_max_stack: u16,
    __reserved_2: u16,
}

/// Attaches `prog_fd` to the kernel tracepoint `<category>/<event>` and
/// enables event delivery. Returns the perf-event file descriptor that keeps
/// the attachment alive for the life of the process holding it.
pub fn attach_tracepoint(prog_fd: i32, category: &str, event: &str) -> Result<i32> {
    let id_path = format!("/sys/kernel/tracing/events/{category}/{event}/id");
    let id_str = fs::read_to_string(&id_path)?;
    let config: u64 = id_str
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("{id_path} did not contain a decimal id")))?;

    let mut attr: PerfEventAttr = unsafe { std::mem::zeroed() };
    attr.type_ = PERF_TYPE_TRACEPOINT;
    attr.size = size_of::<PerfEventAttr>() as u32;
    attr.config = config;
    attr.sample_period = 1;
    attr.wakeup_events = 1;

    let perf_fd = unsafe {
        libc::syscall(
            libc::SYS_perf_event_open,
            &attr as *const PerfEventAttr,
            -1i32,
            0i32,
            -1i32,
            0u64,
        )
    };
    if perf_fd < 0 {
        return Err(Error::Syscall {
            op: "perf_event_open",
            errno: unsafe { *libc::__errno_location() },
        });
    }
    let perf_fd = perf_fd as i32;

    const PERF_EVENT_IOC_ENABLE: libc::c_ulong = 0x2400;
    const PERF_EVENT_IOC_SET_BPF: libc::c_ulong = 0x2408;
    if unsafe { libc::ioctl(perf_fd, PERF_EVENT_IOC_SET_BPF, prog_fd) } < 0 {
        return Err(Error::Syscall {
            op: "perf_event_ioc_set_bpf",
            errno: unsafe { *libc::__errno_location() },
        });
    }
    if unsafe { libc::ioctl(perf_fd, PERF_EVENT_IOC_ENABLE, 0) } < 0 {
        return Err(Error::Syscall {
            op: "perf_event_ioc_enable",
            errno: unsafe { *libc::__errno_location() },
        });
    }
    Ok(perf_fd)
}

/// Looks up a map element, returning `None` on any kernel-side failure
/// (including "no such key"), mirroring the original's silent-default
/// `GetElementValue`.
pub fn map_get<K: Copy, V: Copy>(fd: i32, key: &K) -> Option<V> {
    let mut value: V = unsafe { std::mem::zeroed() };
    let attr = BpfAttr {
        map_elem: MapElemAttr {
            map_fd: fd as u32,
            _pad: 0,
            key: key as *const K as u64,
            value: &mut value as *mut V as u64,
            flags: 0,
        },
    };
    bpf_syscall(BPF_MAP_LOOKUP_ELEM, &attr, "map_lookup_elem")
        .ok()
        .map(|_| value)
}

/// Updates (or inserts) a map element.
pub fn map_set<K: Copy, V: Copy>(fd: i32, key: &K, value: &V, flags: MapFlags) -> Result<()> {
    let attr = BpfAttr {
        map_elem: MapElemAttr {
            map_fd: fd as u32,
            _pad: 0,
            key: key as *const K as u64,
            value: value as *const V as u64,
            flags: flags.bits(),
        },
    };
    bpf_syscall(BPF_MAP_UPDATE_ELEM, &attr, "map_update_elem").map(|_| ())
}

/// Deletes a map element.
pub fn map_delete<K: Copy>(fd: i32, key: &K) -> Result<()> {
    let attr = BpfAttr {
        map_elem: MapElemAttr {
            map_fd: fd as u32,
            _pad: 0,
            key: key as *const K as u64,
            value: 0,
            flags: 0,
        },
    };
    bpf_syscall(BPF_MAP_DELETE_ELEM, &attr, "map_delete_elem").map(|_| ())
}

/// Raises `RLIMIT_MEMLOCK` to unlimited if it isn't already, so the kernel's
/// accounting of map and program pages doesn't reject the load.
pub fn raise_memlock_unlimited() -> Result<()> {
    let mut rlim = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    if unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, &mut rlim) } != 0 {
        return Err(Error::Syscall {
            op: "getrlimit",
            errno: unsafe { *libc::__errno_location() },
        });
    }
    if rlim.rlim_max == libc::RLIM_INFINITY && rlim.rlim_cur == rlim.rlim_max {
        return Ok(());
    }
    rlim.rlim_max = libc::RLIM_INFINITY;
    rlim.rlim_cur = rlim.rlim_max;
    if unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) } != 0 {
        return Err(Error::Syscall {
            op: "setrlimit",
            errno: unsafe { *libc::__errno_location() },
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_field_rejects_too_long_names() {
        let long = "a".repeat(BPF_OBJ_NAME_LEN);
        assert!(name_field(&long).is_err());
        assert!(name_field("counts").is_ok());
    }

    #[test]
    fn kernel_version_is_monotonic_triple() {
        // Exercise the packing formula directly; /proc/version content is
        // environment-dependent so we don't assert against the live file.
        let a = (5u32 << 24) | (10u32 << 16) | 43u32;
        let b = (5u32 << 24) | (10u32 << 16) | 44u32;
        assert!(a < b);
        let c = (5u32 << 24) | (11u32 << 16) | 0u32;
        assert!(b < c);
    }
}
