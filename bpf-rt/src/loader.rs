//! Orchestrates the Object Reader and Kernel Interface to turn a compiled
//! object file into a set of pinned kernel objects.

use std::path::Path;

use crate::elf::{self, Section};
use crate::error::{Error, Result};
use crate::map::{MapBindings, MapDescriptor};
use crate::paths;
use crate::{insn, sys};

pub const OBJECT_EXTENSION: &str = "o";

/// Counts of kernel objects pinned by a successful [`load_object`] call.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub maps_pinned: usize,
    pub programs_pinned: usize,
}

/// Reads, relocates, loads and pins every map and program section found in
/// the object file at `path`, under `bpf_root`.
///
/// `bpf_root` is a parameter (rather than hardcoded to [`paths::BPF_ROOT`])
/// so tests can point it at a temporary directory.
pub fn load_object(path: impl AsRef<Path>, bpf_root: &str) -> Result<LoadSummary> {
    let path = path.as_ref();
    if !Path::new(bpf_root).is_dir() {
        return Err(Error::BpfRootMissing);
    }
    if path.extension().and_then(|e| e.to_str()) != Some(OBJECT_EXTENSION) {
        return Err(Error::InvalidInput(format!(
            "{} does not have the expected .{OBJECT_EXTENSION} extension",
            path.display()
        )));
    }
    let program_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::InvalidInput(format!("{} has no usable file stem", path.display())))?
        .to_string();

    sys::raise_memlock_unlimited()?;

    let sections = elf::read_sections(path)?;
    if sections.is_empty() {
        return Err(Error::MalformedElf);
    }
    log::debug!("{}: parsed {} sections", path.display(), sections.len());

    let license_section = elf::by_name(&sections, paths::LICENSE_SECTION);
    let license = if license_section.data.is_empty() {
        paths::DEFAULT_LICENSE.to_string()
    } else {
        c_string_lossy(&license_section.data)
    };

    let mut bindings = MapBindings::new();
    let mut maps_pinned = 0usize;
    for section in maps(&sections) {
        let map_name = section
            .name
            .strip_prefix(paths::MAP_SECTION_PREFIX)
            .expect("filtered by maps()");
        let descriptor = MapDescriptor::parse(&section.data)?;
        let fd = sys::create_map(
            descriptor.kind,
            map_name,
            descriptor.key_size,
            descriptor.value_size,
            descriptor.max_entries,
            descriptor.map_flags,
        )?;
        let pin_path = paths::map_pin_path(bpf_root, &program_name, map_name);
        if pin_path.exists() {
            return Err(Error::AlreadyPinned(pin_path));
        }
        sys::pin_object(fd, &pin_path)?;
        log::info!("pinned map {map_name} at {}", pin_path.display());
        bindings.bind(fd, map_name);
        maps_pinned += 1;
    }

    let mut programs_pinned = 0usize;
    for section in programs(&sections) {
        let kind = paths::program_kind(&section.name);
        let pin_name = paths::prog_pin_name(&section.name);
        let mut insn_bytes = section.data.clone();

        let rel_name = paths::relocation_section_name(&section.name);
        let rel_section = elf::by_name(&sections, &rel_name);
        if !rel_section.data.is_empty() {
            let strtab = elf::by_type(&sections, elf::SHT_STRTAB);
            let symtab = elf::by_type(&sections, elf::SHT_SYMTAB);
            insn::relocate(&mut insn_bytes, &rel_section.data, &strtab.data, &symtab.data, &bindings);
        }

        let fd = sys::load_program(kind.as_kernel_value(), &program_name, &insn_bytes, &license)?;
        let pin_path = paths::prog_pin_path(bpf_root, &program_name, &pin_name);
        if pin_path.exists() {
            return Err(Error::AlreadyPinned(pin_path));
        }
        sys::pin_object(fd, &pin_path)?;
        log::info!("pinned program {pin_name} at {}", pin_path.display());
        programs_pinned += 1;
    }

    Ok(LoadSummary {
        maps_pinned,
        programs_pinned,
    })
}

fn maps(sections: &[Section]) -> impl Iterator<Item = &Section> {
    sections
        .iter()
        .filter(|s| s.name.starts_with(paths::MAP_SECTION_PREFIX))
}

fn programs(sections: &[Section]) -> impl Iterator<Item = &Section> {
    sections
        .iter()
        .filter(|s| s.name.starts_with(paths::PROG_SECTION_PREFIX))
}

fn c_string_lossy(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn rejects_missing_bpf_root() {
        let dir = tempdir().unwrap();
        let missing_root = dir.path().join("does-not-exist");
        let obj = dir.path().join("util_monitor.o");
        std::fs::write(&obj, b"").unwrap();
        let err = load_object(&obj, missing_root.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, Error::BpfRootMissing));
    }

    #[test]
    fn rejects_wrong_extension() {
        let dir = tempdir().unwrap();
        let obj = dir.path().join("util_monitor.bin");
        std::fs::write(&obj, b"").unwrap();
        let err = load_object(&obj, dir.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    #[serial]
    fn empty_object_is_malformed() {
        let dir = tempdir().unwrap();
        let obj = dir.path().join("util_monitor.o");
        let mut f = std::fs::File::create(&obj).unwrap();
        f.write_all(b"").unwrap();
        let err = load_object(&obj, dir.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, Error::MalformedElf));
    }

    #[test]
    fn c_string_lossy_stops_at_nul() {
        assert_eq!(c_string_lossy(b"GPL\0trailing-junk"), "GPL");
    }
}
