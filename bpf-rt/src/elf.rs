//! Object Reader (OR): turns a 64-bit little-endian ELF relocatable into a
//! sequence of named, typed [`Section`]s.
//!
//! This does not use a general-purpose ELF crate. The layouts below mirror
//! exactly the handful of fields the loader needs, following the
//! `reinterpret_cast<const Elf64_Ehdr*>` style of the original `cu_elf.h`
//! header this module is grounded on, but expressed as `#[repr(C)]` structs
//! read through [`plain`] instead of raw pointer casts.

use std::fs;
use std::mem::size_of;
use std::path::Path;

use crate::error::{Error, Result};

pub const SHT_PROGBITS: u32 = 1;
pub const SHT_SYMTAB: u32 = 2;
pub const SHT_STRTAB: u32 = 3;

#[repr(C)]
#[derive(Clone, Copy)]
struct Elf64Ehdr {
    e_ident: [u8; 16],
    e_type: u16,
    e_machine: u16,
    e_version: u32,
    e_entry: u64,
    e_phoff: u64,
    e_shoff: u64,
    e_flags: u32,
    e_ehsize: u16,
    e_phentsize: u16,
    e_phnum: u16,
    e_shentsize: u16,
    e_shnum: u16,
    e_shstrndx: u16,
}

unsafe impl plain::Plain for Elf64Ehdr {}

#[repr(C)]
#[derive(Clone, Copy)]
struct Elf64Shdr {
    sh_name: u32,
    sh_type: u32,
    sh_flags: u64,
    sh_addr: u64,
    sh_offset: u64,
    sh_size: u64,
    sh_link: u32,
    sh_info: u32,
    sh_addralign: u64,
    sh_entsize: u64,
}

unsafe impl plain::Plain for Elf64Shdr {}

/// A named, typed byte payload parsed from a 64-bit ELF file.
///
/// Sections are produced once by [`read_sections`]; consumers treat them as
/// immutable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub section_type: u32,
    pub data: Vec<u8>,
}

impl Section {
    fn empty() -> Self {
        Section::default()
    }
}

/// Reads every section header out of `path` and resolves their names via the
/// first non-empty string-table section.
///
/// Malformed, non-ELF, 32-bit, or big-endian input is not an I/O error: it
/// yields an empty section list, matching the original loader's "return {}"
/// behavior on any structural inconsistency. Only a failure to read the file
/// itself is surfaced as [`Error::Io`].
pub fn read_sections<P: AsRef<Path>>(path: P) -> Result<Vec<Section>> {
    let raw = fs::read(path)?;
    Ok(parse_sections(&raw))
}

fn parse_sections(raw: &[u8]) -> Vec<Section> {
    let ehdr_size = size_of::<Elf64Ehdr>();
    if raw.len() < ehdr_size {
        return Vec::new();
    }
    let ehdr: &Elf64Ehdr = match plain::from_bytes(&raw[..ehdr_size]) {
        Ok(h) => h,
        Err(_) => return Vec::new(),
    };
    if ehdr.e_ehsize == 0 {
        return Vec::new();
    }

    let shdr_size = size_of::<Elf64Shdr>();
    let shdr_at = |idx: u64| -> Option<&Elf64Shdr> {
        let off = ehdr.e_shoff as usize + (ehdr.e_shentsize as usize) * (idx as usize);
        let bytes = raw.get(off..off + shdr_size)?;
        plain::from_bytes(bytes).ok()
    };

    let mut strtab: Option<&[u8]> = None;
    for idx in 0..ehdr.e_shnum as u64 {
        let Some(shdr) = shdr_at(idx) else {
            return Vec::new();
        };
        if shdr.sh_type == SHT_STRTAB && shdr.sh_offset > 0 {
            let start = shdr.sh_offset as usize;
            let end = start + shdr.sh_size as usize;
            strtab = raw.get(start..end);
            break;
        }
    }
    let Some(strtab) = strtab else {
        return Vec::new();
    };

    let mut sections = Vec::with_capacity(ehdr.e_shnum as usize);
    for idx in 0..ehdr.e_shnum as u64 {
        let Some(shdr) = shdr_at(idx) else {
            return Vec::new();
        };
        let name = c_str_at(strtab, shdr.sh_name as usize);
        let data = if shdr.sh_offset > 0 && shdr.sh_size > 0 {
            let start = shdr.sh_offset as usize;
            let end = start + shdr.sh_size as usize;
            raw.get(start..end).map(|s| s.to_vec()).unwrap_or_default()
        } else {
            Vec::new()
        };
        sections.push(Section {
            name,
            section_type: shdr.sh_type,
            data,
        });
    }
    sections
}

pub(crate) fn c_str_at(strtab: &[u8], offset: usize) -> String {
    let Some(tail) = strtab.get(offset..) else {
        return String::new();
    };
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    String::from_utf8_lossy(&tail[..end]).into_owned()
}

/// Returns the first section whose name equals `name`, or an empty sentinel.
pub fn by_name(sections: &[Section], name: &str) -> Section {
    sections
        .iter()
        .find(|s| s.name == name)
        .cloned()
        .unwrap_or_else(Section::empty)
}

/// Returns the first section whose type equals `section_type`, or an empty sentinel.
pub fn by_type(sections: &[Section], section_type: u32) -> Section {
    sections
        .iter()
        .find(|s| s.section_type == section_type)
        .cloned()
        .unwrap_or_else(Section::empty)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_cstr(buf: &mut Vec<u8>, s: &str) -> u32 {
        let off = buf.len() as u32;
        buf.extend_from_slice(s.as_bytes());
        buf.push(0);
        off
    }

    /// Hand-assembles a minimal 64-bit LE ELF relocatable with a string
    /// table, a `bpf_map_counts` section and a `license` section, so the
    /// parser can be exercised without a real compiler toolchain.
    fn build_elf(sections: &[(&str, u32, &[u8])]) -> Vec<u8> {
        let ehdr_size = size_of::<Elf64Ehdr>();
        let shdr_size = size_of::<Elf64Shdr>();

        let mut shstrtab = vec![0u8]; // index 0 is always the empty string
        let mut names = Vec::new();
        for (name, _, _) in sections {
            names.push(push_cstr(&mut shstrtab, name));
        }
        let shstrtab_name = push_cstr(&mut shstrtab, ".shstrtab");

        // layout: ehdr, then section payloads, then shstrtab, then shdrs
        let mut data_offsets = Vec::new();
        let mut body = Vec::new();
        for (_, _, payload) in sections {
            data_offsets.push(ehdr_size + body.len());
            body.extend_from_slice(payload);
        }
        let strtab_offset = ehdr_size + body.len();
        body.extend_from_slice(&shstrtab);

        let shnum = sections.len() + 1; // +1 for .shstrtab itself
        let shoff = ehdr_size + body.len();

        let ehdr = Elf64Ehdr {
            e_ident: [0x7f, b'E', b'L', b'F', 2, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0],
            e_type: 1,
            e_machine: 0xf7, // EM_BPF
            e_version: 1,
            e_entry: 0,
            e_phoff: 0,
            e_shoff: shoff as u64,
            e_flags: 0,
            e_ehsize: ehdr_size as u16,
            e_phentsize: 0,
            e_phnum: 0,
            e_shentsize: shdr_size as u16,
            e_shnum: shnum as u16,
            e_shstrndx: shnum as u16 - 1,
        };

        let mut out = Vec::new();
        out.extend_from_slice(unsafe {
            std::slice::from_raw_parts(
                &ehdr as *const Elf64Ehdr as *const u8,
                ehdr_size,
            )
        });
        out.extend_from_slice(&body);

        for (idx, (_, sh_type, payload)) in sections.iter().enumerate() {
            let shdr = Elf64Shdr {
                sh_name: names[idx],
                sh_type: *sh_type,
                sh_flags: 0,
                sh_addr: 0,
                sh_offset: if payload.is_empty() { 0 } else { data_offsets[idx] as u64 },
                sh_size: payload.len() as u64,
                sh_link: 0,
                sh_info: 0,
                sh_addralign: 0,
                sh_entsize: 0,
            };
            out.extend_from_slice(unsafe {
                std::slice::from_raw_parts(&shdr as *const Elf64Shdr as *const u8, shdr_size)
            });
        }
        let shstrtab_shdr = Elf64Shdr {
            sh_name: shstrtab_name,
            sh_type: SHT_STRTAB,
            sh_flags: 0,
            sh_addr: 0,
            sh_offset: strtab_offset as u64,
            sh_size: shstrtab.len() as u64,
            sh_link: 0,
            sh_info: 0,
            sh_addralign: 0,
            sh_entsize: 0,
        };
        out.extend_from_slice(unsafe {
            std::slice::from_raw_parts(&shstrtab_shdr as *const Elf64Shdr as *const u8, shdr_size)
        });

        out
    }

    #[test]
    fn empty_file_yields_empty_sections() {
        assert!(parse_sections(&[]).is_empty());
    }

    #[test]
    fn parses_section_names_and_data() {
        let raw = build_elf(&[
            ("bpf_map_counts", SHT_PROGBITS, &[1, 2, 3, 4]),
            ("license", SHT_PROGBITS, b"GPL\0"),
        ]);
        let sections = parse_sections(&raw);
        assert_eq!(sections.len(), 3); // 2 + .shstrtab
        let counts = by_name(&sections, "bpf_map_counts");
        assert_eq!(counts.data, vec![1, 2, 3, 4]);
        let license = by_name(&sections, "license");
        assert_eq!(license.data, b"GPL\0");
    }

    #[test]
    fn by_name_round_trip() {
        let raw = build_elf(&[("bpf_map_counts", SHT_PROGBITS, &[0u8; 4])]);
        let sections = parse_sections(&raw);
        for section in &sections {
            assert_eq!(&by_name(&sections, &section.name), section);
        }
    }

    #[test]
    fn missing_section_yields_empty_sentinel() {
        let raw = build_elf(&[("bpf_map_counts", SHT_PROGBITS, &[0u8; 4])]);
        let sections = parse_sections(&raw);
        let missing = by_name(&sections, "does_not_exist");
        assert_eq!(missing, Section::empty());
    }
}
