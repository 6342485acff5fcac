//! BPF instruction records and the single supported relocation form:
//! patching a `BPF_LD | BPF_IMM | BPF_DW` load with a freshly created map's
//! file descriptor.

use crate::elf::c_str_at;
use crate::map::MapBindings;

pub const INSN_SIZE: usize = 8;
const REL_SIZE: usize = 16;
const SYM_SIZE: usize = 24;

/// `BPF_LD | BPF_IMM | BPF_DW`, the double-word immediate-load opcode: the
/// only instruction form this loader rewrites.
const BPF_LD_IMM_DW: u8 = 0x18;
/// `BPF_PSEUDO_MAP_FD`, the kernel's sentinel for "this immediate is a map fd".
const BPF_PSEUDO_MAP_FD: u8 = 1;

/// A single 8-byte BPF instruction: {opcode, dst-register, src-register,
/// offset, immediate}.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub code: u8,
    regs: u8,
    pub offset: i16,
    pub imm: i32,
}

unsafe impl plain::Plain for Instruction {}

impl Instruction {
    pub fn dst_reg(&self) -> u8 {
        self.regs & 0x0f
    }

    pub fn src_reg(&self) -> u8 {
        self.regs >> 4
    }

    pub fn set_src_reg(&mut self, reg: u8) {
        self.regs = (self.regs & 0x0f) | (reg << 4);
    }

    pub fn is_map_fd_load(&self) -> bool {
        self.code == BPF_LD_IMM_DW
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
struct RelocationRecord {
    offset: u64,
    info: u64,
}

unsafe impl plain::Plain for RelocationRecord {}

impl RelocationRecord {
    fn sym_index(&self) -> usize {
        (self.info >> 32) as usize
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
struct ElfSym {
    st_name: u32,
    st_info: u8,
    st_other: u8,
    st_shndx: u16,
    st_value: u64,
    st_size: u64,
}

unsafe impl plain::Plain for ElfSym {}

/// Rewrites `insn_bytes` in place: for every relocation record in `rel_data`
/// whose symbol resolves (via `strtab`/`symtab`) to a name bound in
/// `bindings`, and whose target instruction is a map-fd load, sets the
/// immediate to the map's fd and the source register to the pseudo-map-fd
/// sentinel. Relocations that don't resolve to a bound map, or whose target
/// instruction isn't a map-fd load, leave the instruction bytes untouched.
pub fn relocate(insn_bytes: &mut [u8], rel_data: &[u8], strtab: &[u8], symtab: &[u8], bindings: &MapBindings) {
    if rel_data.is_empty() || rel_data.len() % REL_SIZE != 0 {
        return;
    }
    for chunk in rel_data.chunks_exact(REL_SIZE) {
        let Ok(rel) = plain::from_bytes::<RelocationRecord>(chunk) else {
            continue;
        };
        let sym_off = rel.sym_index() * SYM_SIZE;
        let Some(sym_bytes) = symtab.get(sym_off..sym_off + SYM_SIZE) else {
            continue;
        };
        let Ok(sym) = plain::from_bytes::<ElfSym>(sym_bytes) else {
            continue;
        };
        let sym_name = c_str_at(strtab, sym.st_name as usize);
        let Some(fd) = bindings.fd_by_name(&sym_name) else {
            continue;
        };

        let insn_off = rel.offset as usize;
        let Some(insn_slice) = insn_bytes.get_mut(insn_off..insn_off + INSN_SIZE) else {
            continue;
        };
        let Ok(insn) = plain::from_bytes::<Instruction>(insn_slice) else {
            continue;
        };
        if !insn.is_map_fd_load() {
            continue;
        }
        let mut patched = *insn;
        patched.imm = fd;
        patched.set_src_reg(BPF_PSEUDO_MAP_FD);
        insn_slice.copy_from_slice(unsafe {
            std::slice::from_raw_parts(&patched as *const Instruction as *const u8, INSN_SIZE)
        });
    }
}

pub fn insn_count(byte_len: usize) -> usize {
    byte_len / INSN_SIZE
}
