//! The map descriptor layout and the Loader's name↔fd binding table.

use bitflags::bitflags;

use crate::error::{Error, Result};
use std::mem::size_of;

bitflags! {
    /// Flags accepted by the kernel's map element update operation.
    pub struct MapFlags: u64 {
        const ANY      = 0;
        const NO_EXIST = 1;
        const EXIST    = 1 << 1;
        const LOCK     = 1 << 2;
    }
}

/// The fixed layout encoded in the payload of every `bpf_map_*` section.
///
/// All fields are native-endian 32-bit unsigned integers laid out
/// contiguously with no padding, mirroring `cu_bpf_map_def` in the original
/// `cu_bpf_def.h`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapDescriptor {
    pub kind: u32,
    pub key_size: u32,
    pub value_size: u32,
    pub max_entries: u32,
    pub map_flags: u32,
}

unsafe impl plain::Plain for MapDescriptor {}

impl MapDescriptor {
    /// Interprets `data` as a contiguous map descriptor.
    pub fn parse(data: &[u8]) -> Result<MapDescriptor> {
        let want = size_of::<MapDescriptor>();
        let bytes = data
            .get(..want)
            .ok_or_else(|| Error::InvalidInput("map descriptor section too short".to_string()))?;
        plain::from_bytes(bytes)
            .map(|d: &MapDescriptor| *d)
            .map_err(|_| Error::InvalidInput("malformed map descriptor".to_string()))
    }
}

/// An ordered association between a map's declared name and the kernel file
/// descriptor `create_map` returned for it.
///
/// Kept as a flat `Vec` with linear lookup rather than a `HashMap`: the
/// expected size is a single-digit map count per object file, so the extra
/// hashing overhead and second index buy nothing.
#[derive(Default)]
pub struct MapBindings {
    entries: Vec<(i32, String)>,
}

impl MapBindings {
    pub fn new() -> Self {
        MapBindings::default()
    }

    pub fn bind(&mut self, fd: i32, name: impl Into<String>) {
        self.entries.push((fd, name.into()));
    }

    pub fn fd_by_name(&self, name: &str) -> Option<i32> {
        self.entries
            .iter()
            .find(|(_, n)| n == name)
            .map(|(fd, _)| *fd)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.entries.iter().any(|(_, n)| n == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
