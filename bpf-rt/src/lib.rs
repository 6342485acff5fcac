//! Minimal, self-contained eBPF object loading and kernel-interface layer.
//!
//! This crate does not link a general-purpose BPF library (no `libbpf-sys`,
//! no `aya`): the [`sys`] module talks to the kernel directly through raw
//! `bpf(2)` and `perf_event_open(2)` syscalls, [`elf`] parses 64-bit ELF
//! relocatables by hand, and [`loader`]/[`attacher`] compose the two into the
//! object-loading and tracepoint-attaching operations.

pub mod attacher;
pub mod elf;
pub mod error;
pub mod insn;
pub mod loader;
pub mod map;
pub mod paths;
pub mod sys;

pub use error::{Error, Result};
