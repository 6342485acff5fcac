use std::path::PathBuf;

/// Errors produced by the object reader, kernel interface, loader and attacher.
///
/// Every syscall wrapper in [`crate::sys`] collapses kernel failures into
/// [`Error::Syscall`]; no errno-to-errno_kind mapping is attempted beyond what
/// callers need to print a sensible `[-]` diagnostic.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to read sections")]
    MalformedElf,

    #[error("{op} failed (errno {errno})")]
    Syscall { op: &'static str, errno: i32 },

    #[error("Map \"{}\" already exists", .0.display())]
    AlreadyPinned(PathBuf),

    #[error("Bpf path not exists")]
    BpfRootMissing,
}

pub type Result<T> = std::result::Result<T, Error>;
