//! Integration coverage for the boundary behaviors reachable without a real
//! kernel BPF interface (root privileges / a writable `/sys/fs/bpf` aren't
//! available in CI, so the map/program creation path is covered only by
//! `bpf-rt`'s unit tests against synthetic byte buffers).

use std::fs;

use bpf_rt::loader::load_object;
use bpf_rt::Error;

#[test]
fn missing_bpf_root_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let obj = dir.path().join("util_monitor.o");
    fs::write(&obj, b"").unwrap();
    let missing_root = dir.path().join("not-there");

    let err = load_object(&obj, missing_root.to_str().unwrap()).unwrap_err();
    assert!(matches!(err, Error::BpfRootMissing));
    assert_eq!(err.to_string(), "Bpf path not exists");
}

#[test]
fn empty_object_fails_before_touching_the_kernel() {
    let dir = tempfile::tempdir().unwrap();
    let obj = dir.path().join("util_monitor.o");
    fs::write(&obj, b"").unwrap();

    let err = load_object(&obj, dir.path().to_str().unwrap()).unwrap_err();
    assert!(matches!(err, Error::MalformedElf));
}

#[test]
fn non_object_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let obj = dir.path().join("util_monitor.elf");
    fs::write(&obj, b"").unwrap();

    let err = load_object(&obj, dir.path().to_str().unwrap()).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}
