//! Long-running daemon: attaches previously-pinned BPF programs to kernel
//! tracepoints, then blocks forever. Detaches from its controlling terminal
//! via `daemon(3)` before logging or attaching anything, matching the
//! original's `daemon(0, 0)` call in `main()`.

use std::ffi::CString;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

/// A nominal, slightly-elevated scheduling priority for the attach loop and
/// the lifetime of the daemon thread.
const NICE_PRIORITY: i32 = -5;

/// Attaches pinned BPF programs to kernel tracepoints and runs forever.
#[derive(Parser, Debug)]
#[command(name = "attacher", about = "Attach pinned BPF programs to tracepoints")]
struct Cli {
    /// Log file path.
    #[arg(long, default_value = "/data/bpf_daemon.log")]
    log: PathBuf,

    /// Program name previously used by the loader to derive pinned paths.
    #[arg(long)]
    program: String,

    /// Tracepoint to attach to, as `category/event`. May be repeated.
    #[arg(long = "add-tracepoint")]
    add_tracepoint: Vec<String>,
}

fn parse_tracepoints(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|s| {
            let (category, event) = s
                .split_once('/')
                .ok_or_else(|| anyhow::anyhow!("tracepoint \"{s}\" is not of the form category/event"))?;
            Ok((category.to_string(), event.to_string()))
        })
        .collect()
}

fn init_logger(log_path: &PathBuf) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("opening log file {}", log_path.display()))?;
    let target: Box<dyn Write + Send + Sync> = Box::new(file);
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .filter_level(log::LevelFilter::Info)
        .init();
    Ok(())
}

/// Sets the current thread's kernel-visible name and a nominal scheduling
/// priority, matching the original daemon's cosmetic process-identity setup.
fn set_thread_identity(name: &str) {
    let truncated = &name[..name.len().min(15)];
    if let Ok(c_name) = CString::new(truncated) {
        unsafe {
            libc::prctl(libc::PR_SET_NAME, c_name.as_ptr(), 0, 0, 0);
        }
    }
    unsafe {
        libc::setpriority(libc::PRIO_PROCESS, 0, NICE_PRIORITY);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let tracepoints = match parse_tracepoints(&cli.add_tracepoint) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("[-] {e}");
            std::process::exit(1);
        }
    };
    if tracepoints.is_empty() {
        bail!("at least one --add-tracepoint is required");
    }

    if unsafe { libc::daemon(0, 0) } != 0 {
        bail!("failed to detach from the controlling terminal");
    }

    init_logger(&cli.log)?;
    set_thread_identity("bpf_daemon");

    let outcomes = bpf_rt::attacher::attach_all(bpf_rt::paths::BPF_ROOT, &cli.program, &tracepoints);
    let attached = outcomes
        .iter()
        .filter(|o| matches!(o, bpf_rt::attacher::AttachOutcome::Attached))
        .count();
    log::info!(
        "daemon pid {} attached {attached}/{} requested tracepoints",
        std::process::id(),
        tracepoints.len()
    );

    loop {
        std::thread::sleep(Duration::from_secs(u64::MAX));
    }
}
