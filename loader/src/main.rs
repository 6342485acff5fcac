//! `loader <path-to-object>`: creates and pins the maps and programs
//! declared in a compiled BPF object file.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use env_logger::Target;
use log::Level;

/// Loads a BPF object file's maps and programs into the kernel.
#[derive(Parser, Debug)]
#[command(name = "loader", about = "Load and pin a BPF object file")]
struct Cli {
    /// Path to the compiled `.o` object file.
    path: PathBuf,
}

/// Diagnostics go to standard output with a `[+]`/`[-]` prefix in place of
/// the usual level string, so existing tooling that greps for those prefixes
/// keeps working.
fn init_logger() {
    env_logger::Builder::from_default_env()
        .target(Target::Stdout)
        .format(|buf, record| {
            use std::io::Write;
            let prefix = match record.level() {
                Level::Error => "[-]",
                _ => "[+]",
            };
            writeln!(buf, "{prefix} {}", record.args())
        })
        .filter_level(log::LevelFilter::Info)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let summary = bpf_rt::loader::load_object(&cli.path, bpf_rt::paths::BPF_ROOT)?;
    log::info!(
        "loaded {} ({} maps, {} programs)",
        cli.path.display(),
        summary.maps_pinned,
        summary.programs_pinned
    );
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logger();
    if let Err(err) = run(&cli) {
        log::error!("{err}");
        std::process::exit(1);
    }
}
