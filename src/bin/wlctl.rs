//! Command-line tool for materializing Windows container layer archives.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use winlayer::{ArchiveReader, LayerApplier};

/// wlctl
#[derive(Debug, Parser)]
#[clap(name = "wlctl", version)]
struct App {
    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Materialize a layer archive into a directory
    Apply {
        /// Path to the gzip-compressed layer archive
        archive: PathBuf,
        /// Destination directory (created if absent)
        output: PathBuf,
    },
    /// List the entries of a layer archive without extracting
    Ls {
        /// Path to the gzip-compressed layer archive
        archive: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = App::parse();

    match args.cmd {
        Command::Apply { archive, output } => {
            let report = LayerApplier::new(&archive, &output)
                .apply()
                .with_context(|| format!("failed to apply {}", archive.display()))?;

            for warning in &report.warnings {
                eprintln!("warning: {warning}");
            }
            println!(
                "applied {}: {} entries ({} files, {} directories, {} links, {} skipped), {} warnings",
                archive.display(),
                report.entries,
                report.files,
                report.directories,
                report.links,
                report.skipped,
                report.warnings.len(),
            );
        }
        Command::Ls { archive } => {
            let file = std::fs::File::open(&archive)
                .with_context(|| format!("failed to open {}", archive.display()))?;
            let stream = std::io::BufReader::new(flate2::read::GzDecoder::new(file));
            let mut reader = ArchiveReader::new(stream);

            while let Some(entry) = reader.next_entry()? {
                if entry.link_name.is_empty() {
                    println!("{:?} {:>12} {}", entry.type_flag, entry.size, entry.name);
                } else {
                    println!(
                        "{:?} {:>12} {} -> {}",
                        entry.type_flag, entry.size, entry.name, entry.link_name
                    );
                }
            }
        }
    }

    Ok(())
}
