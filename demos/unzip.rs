use std::fs;
use std::path::PathBuf;

use anyhow::*;
use camino::{Utf8Component, Utf8Path};
use log::*;
use structopt::*;

use kzip::*;

#[derive(Debug, StructOpt)]
#[structopt(name = "unzip", about = "Lists or extracts a .zip file")]
struct Opt {
    /// Pass multiple times for additional verbosity (info, debug, trace)
    #[structopt(short, long, parse(from_occurrences))]
    verbosity: usize,

    /// List the archive's entries instead of extracting them.
    #[structopt(short, long)]
    list: bool,

    /// Extract into the given directory instead of the current one.
    #[structopt(short = "d", long)]
    destination: Option<PathBuf>,

    #[structopt(name("ZIP file"))]
    zip_path: PathBuf,
}

fn main() -> Result<()> {
    let args = Opt::from_args();

    let mut errlog = stderrlog::new();
    errlog.verbosity(args.verbosity + 1);
    errlog.init()?;

    info!("Opening {}", args.zip_path.display());
    let archive = ZipArchive::open_path(&args.zip_path)
        .with_context(|| format!("Couldn't load archive {}", args.zip_path.display()))?;

    if args.list {
        list(&archive);
        return Ok(());
    }

    let destination = args.destination.unwrap_or_else(|| PathBuf::from("."));
    extract(&archive, &destination)
}

fn list<R>(archive: &ZipArchive<R>)
where
    R: std::io::Read + std::io::Seek,
{
    for entry in archive.entries() {
        let modified = entry
            .last_modified
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "????-??-?? ??:??".to_owned());
        let note = match entry.unreadable {
            Some(why) => format!(" (unreadable: {})", why),
            None => String::new(),
        };
        println!("{:>12}  {}  {}{}", entry.size, modified, entry.path, note);
    }
    if !archive.comment().is_empty() {
        println!("{}", String::from_utf8_lossy(archive.comment()));
    }
}

/// Only plain relative paths are extracted; nothing gets to climb out
/// of the destination.
fn is_safe(path: &Utf8Path) -> bool {
    !path.as_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Utf8Component::Normal(_) | Utf8Component::CurDir))
}

fn extract<R>(archive: &ZipArchive<R>, destination: &std::path::Path) -> Result<()>
where
    R: std::io::Read + std::io::Seek,
{
    for entry in archive.directory().entries() {
        let metadata = entry.metadata();
        if !is_safe(&metadata.path) {
            warn!("Skipping {}, which would land outside {}", metadata.path, destination.display());
            continue;
        }
        let out_path = destination.join(&metadata.path);

        if !entry.is_file() {
            fs::create_dir_all(&out_path).with_context(|| {
                format!("Couldn't create directory {}", out_path.display())
            })?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Couldn't create directory {}", parent.display()))?;
        }
        let data = entry
            .try_data()
            .with_context(|| format!("Couldn't extract {}", metadata.path))?;
        fs::write(&out_path, data)
            .with_context(|| format!("Couldn't create file {}", out_path.display()))?;
        debug!("Extracted {}", metadata.path);
    }
    Ok(())
}
