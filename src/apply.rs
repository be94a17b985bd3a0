//! Three-pass layer materialization.
//!
//! A layer archive is a forward-only gzip stream, so restoration happens in
//! three sequential passes, each over a freshly opened
//! decompress-and-detar pipeline against the same archive:
//!
//! 1. **Expand**: create directories, files, hard links, and junctions.
//! 2. **Metadata**: restore creation/last-write/last-access times and the
//!    file attribute bitmask.
//! 3. **Security**: restore binary security descriptors.
//!
//! Timestamps and security state can only be applied once every path
//! physically exists, and directory timestamps would be disturbed by later
//! writes into the directory during expansion; re-reading the archive keeps
//! memory bounded instead of caching the entry list.
//!
//! Pass 1 failures abort the whole operation. Passes 2 and 3 are advisory:
//! each per-field failure is recorded on the [`ApplyReport`] and processing
//! continues, because the deliverable is file content and identity, with
//! metadata fidelity a quality-of-restoration concern.
//!
//! Expansion is idempotent: paths that already exist are left untouched, so
//! a partially-expanded layer can be resumed by re-running.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use base64::prelude::*;
use filetime::FileTime;
use flate2::read::GzDecoder;
use log::{debug, info, warn};

use crate::entry::{
    ArchiveEntry, PAX_ATIME, PAX_CREATION_TIME, PAX_MTIME, PAX_WIN_FILEATTR, PAX_WIN_RAWSD,
};
use crate::error::{LayerError, Result};
use crate::reader::ArchiveReader;
use crate::winfs;

/// One advisory failure from the metadata or security pass.
#[derive(Debug)]
pub struct ApplyWarning {
    /// Archive-relative path of the affected entry.
    pub path: String,
    /// Which restoration was attempted.
    pub field: &'static str,
    /// The parse or OS error text.
    pub detail: String,
}

impl fmt::Display for ApplyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.path, self.field, self.detail)
    }
}

/// Outcome of a full three-pass materialization.
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Entries yielded by the expand pass.
    pub entries: u64,
    /// Regular-file entries seen (created or already present).
    pub files: u64,
    /// Directory entries seen.
    pub directories: u64,
    /// Hard-link and junction entries seen.
    pub links: u64,
    /// Entries bypassed because their type flag is unsupported.
    pub skipped: u64,
    /// Advisory failures from the metadata and security passes.
    pub warnings: Vec<ApplyWarning>,
}

/// Materializes one layer archive into a destination directory.
///
/// The destination root comes from the volume provider and is assumed to be
/// exclusively owned by this materialization session for its duration.
#[derive(Debug)]
pub struct LayerApplier {
    archive: PathBuf,
    root: PathBuf,
}

impl LayerApplier {
    /// Set up a materialization of `archive` (a gzip-compressed tar layer)
    /// into the directory `root`.
    pub fn new(archive: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            archive: archive.into(),
            root: root.into(),
        }
    }

    /// Run all three passes.
    ///
    /// # Errors
    ///
    /// Returns the fatal conditions only: a corrupt archive, an I/O failure
    /// while expanding, or a failed link creation. Advisory metadata and
    /// security failures land on the report's warning list instead.
    pub fn apply(&self) -> Result<ApplyReport> {
        std::fs::create_dir_all(&self.root)?;

        let mut report = ApplyReport::default();
        self.expand(&mut report)?;
        info!("applying metadata");
        self.apply_metadata(&mut report)?;
        info!("applying security");
        self.apply_security(&mut report)?;
        info!("done applying layer");
        Ok(report)
    }

    /// Open a fresh decompress-and-detar pipeline from byte zero.
    fn open_archive(&self) -> Result<ArchiveReader<BufReader<GzDecoder<File>>>> {
        let file = File::open(&self.archive)?;
        Ok(ArchiveReader::new(BufReader::new(GzDecoder::new(file))))
    }

    /// Translate an archive path to its destination under the root,
    /// converting separators to the host convention. Empty, `.`, and `..`
    /// components are dropped so no entry can land outside the root.
    fn dest_path(&self, name: &str) -> PathBuf {
        let mut path = self.root.clone();
        for component in name.split('/') {
            if component.is_empty() || component == "." || component == ".." {
                continue;
            }
            path.push(component);
        }
        path
    }

    /// Pass 1: create every directory, file, hard link, and junction.
    fn expand(&self, report: &mut ApplyReport) -> Result<()> {
        let mut reader = self.open_archive()?;

        while let Some(entry) = reader.next_entry()? {
            report.entries += 1;

            if entry.is_link() {
                self.expand_link(&entry)?;
                report.links += 1;
            } else if entry.is_directory() {
                info!("expanding {}", entry.name);
                std::fs::create_dir_all(self.dest_path(&entry.name))?;
                report.directories += 1;
            } else {
                info!("expanding {}", entry.name);
                let dest = self.dest_path(&entry.name);
                if !dest.exists() {
                    if let Some(parent) = dest.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    let mut file = File::create(&dest)?;
                    reader.copy_data(&mut file)?;
                }
                report.files += 1;
            }
        }

        report.skipped = reader.skipped_entries();
        Ok(())
    }

    /// Create one hard link or directory junction, skipping it if the link
    /// path already exists from a prior run. Failure is fatal.
    fn expand_link(&self, entry: &ArchiveEntry) -> Result<()> {
        let link = self.dest_path(&entry.name);
        let target = self.dest_path(&entry.link_name);
        info!("linking {} -> {}", entry.link_name, entry.name);

        // symlink_metadata so a dangling junction from a previous partial
        // run still counts as present.
        if link.symlink_metadata().is_ok() {
            return Ok(());
        }

        let created = if entry.is_directory() {
            winfs::create_directory_junction(&link, &target)
        } else {
            winfs::create_hard_link(&link, &target)
        };
        created.map_err(|source| LayerError::Link {
            path: link,
            target,
            source,
        })
    }

    /// Pass 2: restore timestamps and attributes, best-effort per field.
    fn apply_metadata(&self, report: &mut ApplyReport) -> Result<()> {
        let mut reader = self.open_archive()?;

        while let Some(entry) = reader.next_entry()? {
            if entry.extra_headers.is_empty() {
                continue;
            }
            let path = self.dest_path(&entry.name);
            debug!("applying metadata to {}", entry.name);

            if let Some(value) = entry.extra_header(PAX_CREATION_TIME) {
                match parse_epoch_seconds(value) {
                    Ok(time) => {
                        if let Err(e) = winfs::set_creation_time(&path, time) {
                            advise(report, &entry.name, "creation time", e);
                        }
                    }
                    Err(e) => advise(report, &entry.name, "creation time", e),
                }
            }

            if let Some(value) = entry.extra_header(PAX_MTIME) {
                match parse_epoch_seconds(value) {
                    Ok(time) => {
                        if let Err(e) = filetime::set_file_mtime(&path, time) {
                            advise(report, &entry.name, "last-write time", e);
                        }
                    }
                    Err(e) => advise(report, &entry.name, "last-write time", e),
                }
            }

            if let Some(value) = entry.extra_header(PAX_ATIME) {
                match parse_epoch_seconds(value) {
                    Ok(time) => {
                        if let Err(e) = filetime::set_file_atime(&path, time) {
                            advise(report, &entry.name, "last-access time", e);
                        }
                    }
                    Err(e) => advise(report, &entry.name, "last-access time", e),
                }
            }

            if let Some(value) = entry.extra_header(PAX_WIN_FILEATTR) {
                match value.parse::<u32>() {
                    Ok(attributes) => {
                        if let Err(e) = winfs::set_file_attributes(&path, attributes) {
                            advise(report, &entry.name, "file attributes", e);
                        }
                    }
                    Err(e) => advise(report, &entry.name, "file attributes", e),
                }
            }
        }

        Ok(())
    }

    /// Pass 3: restore security descriptors, best-effort per entry.
    fn apply_security(&self, report: &mut ApplyReport) -> Result<()> {
        // Restoring arbitrary owners needs the restore and take-ownership
        // privileges; holding them is the caller's precondition, this only
        // requests enablement. Without them the per-entry applications
        // below fail and surface as warnings.
        if let Err(e) = winfs::enable_restore_privileges() {
            warn!("could not enable restore privileges: {e}");
        }

        let mut reader = self.open_archive()?;

        while let Some(entry) = reader.next_entry()? {
            let Some(encoded) = entry.extra_header(PAX_WIN_RAWSD) else {
                continue;
            };
            let path = self.dest_path(&entry.name);
            debug!("applying security to {}", entry.name);

            match BASE64_STANDARD.decode(encoded) {
                Ok(descriptor) => {
                    if let Err(e) =
                        winfs::set_security_descriptor(&path, entry.is_directory(), &descriptor)
                    {
                        advise(report, &entry.name, "security descriptor", e);
                    }
                }
                Err(e) => advise(report, &entry.name, "security descriptor", e),
            }
        }

        Ok(())
    }
}

/// Materialize `archive` into `root` and return the report.
///
/// Convenience wrapper over [`LayerApplier`].
pub fn apply_layer(archive: impl AsRef<Path>, root: impl AsRef<Path>) -> Result<ApplyReport> {
    LayerApplier::new(archive.as_ref(), root.as_ref()).apply()
}

fn advise(report: &mut ApplyReport, path: &str, field: &'static str, detail: impl fmt::Display) {
    debug!("advisory failure on {path}: {field}: {detail}");
    report.warnings.push(ApplyWarning {
        path: path.to_string(),
        field,
        detail: detail.to_string(),
    });
}

/// Parse a PAX timestamp value: Unix epoch seconds with an optional
/// fractional part.
fn parse_epoch_seconds(value: &str) -> std::result::Result<FileTime, String> {
    let seconds: f64 = value
        .parse()
        .map_err(|e| format!("bad timestamp {value:?}: {e}"))?;
    if !seconds.is_finite() {
        return Err(format!("bad timestamp {value:?}: not finite"));
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round() as u32;
    Ok(FileTime::from_unix_time(
        whole as i64,
        nanos.min(999_999_999),
    ))
}
