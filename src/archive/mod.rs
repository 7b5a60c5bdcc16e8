//! Raw-data archiver.
//!
//! Compresses a run's raw-input subtree into `<code>_raw_data_<YYYYMMDD>.tar.gz`
//! inside the run directory. The archive is built in a temp file, read back
//! and checked against the files it was built from, and only then renamed
//! into place. The subtree is deleted last, and only when asked.

use crate::config::Config;
use crate::error::{KbError, Result};
use crate::fsutil::temp_file_beside;
use crate::models::{format_mb, ArchiveArtifact};
use crate::run_dir::RunId;
use crate::scanner::relative_path;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tar::HeaderMode;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Options for archiving.
#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    /// Raw-input subtree, relative to the run directory.
    pub raw_dir: String,
    /// Keep the subtree after a verified archive.
    pub keep_original: bool,
    /// gzip level, 0-9.
    pub compression_level: u32,
    /// Show a progress bar while compressing.
    pub show_progress: bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            raw_dir: "raw_data".to_string(),
            keep_original: true,
            compression_level: 6,
            show_progress: false,
        }
    }
}

impl From<&Config> for ArchiveOptions {
    fn from(config: &Config) -> Self {
        Self {
            raw_dir: config.archive.raw_dir.clone(),
            keep_original: config.archive.keep_original,
            compression_level: config.archive.compression_level.min(9),
            show_progress: true,
        }
    }
}

/// One path going into the archive.
#[derive(Debug)]
struct Member {
    /// Name inside the archive, under the raw-dir prefix.
    name: String,
    source: PathBuf,
    /// `None` for directories.
    size: Option<u64>,
}

/// Archiver for one run's raw inputs.
pub struct Archiver {
    options: ArchiveOptions,
}

impl Archiver {
    pub fn new(options: ArchiveOptions) -> Self {
        Self { options }
    }

    /// Archive the raw-input subtree of `run_dir`.
    ///
    /// Returns `Ok(None)` when the run has no raw-input subtree.
    pub fn archive(&self, run_dir: &Path, run: &RunId) -> Result<Option<ArchiveArtifact>> {
        let prefix = self.options.raw_dir.trim_end_matches('/');
        let source = run_dir.join(prefix);
        if !source.is_dir() {
            warn!("No {} directory in {}, skipping archive", prefix, run_dir.display());
            return Ok(None);
        }

        let dest = run_dir.join(run.archive_name());
        let members = collect_members(&source, prefix)?;
        let file_count = members.iter().filter(|m| m.size.is_some()).count();
        let original_size: u64 = members.iter().filter_map(|m| m.size).sum();

        info!(
            "Archiving {} files ({}) from {}",
            file_count,
            format_mb(original_size),
            source.display()
        );

        let tmp = temp_file_beside(&dest)?;
        self.write_archive(tmp.as_file().try_clone()?, &members)?;

        let expected: BTreeMap<String, Option<u64>> =
            members.iter().map(|m| (m.name.clone(), m.size)).collect();
        verify(tmp.path(), &expected).map_err(|reason| KbError::ArchiveIntegrity {
            path: dest.clone(),
            reason,
        })?;
        debug!("Verified {} archive entries", expected.len());

        tmp.persist(&dest).map_err(|e| e.error)?;
        let compressed_size = std::fs::metadata(&dest)?.len();

        let source_removed = if self.options.keep_original {
            false
        } else {
            match std::fs::remove_dir_all(&source) {
                Ok(()) => {
                    info!("Removed {}", source.display());
                    true
                }
                Err(e) => {
                    warn!("Archive is in place but {} could not be removed: {}", source.display(), e);
                    false
                }
            }
        };

        let artifact = ArchiveArtifact {
            path: dest,
            original_size,
            compressed_size,
            file_count,
            source_removed,
        };
        info!(
            "Archive written: {} ({} -> {}, {:.1}% smaller)",
            artifact.path.display(),
            format_mb(original_size),
            format_mb(compressed_size),
            artifact.reduction_percent()
        );

        Ok(Some(artifact))
    }

    fn write_archive(&self, file: File, members: &[Member]) -> Result<()> {
        let progress = self.progress_bar(members.len() as u64);

        let encoder = GzEncoder::new(
            BufWriter::new(file),
            Compression::new(self.options.compression_level.min(9)),
        );
        let mut builder = tar::Builder::new(encoder);
        builder.mode(HeaderMode::Deterministic);
        builder.follow_symlinks(false);

        for member in members {
            match member.size {
                None => builder.append_dir(&member.name, &member.source)?,
                Some(_) => builder.append_path_with_name(&member.source, &member.name)?,
            }
            progress.inc(1);
        }

        let writer = builder.into_inner()?.finish()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        progress.finish_and_clear();
        Ok(())
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map(|s| s.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb.set_message("compressing");
        pb
    }
}

/// Every directory and regular file under `source`, in lexicographic order.
fn collect_members(source: &Path, prefix: &str) -> Result<Vec<Member>> {
    let mut members = Vec::new();

    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let rel = relative_path(source, entry.path());
        let name = if rel.is_empty() {
            prefix.to_string()
        } else {
            format!("{}/{}", prefix, rel)
        };

        let file_type = entry.file_type();
        let size = if file_type.is_dir() {
            None
        } else if file_type.is_file() {
            Some(entry.metadata().map_err(io::Error::from)?.len())
        } else {
            warn!("Not archiving special file {}", entry.path().display());
            continue;
        };

        members.push(Member {
            name,
            source: entry.into_path(),
            size,
        });
    }

    Ok(members)
}

/// Read the whole archive back and compare it with what went in.
fn verify(archive: &Path, expected: &BTreeMap<String, Option<u64>>) -> std::result::Result<(), String> {
    let file = File::open(archive).map_err(|e| format!("cannot reopen archive: {}", e))?;
    let mut reader = tar::Archive::new(GzDecoder::new(BufReader::new(file)));

    let mut found = BTreeMap::new();
    let entries = reader
        .entries()
        .map_err(|e| format!("cannot read archive: {}", e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| format!("corrupt entry: {}", e))?;
        let name = entry
            .path()
            .map_err(|e| format!("bad entry path: {}", e))?
            .to_string_lossy()
            .trim_end_matches('/')
            .to_string();

        let size = if entry.header().entry_type().is_dir() {
            None
        } else {
            let declared = entry
                .header()
                .size()
                .map_err(|e| format!("bad size for {}: {}", name, e))?;
            let read = io::copy(&mut entry, &mut io::sink())
                .map_err(|e| format!("cannot decompress {}: {}", name, e))?;
            if read != declared {
                return Err(format!("{}: read {} bytes, header says {}", name, read, declared));
            }
            Some(read)
        };
        found.insert(name, size);
    }

    if &found != expected {
        let missing: Vec<_> = expected.keys().filter(|k| !found.contains_key(*k)).collect();
        let differing: Vec<_> = found
            .iter()
            .filter(|(k, v)| expected.get(k.as_str()) != Some(*v))
            .map(|(k, _)| k)
            .collect();
        return Err(format!(
            "archive does not match source (missing: {:?}, unexpected or resized: {:?})",
            missing, differing
        ));
    }

    Ok(())
}

/// Restore an archive into `dest`. Returns the number of files written.
///
/// Entries that would land outside `dest` are skipped.
pub fn extract(archive: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(archive)?;
    let mut reader = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    std::fs::create_dir_all(dest)?;

    let mut files = 0;
    for entry in reader.entries()? {
        let mut entry = entry?;
        let is_file = entry.header().entry_type().is_file();
        if entry.unpack_in(dest)? {
            if is_file {
                files += 1;
            }
        } else {
            warn!("Skipped unsafe archive entry in {}", archive.display());
        }
    }

    debug!("Extracted {} files from {}", files, archive.display());
    Ok(files)
}
