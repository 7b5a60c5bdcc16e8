//! Filesystem helpers.

use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Prefix of temp files created next to their final destination.
pub const TEMP_PREFIX: &str = ".company-kb-tmp";

/// Replace `path` with `contents` so readers see either the old or the new file.
///
/// The temp file lives in the destination directory; rename is only atomic
/// within one filesystem.
pub fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        Some(_) => Path::new("."),
        None => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path {} has no parent directory", path.display()),
            ))
        }
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::Builder::new().prefix(TEMP_PREFIX).tempfile_in(parent)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create a temp file next to `path`, for callers that stream their output.
pub fn temp_file_beside(path: &Path) -> io::Result<NamedTempFile> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    tempfile::Builder::new().prefix(TEMP_PREFIX).tempfile_in(parent)
}
