//! Single file replication.
//!
//! Content is written next to the destination in a temp file and renamed
//! over it, so a reader of the mirror never sees a half-written file even
//! when the source is large or the destination is a slow network mount.

use crate::error::{Error, Result};
use crate::options::{CopyOptions, OnConflict};
use std::fs::{self, File};
use std::io;
use std::path::Path;

use super::utils::{copy_file_contents, needs_update, preserve_timestamps, remove_existing};

/// Result of a single file copy operation (internal use)
#[derive(Debug, Clone, Copy)]
pub(crate) struct FileCopyResult {
    /// Whether the file was actually copied (false = already up to date)
    pub copied: bool,
    /// Number of bytes copied (0 if skipped)
    pub bytes: u64,
}

impl FileCopyResult {
    pub(crate) fn copied(bytes: u64) -> Self {
        Self {
            copied: true,
            bytes,
        }
    }

    pub(crate) fn skipped() -> Self {
        Self {
            copied: false,
            bytes: 0,
        }
    }
}

/// Copy a single file atomically onto `dst`, replacing whatever is there.
///
/// A directory or symlink occupying `dst` is removed first. Symlinks in
/// `src` are followed.
///
/// # Returns
///
/// Returns `Ok(true)` if the file was copied, `Ok(false)` if it was skipped
/// because [`OnConflict::UpdateNewer`] found the destination up to date.
///
/// # Errors
///
/// Returns an error if:
/// - Source is a directory ([`Error::Io`] with kind `IsADirectory`)
/// - IO operations fail ([`Error::Io`])
/// - Temp file creation fails ([`Error::TempFile`])
/// - Atomic rename fails ([`Error::Persist`])
#[must_use = "returns false if file was skipped, check the result"]
pub fn copy_file(src: &Path, dst: &Path, options: &CopyOptions) -> Result<bool> {
    copy_file_internal(src, dst, options).map(|r| r.copied)
}

/// Internal file copy that returns detailed result including bytes copied.
pub(crate) fn copy_file_internal(
    src: &Path,
    dst: &Path,
    options: &CopyOptions,
) -> Result<FileCopyResult> {
    // Single stat call for all checks
    let src_meta = fs::metadata(src)?;

    if src_meta.is_dir() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::IsADirectory,
            format!("{} is a directory", src.display()),
        )));
    }

    let file_len = src_meta.len();

    match fs::symlink_metadata(dst) {
        Ok(dst_meta) => {
            let same_kind = dst_meta.file_type().is_file();
            if same_kind
                && options.on_conflict == OnConflict::UpdateNewer
                && !needs_update(&src_meta, &dst_meta)
            {
                return Ok(FileCopyResult::skipped());
            }
            // A regular file is replaced by the rename below; anything else
            // (directory, symlink) has to go first.
            if !same_kind {
                remove_existing(dst, &dst_meta)?;
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let src_file = File::open(src)?;

    let dst_parent = dst.parent().unwrap_or(Path::new("."));

    // Permissions are not mirrored; ask for 0o666 so the umask decides,
    // instead of tempfile's private 0o600 default.
    #[cfg(unix)]
    let temp_file = {
        use std::os::unix::fs::PermissionsExt;
        tempfile::Builder::new()
            .prefix(".treemirror")
            .permissions(fs::Permissions::from_mode(0o666))
            .tempfile_in(dst_parent)
            .map_err(|e| Error::TempFile {
                path: dst_parent.to_path_buf(),
                source: e,
            })?
    };
    #[cfg(not(unix))]
    let temp_file = tempfile::Builder::new()
        .prefix(".treemirror")
        .tempfile_in(dst_parent)
        .map_err(|e| Error::TempFile {
            path: dst_parent.to_path_buf(),
            source: e,
        })?;

    let bytes_copied = copy_file_contents(&src_file, temp_file.as_file(), file_len)?;

    if options.fsync {
        temp_file.as_file().sync_all()?;
    }

    temp_file.persist(dst).map_err(|e| Error::Persist {
        path: dst.to_path_buf(),
        source: e.error,
    })?;

    // Update-newer relies on the mirror carrying the source mtime
    if let Err(e) = preserve_timestamps(&src_meta, dst) {
        options.warn(&format!(
            "Failed to preserve timestamps on {}: {}",
            dst.display(),
            e
        ));
    }

    Ok(FileCopyResult::copied(bytes_copied))
}
