//! Recursive directory replication.
//!
//! Replicating a directory merges the source tree onto the destination:
//! every source entry ends up at the mapped path, existing destination
//! entries of the wrong type are replaced, and destination-only entries are
//! left alone (removal is the job of retract and prune, never of copy).

use crate::error::{Error, Result};
use crate::options::CopyOptions;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::file::copy_file_internal;
use super::utils::{is_symlink, remove_existing, symlink};

/// Outcome of a single file copy inside a directory replicate
#[derive(Debug)]
enum FileCopyOutcome {
    Copied { bytes: u64 },
    Unchanged,
    Failed { src: PathBuf, dst: PathBuf, no_space: bool },
}

/// Statistics from a directory replicate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyStats {
    /// Number of files copied
    pub files_copied: u64,
    /// Number of files left alone because they were already up to date
    pub files_unchanged: u64,
    /// Number of symlinks recreated
    pub symlinks_copied: u64,
    /// Number of directories created
    pub dirs_created: u64,
    /// Total bytes copied
    pub bytes_copied: u64,
    /// Duration of the copy operation
    pub duration: std::time::Duration,
}

/// Copy a directory recursively onto `dst`, merging with what is there.
///
/// # Strategy
///
/// 1. Collect all entries (dirs, files, symlinks) in a single pass
/// 2. Create directory structure first (sequential for parent ordering)
/// 3. Copy files in parallel with controlled concurrency
/// 4. Recreate symlinks (preserving targets)
///
/// # Errors
///
/// Returns an error if:
/// - Source does not exist ([`Error::SourceNotFound`])
/// - Source is not a directory ([`Error::NotADirectory`])
/// - Destination filled up ([`Error::NoSpace`])
/// - Some files or symlinks failed ([`Error::PartialCopy`])
/// - Creating the directory structure fails ([`Error::Io`])
pub fn copy_dir(src: &Path, dst: &Path, options: &CopyOptions) -> Result<CopyStats> {
    let start_time = Instant::now();

    let src_meta = match fs::metadata(src) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::SourceNotFound(src.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    if !src_meta.is_dir() {
        return Err(Error::NotADirectory(src.to_path_buf()));
    }

    // Phase 1: Collect all entries recursively
    let mut dirs: Vec<PathBuf> = Vec::new();
    let mut files: Vec<(PathBuf, PathBuf)> = Vec::new();
    let mut symlinks: Vec<(PathBuf, PathBuf)> = Vec::new();

    collect_entries(src, dst, &mut dirs, &mut files, &mut symlinks, options)?;

    // Phase 2: Create directory structure (sequential, parents first)
    let mut dirs_created = 0u64;
    for dir in &dirs {
        match fs::symlink_metadata(dir) {
            Ok(meta) if meta.is_dir() => continue,
            Ok(meta) => remove_existing(dir, &meta)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(dir)?;
        dirs_created += 1;
    }

    let total_files = files.len();

    // Phase 3: Copy files in parallel
    let mut files_copied: u64 = 0;
    let mut files_unchanged: u64 = 0;
    let mut bytes_copied: u64 = 0;
    let mut failures: Vec<PathBuf> = Vec::new();
    let mut no_space_at: Option<PathBuf> = None;

    if total_files > 0 {
        let do_copy = |files: &[(PathBuf, PathBuf)]| -> Vec<FileCopyOutcome> {
            files
                .par_iter()
                .map(|(src_file, dst_file)| {
                    match copy_file_internal(src_file, dst_file, options) {
                        Ok(result) if result.copied => FileCopyOutcome::Copied {
                            bytes: result.bytes,
                        },
                        Ok(_) => FileCopyOutcome::Unchanged,
                        Err(e) => {
                            let no_space = match &e {
                                Error::Io(io_err) => crate::is_no_space_error(io_err),
                                Error::TempFile { source, .. } => crate::is_no_space_error(source),
                                Error::Persist { source, .. } => crate::is_no_space_error(source),
                                _ => false,
                            };
                            options.warn(&format!("Failed to copy {}: {}", src_file.display(), e));
                            FileCopyOutcome::Failed {
                                src: src_file.clone(),
                                dst: dst_file.clone(),
                                no_space,
                            }
                        }
                    }
                })
                .collect()
        };

        // Use a dedicated pool only if parallelism differs from the global one
        let outcomes = if options.parallel != rayon::current_num_threads() {
            let custom_pool = rayon::ThreadPoolBuilder::new()
                .num_threads(options.parallel)
                .build();

            match custom_pool {
                Ok(pool) => pool.install(|| do_copy(&files)),
                Err(e) => {
                    options.warn(&format!(
                        "Failed to create thread pool ({e}), using global pool"
                    ));
                    do_copy(&files)
                }
            }
        } else {
            do_copy(&files)
        };

        for outcome in outcomes {
            match outcome {
                FileCopyOutcome::Copied { bytes } => {
                    files_copied += 1;
                    bytes_copied += bytes;
                }
                FileCopyOutcome::Unchanged => files_unchanged += 1,
                FileCopyOutcome::Failed { src, dst, no_space } => {
                    if no_space && no_space_at.is_none() {
                        no_space_at = Some(dst);
                    }
                    failures.push(src);
                }
            }
        }

        // Copied files stay: they are correct mirror content.
        if let Some(path) = no_space_at {
            return Err(Error::NoSpace {
                files_copied: files_copied as usize,
                failed_files: failures.len(),
                total_files,
                path,
            });
        }
    }

    // Phase 4: Recreate symlinks (preserving their targets)
    let mut symlinks_copied = 0u64;
    for (src_link, dst_link) in &symlinks {
        match recreate_symlink(src_link, dst_link) {
            Ok(true) => symlinks_copied += 1,
            Ok(false) => {}
            Err(e) => {
                options.warn(&format!(
                    "Failed to recreate symlink {}: {}",
                    dst_link.display(),
                    e
                ));
                failures.push(src_link.clone());
            }
        }
    }

    if let Some(first) = failures.first() {
        return Err(Error::PartialCopy {
            failed: failures.len(),
            total: total_files + symlinks.len(),
            first: first.clone(),
        });
    }

    Ok(CopyStats {
        files_copied,
        files_unchanged,
        symlinks_copied,
        dirs_created,
        bytes_copied,
        duration: start_time.elapsed(),
    })
}

/// Point `dst_link` at the same target as `src_link`, replacing what is there.
///
/// Returns `false` if an identical link was already in place.
fn recreate_symlink(src_link: &Path, dst_link: &Path) -> io::Result<bool> {
    let target = fs::read_link(src_link)?;

    if let Ok(meta) = fs::symlink_metadata(dst_link) {
        if is_symlink(dst_link) && fs::read_link(dst_link).is_ok_and(|t| t == target) {
            return Ok(false);
        }
        remove_existing(dst_link, &meta)?;
    }

    symlink(&target, dst_link)?;
    Ok(true)
}

/// Recursively collect all directories, files, and symlinks to copy.
///
/// Symlinks are never followed, so the walk cannot loop.
fn collect_entries(
    src: &Path,
    dst: &Path,
    dirs: &mut Vec<PathBuf>,
    files: &mut Vec<(PathBuf, PathBuf)>,
    symlinks: &mut Vec<(PathBuf, PathBuf)>,
    options: &CopyOptions,
) -> Result<()> {
    dirs.push(dst.to_path_buf());

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        // Check symlink FIRST (before is_dir/is_file which follow symlinks)
        let file_type = entry.file_type()?;

        if file_type.is_symlink() {
            symlinks.push((src_path, dst_path));
        } else if file_type.is_dir() {
            collect_entries(&src_path, &dst_path, dirs, files, symlinks, options)?;
        } else if file_type.is_file() {
            files.push((src_path, dst_path));
        } else {
            options.warn(&format!("Skipping special file: {}", src_path.display()));
        }
    }

    Ok(())
}
