//! Helpers shared by file and directory replication.

use filetime::{FileTime, set_file_times};
use std::fs::{self, Metadata};
use std::io;
use std::path::Path;

// =============================================================================
// File content copying
// =============================================================================

/// Copy file contents using the best available method.
///
/// On Linux 4.5+, uses `copy_file_range` so data stays in the kernel.
/// Falls back to `std::io::copy` elsewhere.
pub(crate) fn copy_file_contents(src: &fs::File, dst: &fs::File, len: u64) -> io::Result<u64> {
    #[cfg(target_os = "linux")]
    {
        copy_file_range_all(src, dst, len)
    }
    #[cfg(not(target_os = "linux"))]
    {
        use std::io::BufReader;
        let _ = len;
        io::copy(&mut BufReader::new(src), &mut &*dst)
    }
}

/// Linux-specific: copy using copy_file_range(2).
///
/// Falls back to io::copy when the kernel refuses before any byte moved
/// (cross-device mounts, network filesystems without support).
#[cfg(target_os = "linux")]
fn copy_file_range_all(src: &fs::File, dst: &fs::File, len: u64) -> io::Result<u64> {
    use std::os::unix::io::AsRawFd;

    let src_fd = src.as_raw_fd();
    let dst_fd = dst.as_raw_fd();
    let mut remaining = len;
    let mut copied: u64 = 0;

    while remaining > 0 {
        let chunk_size = remaining.min(128 * 1024 * 1024) as usize; // 128MB chunks

        // SAFETY: both descriptors are open for the duration of the call and
        // null offsets mean "use and advance the file position".
        let result = unsafe {
            libc::copy_file_range(
                src_fd,
                std::ptr::null_mut(),
                dst_fd,
                std::ptr::null_mut(),
                chunk_size,
                0,
            )
        };

        if result < 0 {
            let err = io::Error::last_os_error();
            if copied == 0
                && matches!(
                    err.raw_os_error(),
                    Some(libc::EXDEV)
                        | Some(libc::ENOSYS)
                        | Some(libc::EINVAL)
                        | Some(libc::EOPNOTSUPP)
                )
            {
                use std::io::BufReader;
                return io::copy(&mut BufReader::new(src), &mut &*dst);
            }
            return Err(err);
        }

        if result == 0 {
            // Source shrank while we were copying
            break;
        }

        let bytes_copied = result as u64;
        copied += bytes_copied;
        remaining = remaining.saturating_sub(bytes_copied);
    }

    Ok(copied)
}

// =============================================================================
// Symlink utilities
// =============================================================================

/// Check if path is a symlink without following it
#[inline]
pub(crate) fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

#[cfg(unix)]
pub(crate) use std::os::unix::fs::symlink;

#[cfg(not(unix))]
pub(crate) fn symlink(_target: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Symlinks not supported on this platform",
    ))
}

// =============================================================================
// Metadata and timestamp utilities
// =============================================================================

/// Whether the destination copy is older than the source or differs in size
#[inline]
pub(crate) fn needs_update(src_meta: &Metadata, dst_meta: &Metadata) -> bool {
    match (src_meta.modified(), dst_meta.modified()) {
        (Ok(src_mtime), Ok(dst_mtime)) => src_mtime > dst_mtime || src_meta.len() != dst_meta.len(),
        // Unknown mtime: copy
        _ => true,
    }
}

/// Carry mtime and atime over from the source
pub(crate) fn preserve_timestamps(src_meta: &Metadata, dst: &Path) -> io::Result<()> {
    let mtime = FileTime::from_last_modification_time(src_meta);
    let atime = FileTime::from_last_access_time(src_meta);
    set_file_times(dst, atime, mtime)
}

/// Remove an existing file, symlink, or directory at the given path
#[inline]
pub(crate) fn remove_existing(path: &Path, meta: &Metadata) -> io::Result<()> {
    let ft = meta.file_type();
    if ft.is_symlink() || ft.is_file() {
        fs::remove_file(path)
    } else if ft.is_dir() {
        fs::remove_dir_all(path)
    } else {
        // Sockets, fifos and devices are removed like files
        fs::remove_file(path)
    }
}
