//! File I/O helpers.
//!
//! Small files go through the standard buffered read; large files are
//! memory-mapped to avoid double-buffering whole documents.

use std::fs;
use std::io;
use std::path::Path;

use memmap2::Mmap;

/// Files at or above this size are memory-mapped instead of read into a
/// buffer first.
const MMAP_THRESHOLD: u64 = 1024 * 1024;

/// Reads a file into a `String`, memory-mapping large files.
///
/// # Errors
///
/// Returns an [`io::Error`] if the file cannot be opened or read, or if
/// its contents are not valid UTF-8.
#[allow(unsafe_code)]
pub fn read_file(path: &Path) -> io::Result<String> {
    let metadata = fs::metadata(path)?;

    if metadata.len() < MMAP_THRESHOLD {
        return fs::read_to_string(path);
    }

    let file = fs::File::open(path)?;
    // SAFETY: the mapping is read-only and dropped before this function
    // returns; the file must not be truncated by another process while
    // mapped, which holds for the corpus mirror this reads from.
    let mmap = unsafe { Mmap::map(&file)? };
    let text = std::str::from_utf8(&mmap).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("'{}' is not valid UTF-8: {e}", path.display()),
        )
    })?;
    Ok(text.to_string())
}

/// Writes a string to a file, creating parent directories as needed.
///
/// # Errors
///
/// Returns an [`io::Error`] if directory creation or the write fails.
pub fn write_file(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, contents)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_round_trip() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let path = dir.path().join("nested").join("doc.txt");

        write_file(&path, "hello docs").unwrap_or_else(|e| panic!("write failed: {e}"));
        let text = read_file(&path).unwrap_or_else(|e| panic!("read failed: {e}"));
        assert_eq!(text, "hello docs");
    }

    #[test]
    fn test_read_missing_file() {
        let result = read_file(Path::new("/nonexistent/docent/file.txt"));
        assert!(result.is_err());
    }

    #[test]
    fn test_read_rejects_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let path = dir.path().join("bad.bin");
        fs::write(&path, [0xFFu8, 0xFE, 0x00, 0x9F]).unwrap_or_else(|e| panic!("write: {e}"));

        let result = read_file(&path);
        assert!(result.is_err());
    }
}
