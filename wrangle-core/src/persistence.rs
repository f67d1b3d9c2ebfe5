//! Shared persistence utilities: atomic file writes and cross-device moves.
//!
//! Every output of the pipeline goes through a `.tmp` sibling that is renamed
//! into place once fully written, so a present file is always a complete one.

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Temp sibling used while `path` is being written (`data.csv` -> `data.csv.tmp`).
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("output"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Atomically write raw bytes to a file.
///
/// Writes to a `.tmp` sibling file, then atomically renames to the target path.
/// Creates parent directories if they don't exist.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    atomic_write_with(path, |w| w.write_all(data))
}

/// Atomically write a file through a buffered writer.
///
/// The closure receives a writer over the `.tmp` sibling. On success the writer
/// is flushed, synced and renamed over `path`; on failure the temp file is
/// removed and the target is left untouched.
pub fn atomic_write_with<F>(path: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    let result = (|| {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        write(&mut writer)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

/// Move a file, falling back to copy + rename when `rename` cannot cross devices.
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::debug!(
                from = %from.display(),
                to = %to.display(),
                error = %err,
                "rename failed, copying instead"
            );
            let tmp = tmp_path(to);
            if let Err(copy_err) = std::fs::copy(from, &tmp) {
                let _ = std::fs::remove_file(&tmp);
                return Err(copy_err);
            }
            std::fs::rename(&tmp, to)?;
            std::fs::remove_file(from)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_tmp_path_keeps_extension() {
        assert_eq!(
            tmp_path(Path::new("dir/raw_short.csv")),
            PathBuf::from("dir/raw_short.csv.tmp")
        );
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("dir").join("out.csv");

        atomic_write(&path, b"a,b\n1,2\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,b\n1,2\n");
    }

    #[test]
    fn test_atomic_write_no_tmp_leftover() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clean.csv");

        atomic_write(&path, b"x").unwrap();
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn test_failed_write_leaves_no_target() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.csv");

        let result = atomic_write_with(&path, |w| {
            w.write_all(b"partial")?;
            Err(io::Error::other("boom"))
        });
        assert!(result.is_err());
        assert!(!path.exists());
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn test_move_file() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("download").join("data.csv");
        std::fs::create_dir_all(from.parent().unwrap()).unwrap();
        std::fs::write(&from, "payload").unwrap();
        let to = dir.path().join("raw_full.csv");

        move_file(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read_to_string(&to).unwrap(), "payload");
    }
}
