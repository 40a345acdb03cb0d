//! Backing stores for the encrypted token cache

use std::{
    io,
    sync::{Arc, Mutex, PoisonError},
};

use super::BackingStore;

#[cfg(feature = "file")]
pub use file::FileStore;

/// A backing store held in memory
///
/// Clones share the same blob, so a test can inspect or alter what a cache
/// has written.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemoryStore {
    /// Constructs an empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the stored blob
    #[must_use]
    pub fn contents(&self) -> Option<Vec<u8>> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the stored blob
    pub fn replace(&self, data: Option<Vec<u8>>) {
        *self.data.lock().unwrap_or_else(PoisonError::into_inner) = data;
    }
}

impl BackingStore for MemoryStore {
    fn read_all(&self) -> io::Result<Option<Vec<u8>>> {
        Ok(self.contents())
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.replace(Some(data.to_vec()));
        Ok(())
    }
}

#[cfg(feature = "file")]
mod file {
    use std::{
        ffi::OsString,
        fs::{self, OpenOptions},
        io::{self, Write},
        path::{Path, PathBuf},
    };

    use crate::cache::BackingStore;

    /// A backing store that uses a local file
    ///
    /// Writes go to a temporary sibling file which then replaces the target,
    /// so a reader never sees a partial write. On Unix the file is readable
    /// by its owner only.
    #[derive(Debug, Clone)]
    pub struct FileStore {
        path: PathBuf,
    }

    impl FileStore {
        /// Constructs a new file store
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }

        /// The path of the stored blob
        #[must_use]
        pub fn path(&self) -> &Path {
            &self.path
        }

        fn temp_path(&self) -> PathBuf {
            let mut name = OsString::from(".");
            name.push(self.path.file_name().unwrap_or_default());
            name.push(".tmp");
            self.path.with_file_name(name)
        }
    }

    impl BackingStore for FileStore {
        fn read_all(&self) -> io::Result<Option<Vec<u8>>> {
            match fs::read(&self.path) {
                Ok(data) => Ok(Some(data)),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(err) => Err(err),
            }
        }

        fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
            let temp = self.temp_path();

            let mut file_opts = OpenOptions::new();
            file_opts.create(true).truncate(true).write(true);

            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                file_opts.mode(0o600);
            }

            let result = file_opts.open(&temp).and_then(|mut file| {
                file.write_all(data)?;
                file.sync_all()
            });

            match result.and_then(|()| fs::rename(&temp, &self.path)) {
                Ok(()) => Ok(()),
                Err(err) => {
                    let _ = fs::remove_file(&temp);
                    Err(err)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;

    #[test]
    fn memory_store_clones_share_contents() -> Result<()> {
        let mut store = MemoryStore::new();
        let observer = store.clone();
        assert_eq!(store.read_all()?, None);

        store.write_all(b"first")?;
        store.write_all(b"second")?;
        assert_eq!(observer.contents().as_deref(), Some(&b"second"[..]));

        observer.replace(None);
        assert_eq!(store.read_all()?, None);
        Ok(())
    }

    #[cfg(feature = "file")]
    #[test]
    fn file_store_replaces_whole_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut store = FileStore::new(dir.path().join("token.cache"));

        assert_eq!(store.read_all()?, None);

        store.write_all(b"a much longer first blob")?;
        store.write_all(b"short")?;
        assert_eq!(store.read_all()?.as_deref(), Some(&b"short"[..]));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("token.cache")]);
        Ok(())
    }

    #[cfg(all(feature = "file", unix))]
    #[test]
    fn file_store_is_owner_only() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let mut store = FileStore::new(dir.path().join("token.cache"));
        store.write_all(b"secret")?;

        let mode = std::fs::metadata(store.path())?.permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        Ok(())
    }

    #[cfg(feature = "file")]
    #[test]
    fn file_store_reports_unreadable_path() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FileStore::new(dir.path());
        assert!(store.read_all().is_err());
        Ok(())
    }
}
