//! Directory-backed `Storage`: one file per name.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use erg_traits::{BoxError, Storage};

use crate::atomic::write_atomic;

#[derive(Debug, Clone)]
pub struct DirStorage {
    dir: PathBuf,
}

impl DirStorage {
    /// Create the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl Storage for DirStorage {
    fn read(&mut self, name: &str) -> Result<Option<Vec<u8>>, BoxError> {
        match fs::read(self.path_of(name)) {
            Ok(b) => Ok(Some(b)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, name: &str, bytes: &[u8]) -> Result<(), BoxError> {
        write_atomic(&self.path_of(name), bytes)?;
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), BoxError> {
        match fs::remove_file(self.path_of(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
