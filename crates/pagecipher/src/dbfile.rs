//! Handle to an on-disk encrypted database.
//!
//! Key validation only ever needs page 1, so a [`DbFile`] reads exactly one
//! page at construction and owns the bytes. Immutable afterwards; safe to
//! share across worker threads.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{CipherError, CipherResult};
use crate::profile::SALT_LEN;

/// A database path plus its owned first page.
#[derive(Debug, Clone)]
pub struct DbFile {
    path: PathBuf,
    first_page: Vec<u8>,
}

impl DbFile {
    /// Open `path` and read exactly `page_size` bytes.
    ///
    /// Fails with [`CipherError::ShortFile`] when the file holds fewer bytes
    /// than one page.
    pub fn open(path: impl AsRef<Path>, page_size: usize) -> CipherResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;

        let mut first_page = vec![0u8; page_size];
        let mut got = 0;
        while got < page_size {
            let n = file.read(&mut first_page[got..])?;
            if n == 0 {
                return Err(CipherError::short_file(
                    path.display().to_string(),
                    got,
                    page_size,
                ));
            }
            got += n;
        }

        debug!(path = %path.display(), page_size, "opened database file");
        Ok(DbFile { path, first_page })
    }

    /// The database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The owned first page.
    pub fn first_page(&self) -> &[u8] {
        &self.first_page
    }

    /// The per-database salt: the first 16 bytes of page 1.
    pub fn salt(&self) -> [u8; SALT_LEN] {
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&self.first_page[..SALT_LEN]);
        salt
    }
}
