use crate::errors::{Error, Result};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hemocare_secure_spec::KeyValueStore;
use ring::digest::{SHA256, digest};
use std::fmt::Write as _;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Filesystem-backed store: one file per key under `root`.
///
/// File names are the URL-safe base64 of the key, so any key string maps to
/// exactly one file. Keys whose encoded name would pass
/// [`MAX_ENCODED_NAME_LEN`] are stored under `~sha256-<hex digest>` instead;
/// `~` is outside the base64 alphabet, so the two name forms never meet.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

/// Longest base64 file name used before switching to a hashed name.
pub const MAX_ENCODED_NAME_LEN: usize = 200;

const HASHED_NAME_PREFIX: &str = "~sha256-";

impl FileStore {
    /// Construct a new file store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for_key(&self, key: &str) -> PathBuf {
        self.root.join(file_name(key))
    }
}

fn file_name(key: &str) -> String {
    let encoded = URL_SAFE_NO_PAD.encode(key.as_bytes());
    if encoded.len() <= MAX_ENCODED_NAME_LEN {
        return encoded;
    }
    let hash = digest(&SHA256, key.as_bytes());
    let mut name = String::with_capacity(HASHED_NAME_PREFIX.len() + 64);
    name.push_str(HASHED_NAME_PREFIX);
    for byte in hash.as_ref() {
        let _ = write!(name, "{byte:02x}");
    }
    name
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for_key(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::Storage(err.to_string())),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|err| Error::Storage(err.to_string()))?;
        let path = self.path_for_key(key);
        let mut file = fs::File::create(&path).map_err(|err| Error::Storage(err.to_string()))?;
        file.write_all(value.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|err| Error::Storage(err.to_string()))
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for_key(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::Storage(err.to_string())),
        }
    }

    fn clear(&self) -> Result<()> {
        if !self.root.exists() {
            return Ok(());
        }
        for path in read_dir_files(&self.root)? {
            fs::remove_file(&path).map_err(|err| Error::Storage(err.to_string()))?;
        }
        Ok(())
    }
}

fn read_dir_files(path: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path).map_err(|err| Error::Storage(err.to_string()))? {
        let entry = entry.map_err(|err| Error::Storage(err.to_string()))?;
        let file_type = entry
            .file_type()
            .map_err(|err| Error::Storage(err.to_string()))?;
        if file_type.is_file() {
            entries.push(entry.path());
        }
    }
    Ok(entries)
}
