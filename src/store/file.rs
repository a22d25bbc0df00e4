//! Local file store.
//!
//! # Warning
//!
//! Values are stored in clear, using the binary layout described in
//! [`crate::codec`]. This store is meant for tests and throwaway setups only.
//!
//! Every operation reads and decodes the whole file, applies the change, then
//! truncates and rewrites it. There is no locking across processes: two
//! invocations writing the same file race and the last writer wins, and a
//! reader interleaved with a rewrite can observe a truncated file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{decode_fragment, Builder, Store, StoreError, StoreResult};
use crate::codec::{self, RawMap};

/// Builder for [`FileStore`] (`type = "filestore"`).
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileStoreBuilder {
    /// Path of the store file. Defaults to `<data dir>/secenv/stores/<name>`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl FileStoreBuilder {
    pub const TYPE: &'static str = "filestore";

    /// Default location of the file backing the store `name`.
    pub fn default_path(name: &str) -> StoreResult<PathBuf> {
        let data_dir = dirs::data_dir().ok_or(StoreError::MissingField("path"))?;
        Ok(data_dir.join("secenv").join("stores").join(name))
    }
}

#[async_trait]
impl Builder for FileStoreBuilder {
    fn configure(&mut self, fragment: toml::Value) -> StoreResult<()> {
        *self = decode_fragment(fragment)?;
        Ok(())
    }

    async fn build(&self, name: &str) -> StoreResult<Box<dyn Store>> {
        let path = match &self.path {
            Some(path) if !path.as_os_str().is_empty() => path.clone(),
            _ => {
                let path = Self::default_path(name)?;
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).map_err(|e| {
                        StoreError::backend(format!("create {}", parent.display()), e)
                    })?;
                }
                path
            }
        };

        debug!(store = name, path = %path.display(), "Opening file store");
        Ok(Box::new(FileStore::open(path)?))
    }
}

/// Store backed by a single binary file.
#[derive(Debug)]
pub struct FileStore {
    file: Mutex<File>,
    path: PathBuf,
}

impl FileStore {
    /// Open the store at `path`, creating an empty file if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true).truncate(false);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let file = options
            .open(&path)
            .map_err(|e| StoreError::backend(format!("open {}", path.display()), e))?;

        Ok(Self {
            file: Mutex::new(file),
            path,
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, File>> {
        self.file
            .lock()
            .map_err(|_| StoreError::backend("lock store file", "file handle poisoned"))
    }

    fn read_map(file: &mut File) -> StoreResult<RawMap> {
        file.seek(SeekFrom::Start(0))
            .map_err(|e| StoreError::backend("read store file", e))?;
        codec::decode(BufReader::new(&*file)).map_err(|e| match e {
            codec::CodecError::Io(e) => StoreError::backend("read store file", e),
            other => other.into(),
        })
    }

    fn write_map(file: &mut File, map: &RawMap) -> StoreResult<()> {
        // Encode first so an oversized entry leaves the file untouched.
        let bytes = codec::encode_to_vec(map)?;

        let write = |file: &mut File| -> std::io::Result<()> {
            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&bytes)?;
            file.flush()
        };
        write(file).map_err(|e| StoreError::backend("write store file", e))
    }
}

#[async_trait]
impl Store for FileStore {
    async fn get(&self, key: &str) -> StoreResult<String> {
        let mut file = self.lock()?;
        let mut map = Self::read_map(&mut file)?;

        let value = map.remove(key.as_bytes()).ok_or(StoreError::KeyNotFound)?;
        String::from_utf8(value).map_err(|_| StoreError::UnsupportedPayload {
            key: key.to_string(),
        })
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut file = self.lock()?;
        let mut map = Self::read_map(&mut file)?;

        map.insert(key.as_bytes().to_vec(), value.as_bytes().to_vec());
        Self::write_map(&mut file, &map)
    }

    /// Removing an absent key succeeds and rewrites the file unchanged.
    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut file = self.lock()?;
        let mut map = Self::read_map(&mut file)?;

        map.remove(key.as_bytes());
        Self::write_map(&mut file, &map)
    }
}
