//! Dataset storage on top of an [`ObjectStore`].
//!
//! Datasets are addressed by string paths. Local paths are absolute (or
//! relative to the working directory) filesystem paths; other stores are
//! addressed as `<protocol>://<key>`. Listing and glob results come back in
//! the same form, so they can be fed straight back into the storage.
//!
//! The API is synchronous; each call drives the store's future to completion
//! on the calling thread.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use futures::{TryStreamExt, executor::block_on};
use object_store::{ObjectMeta, ObjectStore, PutPayload, local::LocalFileSystem, memory::InMemory, path::Path};
use parquet::{
    errors::ParquetError,
    file::metadata::{ParquetMetaData, ParquetMetaDataReader},
};
use wax::{Glob, Pattern};

use crate::{Error, Result, natural::sort_naturally};

/// Bytes fetched from the end of a file in the first footer request.
const FOOTER_READ_HINT: u64 = 16 * 1024;
/// Metadata length plus the `PAR1` magic.
const FOOTER_TAIL_LEN: u64 = 8;
const PARQUET_MAGIC: &[u8; 4] = b"PAR1";

/// Token identifying how fresh a cached directory listing must be.
///
/// Listings cached under an older generation are discarded when a newer
/// generation is requested. Writes through a [`Storage`] drop the listing of
/// the directory they touch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheGeneration(u64);

impl CacheGeneration {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Object store holding dataset files, plus a cache of directory listings.
///
/// Cloning is cheap; clones share the store and the listing cache.
#[derive(Clone, Debug)]
pub struct Storage {
    store: Arc<dyn ObjectStore>,
    protocol: String,
    listings: Arc<Mutex<HashMap<String, (CacheGeneration, Vec<String>)>>>,
}

impl Storage {
    /// Wraps `store`, addressed as `<protocol>://...` unless the protocol is
    /// local (`file`), in which case paths are plain filesystem paths.
    pub fn new(store: Arc<dyn ObjectStore>, protocol: impl Into<String>) -> Self {
        Self {
            store,
            protocol: protocol.into(),
            listings: Arc::default(),
        }
    }

    /// The local filesystem.
    pub fn local() -> Self {
        Self::new(Arc::new(LocalFileSystem::new()), "file")
    }

    /// A fresh in-process store addressed as `memory://...`.
    pub fn memory() -> Self {
        Self::new(Arc::new(InMemory::new()), "memory")
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn is_local(&self) -> bool {
        matches!(self.protocol.as_str(), "file" | "abstract")
    }

    pub fn exists(&self, path: &str) -> Result<bool> {
        match block_on(self.store.head(&self.location(path)?)) {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => self.is_dir(path),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether anything is stored below `path`.
    pub fn is_dir(&self, path: &str) -> Result<bool> {
        let listing = block_on(self.store.list_with_delimiter(Some(&self.location(path)?)))?;
        Ok(!listing.objects.is_empty() || !listing.common_prefixes.is_empty())
    }

    /// Files directly inside `dir`, in natural order.
    pub fn list_files(&self, dir: &str, generation: CacheGeneration) -> Result<Vec<String>> {
        let location = self.location(dir)?;
        let key = location.to_string();
        {
            let listings = self.listings.lock().unwrap_or_else(|e| e.into_inner());
            if let Some((cached, files)) = listings.get(&key) {
                if *cached >= generation {
                    return Ok(files.clone());
                }
            }
        }

        let listing = block_on(self.store.list_with_delimiter(Some(&location)))?;
        let mut files: Vec<String> = listing
            .objects
            .iter()
            .map(|object| self.user_path(object.location.as_ref()))
            .collect();
        sort_naturally(&mut files);
        tracing::trace!(dir, files = files.len(), "listed directory");

        let mut listings = self.listings.lock().unwrap_or_else(|e| e.into_inner());
        listings.insert(key, (generation, files.clone()));
        Ok(files)
    }

    /// Files and directories matching `pattern`, in natural order.
    ///
    /// Only the part of the store below the pattern's literal prefix is listed.
    pub fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let key = self.key(pattern)?;
        let glob = Glob::new(&key).map_err(|e| Error::Glob(e.to_string()))?;
        let literal: Vec<&str> = key.split('/').take_while(|part| !has_glob_magic(part)).collect();
        let prefix = Path::parse(literal.join("/"))?;

        let objects: Vec<ObjectMeta> = block_on(self.store.list(Some(&prefix)).try_collect())?;
        let mut candidates = BTreeSet::new();
        for object in &objects {
            let mut candidate = object.location.as_ref();
            while candidate.len() > prefix.as_ref().len() {
                candidates.insert(candidate);
                candidate = candidate.rsplit_once('/').map_or("", |(parent, _)| parent);
            }
        }
        let mut matches: Vec<String> = candidates
            .into_iter()
            .filter(|candidate| glob.is_match(*candidate))
            .map(|candidate| self.user_path(candidate))
            .collect();
        sort_naturally(&mut matches);
        Ok(matches)
    }

    pub fn read(&self, path: &str) -> Result<Bytes> {
        block_on(self.read_async(path))
    }

    pub(crate) async fn read_async(&self, path: &str) -> Result<Bytes> {
        let location = self.location(path)?;
        Ok(self.store.get(&location).await?.bytes().await?)
    }

    /// Reads the footer of the Parquet file at `path` with ranged requests.
    ///
    /// The first request fetches the last few kilobytes; a second one is made
    /// only when the metadata does not fit in them.
    pub fn read_footer(&self, path: &str) -> Result<ParquetMetaData> {
        block_on(async {
            let location = self.location(path)?;
            let size = self.store.head(&location).await?.size;
            let fetched = size.min(FOOTER_READ_HINT);
            let mut tail = self.store.get_range(&location, size - fetched..size).await?;
            let needed = metadata_len(path, &tail)? + FOOTER_TAIL_LEN;
            if needed > size {
                return Err(ParquetError::EOF(format!(
                    "'{path}' declares {needed} footer bytes but holds {size}"
                ))
                .into());
            }
            if needed > fetched {
                tail = self.store.get_range(&location, size - needed..size).await?;
            }
            let start = tail.len() - needed as usize;
            let end = tail.len() - FOOTER_TAIL_LEN as usize;
            tracing::trace!(path, size, footer = needed, "read footer");
            Ok(ParquetMetaDataReader::decode_metadata(&tail[start..end])?)
        })
    }

    /// Creates or replaces the file at `path`.
    pub fn write(&self, path: &str, data: Bytes) -> Result<()> {
        let location = self.location(path)?;
        block_on(self.store.put(&location, PutPayload::from(data)))?;
        let parent = location.as_ref().rsplit_once('/').map_or("", |(parent, _)| parent);
        self.forget_listings(parent);
        Ok(())
    }

    /// Deletes every file below `path`.
    pub fn remove_dir_all(&self, path: &str) -> Result<()> {
        let location = self.location(path)?;
        block_on(async {
            let objects: Vec<ObjectMeta> = self.store.list(Some(&location)).try_collect().await?;
            for object in objects {
                self.store.delete(&object.location).await?;
            }
            Ok::<_, Error>(())
        })?;
        self.forget_listings(location.as_ref());
        Ok(())
    }

    fn forget_listings(&self, dir: &str) {
        let mut listings = self.listings.lock().unwrap_or_else(|e| e.into_inner());
        listings.retain(|cached, _| !(cached == dir || cached.starts_with(&format!("{dir}/"))));
    }

    /// Store key of a user path: protocol stripped, local paths made absolute.
    fn key(&self, path: &str) -> Result<String> {
        let stripped = path
            .strip_prefix(self.protocol.as_str())
            .and_then(|rest| rest.strip_prefix("://"))
            .unwrap_or(path);
        let key = if self.is_local() {
            std::path::absolute(stripped)?.to_string_lossy().into_owned()
        } else {
            stripped.to_string()
        };
        Ok(key.trim_matches('/').to_string())
    }

    fn location(&self, path: &str) -> Result<Path> {
        Ok(Path::parse(self.key(path)?)?)
    }

    /// Inverse of [`Storage::location`].
    fn user_path(&self, location: &str) -> String {
        if self.is_local() {
            format!("/{location}")
        } else {
            format!("{}://{location}", self.protocol)
        }
    }
}

pub fn has_glob_magic(path: &str) -> bool {
    path.contains(['*', '?', '['])
}

pub(crate) fn join(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

/// Final path component.
pub(crate) fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Length of the footer metadata declared by the last eight bytes of a file.
fn metadata_len(path: &str, tail: &[u8]) -> Result<u64> {
    let Some(footer) = tail.len().checked_sub(FOOTER_TAIL_LEN as usize).map(|at| &tail[at..]) else {
        return Err(ParquetError::EOF(format!("'{path}' is too short to be a Parquet file")).into());
    };
    if &footer[4..] != PARQUET_MAGIC {
        return Err(ParquetError::General(format!("'{path}' does not end in the Parquet magic")).into());
    }
    let len = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    Ok(u64::from(len))
}
