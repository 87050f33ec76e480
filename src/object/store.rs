//! content-addressed object storage

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use walkdir::WalkDir;

use crate::error::{Error, IoResultExt, Result};
use crate::id::ObjectId;
use crate::object::codec;
use crate::object::model::RevObject;

/// content-addressed key/value store for revision objects
///
/// `put` is idempotent: storing an already-present object is a no-op.
/// no ordering or transactional guarantees beyond per-call atomicity.
pub trait ObjectStore {
    fn exists(&self, id: &ObjectId) -> bool;
    fn get(&self, id: &ObjectId) -> Result<RevObject>;
    /// canonical serialized bytes, as sent over the wire
    fn get_raw(&self, id: &ObjectId) -> Result<Vec<u8>>;
    fn put(&self, object: &RevObject) -> Result<ObjectId>;
    /// ingest wire bytes under a declared id, verifying the id matches
    fn put_raw(&self, id: &ObjectId, payload: &[u8]) -> Result<()>;
    /// remove an object; removing an absent object is a no-op
    fn delete(&self, id: &ObjectId) -> Result<()>;
    fn list(&self) -> Result<Vec<ObjectId>>;
}

/// filesystem object store
///
/// objects live in a single directory sharded by the first two hex chars of
/// the id. payloads are the canonical type-tagged CBOR bytes, zstd
/// compressed; the content hash covers the uncompressed bytes so identity
/// is independent of compression level.
pub struct FileObjectStore {
    objects_dir: PathBuf,
    tmp_dir: PathBuf,
}

impl FileObjectStore {
    pub fn new(objects_dir: impl Into<PathBuf>, tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            objects_dir: objects_dir.into(),
            tmp_dir: tmp_dir.into(),
        }
    }

    /// filesystem path of an object
    pub fn object_path(&self, id: &ObjectId) -> PathBuf {
        let (dir, file) = id.to_path_components();
        self.objects_dir.join(dir).join(file)
    }

    fn read_verified(&self, id: &ObjectId) -> Result<Vec<u8>> {
        let path = self.object_path(id);
        let compressed = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ObjectNotFound(*id)
            } else {
                Error::Io {
                    path: path.clone(),
                    source: e,
                }
            }
        })?;

        let bytes = zstd::decode_all(&compressed[..]).map_err(|e| Error::Io {
            path: path.clone(),
            source: e,
        })?;

        if ObjectId::hash_of(&bytes) != *id {
            return Err(Error::CorruptObject(*id));
        }
        Ok(bytes)
    }

    fn write_payload(&self, id: &ObjectId, bytes: &[u8]) -> Result<()> {
        let path = self.object_path(id);
        if path.exists() {
            return Ok(());
        }

        let compressed = zstd::encode_all(bytes, 3).map_err(|e| Error::Io {
            path: PathBuf::from("<zstd>"),
            source: e,
        })?;

        let dir = path.parent().expect("sharded object path has a parent");
        fs::create_dir_all(dir).with_path(dir)?;

        // atomic write: temp -> fsync -> rename
        let tmp_path = self.tmp_dir.join(uuid::Uuid::new_v4().to_string());
        {
            let mut tmp_file = File::create(&tmp_path).with_path(&tmp_path)?;
            tmp_file.write_all(&compressed).with_path(&tmp_path)?;
            tmp_file.sync_all().with_path(&tmp_path)?;
        }
        fs::rename(&tmp_path, &path).with_path(&path)?;

        let dir_file = File::open(dir).with_path(dir)?;
        dir_file.sync_all().with_path(dir)?;

        Ok(())
    }
}

impl ObjectStore for FileObjectStore {
    fn exists(&self, id: &ObjectId) -> bool {
        self.object_path(id).exists()
    }

    fn get(&self, id: &ObjectId) -> Result<RevObject> {
        let bytes = self.read_verified(id)?;
        codec::from_canonical_bytes(&bytes)
    }

    fn get_raw(&self, id: &ObjectId) -> Result<Vec<u8>> {
        self.read_verified(id)
    }

    fn put(&self, object: &RevObject) -> Result<ObjectId> {
        let bytes = codec::canonical_bytes(object)?;
        let id = ObjectId::hash_of(&bytes);
        self.write_payload(&id, &bytes)?;
        Ok(id)
    }

    fn put_raw(&self, id: &ObjectId, payload: &[u8]) -> Result<()> {
        if ObjectId::hash_of(payload) != *id {
            return Err(Error::Format(format!(
                "payload does not hash to declared id {}",
                id
            )));
        }
        self.write_payload(id, payload)
    }

    fn delete(&self, id: &ObjectId) -> Result<()> {
        let path = self.object_path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io { path, source: e }),
        }
    }

    fn list(&self) -> Result<Vec<ObjectId>> {
        let mut ids = Vec::new();
        if !self.objects_dir.exists() {
            return Ok(ids);
        }

        for entry in WalkDir::new(&self.objects_dir).min_depth(2).max_depth(2) {
            let entry = entry.map_err(|e| Error::Io {
                path: self.objects_dir.clone(),
                source: e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "walkdir error")
                }),
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            let parent_name = path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .unwrap_or("");

            let hex = format!("{}{}", parent_name, file_name);
            if let Ok(id) = ObjectId::from_hex(&hex) {
                ids.push(id);
            }
        }

        Ok(ids)
    }
}
