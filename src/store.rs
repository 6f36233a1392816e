use std::{
    collections::HashMap,
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

use tracing::debug;

use crate::{
    error::{StoreError, StoreResult},
    schemas::Entity,
};

/// Synchronous keyed storage for one entity type.
pub trait Store<T: Entity> {
    fn find(&self, id: &str) -> Option<T>;
    fn find_all(&self) -> Vec<T>;
    fn insert(&mut self, entity: T) -> StoreResult<()>;
    fn update(&mut self, entity: T) -> StoreResult<()>;
    fn delete(&mut self, id: &str) -> StoreResult<()>;
}

#[derive(Debug)]
pub struct MemoryStore<T> {
    entries: HashMap<String, T>,
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T: Entity> MemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: Entity> Store<T> for MemoryStore<T> {
    fn find(&self, id: &str) -> Option<T> {
        self.entries.get(id).cloned()
    }

    fn find_all(&self) -> Vec<T> {
        self.entries.values().cloned().collect()
    }

    fn insert(&mut self, entity: T) -> StoreResult<()> {
        if self.entries.contains_key(entity.id()) {
            return Err(StoreError::AlreadyExists {
                id: entity.id().to_owned(),
            });
        }
        self.entries.insert(entity.id().to_owned(), entity);
        Ok(())
    }

    fn update(&mut self, entity: T) -> StoreResult<()> {
        match self.entries.get_mut(entity.id()) {
            Some(slot) => {
                *slot = entity;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                id: entity.id().to_owned(),
            }),
        }
    }

    fn delete(&mut self, id: &str) -> StoreResult<()> {
        self.entries
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound { id: id.to_owned() })
    }
}

/// One JSON document per entity inside `dir`, mirrored in memory.
///
/// Every entity in the directory is read when the store is opened; writes go
/// to disk first and only then to the in-memory copy.
#[derive(Debug)]
pub struct FileStore<T> {
    dir: PathBuf,
    cache: MemoryStore<T>,
}

impl<T: Entity> FileStore<T> {
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut cache = MemoryStore::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let entity: T = serde_json::from_str(&fs::read_to_string(&path)?)?;
            cache.insert(entity)?;
        }
        debug!(dir = %dir.display(), count = cache.entries.len(), "loaded file store");

        Ok(Self { dir, cache })
    }

    // Ids are user-chosen, so they are hex-encoded to keep them out of
    // path syntax.
    fn path_of(&self, id: &str) -> PathBuf {
        let name: String = id.bytes().map(|b| format!("{b:02x}")).collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl<T: Entity> Store<T> for FileStore<T> {
    fn find(&self, id: &str) -> Option<T> {
        self.cache.find(id)
    }

    fn find_all(&self) -> Vec<T> {
        self.cache.find_all()
    }

    fn insert(&mut self, entity: T) -> StoreResult<()> {
        let path = self.path_of(entity.id());
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::AlreadyExists => StoreError::AlreadyExists {
                    id: entity.id().to_owned(),
                },
                _ => err.into(),
            })?;
        file.write_all(serde_json::to_string(&entity)?.as_bytes())?;
        self.cache.insert(entity)
    }

    fn update(&mut self, entity: T) -> StoreResult<()> {
        let path = self.path_of(entity.id());
        if !path.exists() {
            return Err(StoreError::NotFound {
                id: entity.id().to_owned(),
            });
        }
        fs::write(&path, serde_json::to_string(&entity)?)?;
        self.cache.update(entity)
    }

    fn delete(&mut self, id: &str) -> StoreResult<()> {
        fs::remove_file(self.path_of(id)).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound { id: id.to_owned() },
            _ => err.into(),
        })?;
        self.cache.delete(id)
    }
}
