//! Directory-of-JSON entity store.
//!
//! Each entity is one pretty-printed JSON file named after its id, with `:`
//! replaced by `_` (`phash:v1:abcd` → `phash_v1_abcd.json`). Any other byte
//! outside `[A-Za-z0-9-]`, `_` included, is written as `%XX`, so distinct ids
//! never share a file. Loading skips anything that is not a `.json` file and
//! logs records it cannot parse.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::model::{Entity, EntityId};
use crate::Result;
use super::{EntityStore, StoreCapabilities};

pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    /// Open (and create if missing) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that holds the record for `id`.
    pub fn path_for(&self, id: &EntityId) -> PathBuf {
        let mut stem = String::with_capacity(id.as_str().len());
        for byte in id.as_str().bytes() {
            match byte {
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' => stem.push(char::from(byte)),
                b':' => stem.push('_'),
                _ => stem.push_str(&format!("%{byte:02X}")),
            }
        }
        self.dir.join(format!("{stem}.json"))
    }
}

#[async_trait]
impl EntityStore for JsonDirStore {
    async fn save(&self, entity: &Entity) -> Result<()> {
        let json = serde_json::to_vec_pretty(entity)?;
        // Records are replaced via rename, never written in place.
        let path = self.path_for(&entity.id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Entity>> {
        let mut entities = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = std::fs::read(&path)
                .map_err(crate::Error::from)
                .and_then(|bytes| serde_json::from_slice::<Entity>(&bytes).map_err(crate::Error::from));
            match parsed {
                Ok(entity) => entities.push(entity),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable entity record"),
            }
        }
        tracing::debug!(dir = %self.dir.display(), count = entities.len(), "loaded entity records");
        Ok(entities)
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            durable: true,
            location: Some(self.dir.display().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityMetadata, Relation};
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use smallvec::smallvec;

    fn entity(id: &str) -> Entity {
        Entity::new(
            EntityId::from(id),
            EntityMetadata::named(id).with_description("round trip"),
            smallvec![0.1, 0.7320508075688772, 1.0 / 3.0, 0.0, 0.999_999_999],
            Utc::now(),
        )
        .with_summary("Cmaj7")
        .with_relation(Relation::new("witnessed", EntityId::from("phash:v1:other"), 0.875))
    }

    #[tokio::test]
    async fn test_round_trip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::open(dir.path()).unwrap();
        let original = entity("phash:v1:0123456789abcdef");
        store.save(&original).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded, vec![original]);
    }

    #[tokio::test]
    async fn test_file_name_from_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::open(dir.path()).unwrap();
        let path = store.path_for(&EntityId::from("phash:v1:abcd"));
        assert_eq!(path.file_name().unwrap(), "phash_v1_abcd.json");
    }

    #[tokio::test]
    async fn test_distinct_ids_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::open(dir.path()).unwrap();
        let colon = store.path_for(&EntityId::from("a:b"));
        let underscore = store.path_for(&EntityId::from("a_b"));
        assert_ne!(colon, underscore);
        assert_eq!(underscore.file_name().unwrap(), "a%5Fb.json");
        assert_eq!(store.path_for(&EntityId::from("../x")).file_name().unwrap(), "%2E%2E%2Fx.json");

        store.save(&entity("a:b")).await.unwrap();
        store.save(&entity("a_b")).await.unwrap();
        assert_eq!(store.load_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_skips_garbage_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::open(dir.path()).unwrap();
        store.save(&entity("phash:v1:good")).await.unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ nope").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id.as_str(), "phash:v1:good");
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::open(dir.path()).unwrap();
        let mut e = entity("phash:v1:x");
        store.save(&e).await.unwrap();
        e.occurrences = 3;
        store.save(&e).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].occurrences, 3);
    }
}
