//! File-backed content stores for page imagery and portfolio arrays.
//!
//! Both stores are whole-file read-modify-write with last-write-wins
//! semantics and no locking. The product assumes a single admin writer;
//! concurrent admin sessions can lose an update. That limitation is
//! deliberate and documented rather than papered over.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::{ImageConfig, ImageRef};

#[derive(Debug, Error)]
pub enum ContentStoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt store: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Durable mapping from (section, image_id) to the active remote image.
#[async_trait]
pub trait ImageConfigStore: Send + Sync {
    /// Sub-mapping for one section. A missing backing file or unknown
    /// section reads as empty; not-found is not an error.
    async fn section(&self, section: &str) -> Result<HashMap<String, ImageRef>, ContentStoreError>;
    async fn put(&self, section: &str, image_id: &str, image: ImageRef) -> Result<(), ContentStoreError>;
    /// Removes one entry; removing an absent entry is a no-op.
    async fn remove(&self, section: &str, image_id: &str) -> Result<(), ContentStoreError>;
    async fn snapshot(&self) -> Result<ImageConfig, ContentStoreError>;
    /// Replace the entire mapping (the sync endpoint's write path).
    async fn replace(&self, config: ImageConfig) -> Result<(), ContentStoreError>;
}

pub struct JsonFileConfigStore {
    path: PathBuf,
}

impl JsonFileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_env() -> Self {
        let path = std::env::var("IMAGE_CONFIG_PATH")
            .unwrap_or_else(|_| "data/image-config.json".into());
        Self::new(path)
    }

    fn load(&self) -> Result<ImageConfig, ContentStoreError> {
        read_json_or_default(&self.path)
    }

    fn save(&self, config: &ImageConfig) -> Result<(), ContentStoreError> {
        write_json(&self.path, config)
    }
}

#[async_trait]
impl ImageConfigStore for JsonFileConfigStore {
    async fn section(&self, section: &str) -> Result<HashMap<String, ImageRef>, ContentStoreError> {
        Ok(self.load()?.remove(section).unwrap_or_default())
    }
    async fn put(&self, section: &str, image_id: &str, image: ImageRef) -> Result<(), ContentStoreError> {
        let mut config = self.load()?;
        config
            .entry(section.to_string())
            .or_default()
            .insert(image_id.to_string(), image);
        self.save(&config)
    }
    async fn remove(&self, section: &str, image_id: &str) -> Result<(), ContentStoreError> {
        let mut config = self.load()?;
        if let Some(entries) = config.get_mut(section) {
            entries.remove(image_id);
            if entries.is_empty() {
                config.remove(section);
            }
            self.save(&config)?;
        }
        Ok(())
    }
    async fn snapshot(&self) -> Result<ImageConfig, ContentStoreError> {
        self.load()
    }
    async fn replace(&self, config: ImageConfig) -> Result<(), ContentStoreError> {
        self.save(&config)
    }
}

/// Flat array persisted to its own JSON file and fully rewritten on save.
/// Backs the gallery and projects portfolio content.
pub struct JsonArrayStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned + Send + Sync> JsonArrayStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), _marker: PhantomData }
    }

    pub fn list(&self) -> Result<Vec<T>, ContentStoreError> {
        read_json_or_default(&self.path)
    }

    pub fn replace(&self, items: &[T]) -> Result<(), ContentStoreError> {
        write_json(&self.path, &items)
    }
}

fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, ContentStoreError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ContentStoreError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> JsonFileConfigStore {
        JsonFileConfigStore::new(dir.path().join("image-config.json"))
    }

    #[tokio::test]
    async fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.section("home").await.unwrap().is_empty());
        assert!(store.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn put_roundtrip_and_second_id_preserves_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let hero = ImageRef { url: "https://cdn/hero.jpg".into(), public_id: "ambient-frames/home/hero_1".into() };
        store.put("home", "hero_1", hero.clone()).await.unwrap();
        let banner = ImageRef { url: "https://cdn/banner.jpg".into(), public_id: "ambient-frames/home/banner_2".into() };
        store.put("home", "banner_1", banner.clone()).await.unwrap();

        let home = store.section("home").await.unwrap();
        assert_eq!(home.get("hero_1"), Some(&hero));
        assert_eq!(home.get("banner_1"), Some(&banner));
    }

    #[tokio::test]
    async fn put_overwrites_existing_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let v1 = ImageRef { url: "u1".into(), public_id: "p1".into() };
        let v2 = ImageRef { url: "u2".into(), public_id: "p2".into() };
        store.put("about", "portrait", v1).await.unwrap();
        store.put("about", "portrait", v2.clone()).await.unwrap();
        let about = store.section("about").await.unwrap();
        assert_eq!(about.len(), 1);
        assert_eq!(about.get("portrait"), Some(&v2));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .put("gallery", "g1", ImageRef { url: "u".into(), public_id: "p".into() })
            .await
            .unwrap();
        store.remove("gallery", "g1").await.unwrap();
        store.remove("gallery", "g1").await.unwrap();
        store.remove("never-existed", "x").await.unwrap();
        assert!(store.section("gallery").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn array_store_rewrites_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let store: JsonArrayStore<crate::models::GalleryImage> =
            JsonArrayStore::new(dir.path().join("gallery.json"));
        assert!(store.list().unwrap().is_empty());
        let items = vec![crate::models::GalleryImage {
            id: "g1".into(),
            title: "Dunes".into(),
            description: None,
            category: "landscape".into(),
            url: "https://cdn/dunes.jpg".into(),
            public_id: "ambient-frames/gallery/dunes_1".into(),
        }];
        store.replace(&items).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
        store.replace(&[]).unwrap();
        assert!(store.list().unwrap().is_empty());
    }
}
