//! JSON file settings store
//!
//! The file holds a map `agent_id -> SettingsRecord`. Writes go to a temp file
//! next to the target and are renamed over it.

use super::{SettingsRecord, SettingsStore, StoreError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

type SettingsFile = BTreeMap<String, SettingsRecord>;

pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles from concurrent saves
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<SettingsFile, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(SettingsFile::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SettingsFile::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, contents: &SettingsFile) -> Result<(), StoreError> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(parent).await?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "settings.json".to_string());
        let tmp_path = parent.join(format!(".{}.tmp.{}", file_name, std::process::id()));

        let bytes = serde_json::to_vec_pretty(contents)?;
        if let Err(e) = tokio::fs::write(&tmp_path, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for JsonFileStore {
    async fn load(&self, agent_id: &str) -> Result<Option<SettingsRecord>, StoreError> {
        let mut all = self.read_all().await?;
        Ok(all.remove(agent_id))
    }

    async fn save(&self, agent_id: &str, record: &SettingsRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut all = self.read_all().await?;
        all.insert(agent_id.to_string(), record.clone());
        self.write_all(&all).await?;
        debug!(agent_id = %agent_id, path = %self.path.display(), "Settings saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BehaviorSettings, ConnectionRecord};
    use tempfile::TempDir;

    fn sample_record(port: u16) -> SettingsRecord {
        SettingsRecord {
            connection: Some(ConnectionRecord {
                host: "localhost".to_string(),
                port,
                user_disconnected: false,
            }),
            behavior: BehaviorSettings::default(),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("settings.json"));

        assert!(store.load("afk-bot").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/settings.json"));

        store.save("afk-bot", &sample_record(25565)).await.unwrap();

        let loaded = store.load("afk-bot").await.unwrap();
        assert_eq!(loaded, Some(sample_record(25565)));
    }

    #[tokio::test]
    async fn test_records_are_keyed_by_agent() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("settings.json"));

        store.save("a", &sample_record(1)).await.unwrap();
        store.save("b", &sample_record(2)).await.unwrap();
        store.save("a", &sample_record(3)).await.unwrap();

        assert_eq!(store.load("a").await.unwrap(), Some(sample_record(3)));
        assert_eq!(store.load("b").await.unwrap(), Some(sample_record(2)));
    }

    #[tokio::test]
    async fn test_no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("settings.json"));

        store.save("afk-bot", &sample_record(25565)).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(entries, vec!["settings.json".to_string()]);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = JsonFileStore::new(&path);

        let result = store.load("afk-bot").await;

        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }
}
