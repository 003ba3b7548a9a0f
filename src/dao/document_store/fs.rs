//! File-system document store: one JSON file per document under a root directory.
//!
//! ```text
//! {root}/{event_id}/init.json
//! {root}/{event_id}/classifications.json
//! {root}/{event_id}/court_{court_id}/settings.json
//! {root}/{event_id}/court_{court_id}/game.json
//! ```

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use tokio::fs;

use crate::{
    dao::{
        document_store::{DocumentName, DocumentStore, EventDocument, format::to_document_string},
        storage::{StorageError, StorageResult},
    },
    state::match_state::MatchKey,
};

/// Failures raised by [`FsDocumentStore`].
#[derive(Debug, Error)]
pub enum FsStoreError {
    #[error("path segment `{segment}` is not a plain file name")]
    InvalidSegment { segment: String },
    #[error("storage root `{path}` is not a directory")]
    NotADirectory { path: PathBuf },
    #[error("failed to create directory `{path}`")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read `{path}`")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write `{path}`")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode document for `{path}`")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl From<FsStoreError> for StorageError {
    fn from(err: FsStoreError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}

/// Document store writing JSON files below a root directory.
#[derive(Clone)]
pub struct FsDocumentStore {
    root: Arc<Path>,
}

impl FsDocumentStore {
    /// Open the store, creating the root directory when missing.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, FsStoreError> {
        let root: PathBuf = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|source| FsStoreError::CreateDir {
                path: root.clone(),
                source,
            })?;
        Ok(Self {
            root: Arc::from(root),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn match_path(&self, key: &MatchKey, name: DocumentName) -> Result<PathBuf, FsStoreError> {
        Ok(self
            .root
            .join(segment(&key.event_id)?)
            .join(format!("court_{}", segment(&key.court_id)?))
            .join(format!("{name}.json")))
    }

    fn event_path(&self, event_id: &str, document: EventDocument) -> Result<PathBuf, FsStoreError> {
        Ok(self
            .root
            .join(segment(event_id)?)
            .join(format!("{document}.json")))
    }

    async fn read(path: PathBuf) -> StorageResult<Option<Value>> {
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(FsStoreError::Read { path, source }.into()),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| StorageError::Malformed {
                document: path.display().to_string(),
                source,
            })
    }

    /// Write through a sibling temporary file so readers never see a partial document.
    async fn write(path: PathBuf, contents: String) -> Result<(), FsStoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| FsStoreError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, contents)
            .await
            .map_err(|source| FsStoreError::Write {
                path: staging.clone(),
                source,
            })?;
        fs::rename(&staging, &path)
            .await
            .map_err(|source| FsStoreError::Write { path, source })
    }
}

fn segment(value: &str) -> Result<&str, FsStoreError> {
    let plain = !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\', '\0']);
    if plain {
        Ok(value)
    } else {
        Err(FsStoreError::InvalidSegment {
            segment: value.to_owned(),
        })
    }
}

impl DocumentStore for FsDocumentStore {
    fn load(
        &self,
        key: &MatchKey,
        name: DocumentName,
    ) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let path = self.match_path(key, name);
        Box::pin(async move { Self::read(path?).await })
    }

    fn save(
        &self,
        key: &MatchKey,
        name: DocumentName,
        document: Value,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let path = self.match_path(key, name);
        Box::pin(async move {
            let path = path?;
            let encoded = match name {
                DocumentName::Game => to_document_string(&document),
                DocumentName::Settings => serde_json::to_string_pretty(&document),
            };
            let contents = encoded.map_err(|source| FsStoreError::Encode {
                path: path.clone(),
                source,
            })?;
            Self::write(path, contents).await.map_err(Into::into)
        })
    }

    fn load_event_document(
        &self,
        event_id: &str,
        document: EventDocument,
    ) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let path = self.event_path(event_id, document);
        Box::pin(async move { Self::read(path?).await })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let root = self.root.to_path_buf();
        Box::pin(async move {
            let metadata = fs::metadata(&root)
                .await
                .map_err(|source| FsStoreError::Read {
                    path: root.clone(),
                    source,
                })?;
            if metadata.is_dir() {
                Ok(())
            } else {
                Err(FsStoreError::NotADirectory { path: root }.into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let root = self.root.to_path_buf();
        Box::pin(async move {
            fs::create_dir_all(&root)
                .await
                .map_err(|source| FsStoreError::CreateDir { path: root, source }.into())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scratch_root(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("courtboard-fs-{name}-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn missing_documents_load_as_none() {
        let store = FsDocumentStore::open(scratch_root("missing")).await.unwrap();
        let key = MatchKey::new("cup", "1");

        assert!(store.load(&key, DocumentName::Game).await.unwrap().is_none());
        assert!(
            store
                .load_event_document("cup", EventDocument::Init)
                .await
                .unwrap()
                .is_none()
        );
        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn saved_game_document_is_laid_out_per_court() {
        let store = FsDocumentStore::open(scratch_root("save")).await.unwrap();
        let key = MatchKey::new("cup", "4");
        let document = json!({"version": 3, "progress": {"shotLog": {"1": ["red", "blue"]}}});

        store
            .save(&key, DocumentName::Game, document.clone())
            .await
            .unwrap();

        let path = store.root().join("cup").join("court_4").join("game.json");
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("[\"red\", \"blue\"]"));
        assert_eq!(
            store.load(&key, DocumentName::Game).await.unwrap(),
            Some(document)
        );
        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn unparsable_document_is_reported_as_malformed() {
        let store = FsDocumentStore::open(scratch_root("corrupt")).await.unwrap();
        let dir = store.root().join("cup").join("court_2");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("settings.json"), "{\"version\": ").unwrap();

        let err = store
            .load(&MatchKey::new("cup", "2"), DocumentName::Settings)
            .await
            .unwrap_err();
        assert!(err.is_malformed());
        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn traversal_segments_are_rejected() {
        let store = FsDocumentStore::open(scratch_root("segments")).await.unwrap();
        let result = store
            .load(&MatchKey::new("..", "1"), DocumentName::Game)
            .await;
        assert!(matches!(result, Err(StorageError::Unavailable { .. })));
        let _ = std::fs::remove_dir_all(store.root());
    }
}
