use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{
    Client, Collection, Database,
    bson::{DateTime, doc},
    options::IndexOptions,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
};
use crate::{
    dao::{
        document_store::{DocumentName, DocumentStore, EventDocument},
        storage::StorageResult,
    },
    state::match_state::MatchKey,
};

const COLLECTION_NAME: &str = "documents";

/// One stored document. `event_id` is indexed so a whole event can be inspected at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MongoDocument {
    #[serde(rename = "_id")]
    id: String,
    event_id: String,
    updated_at: DateTime,
    body: Value,
}

#[derive(Clone)]
pub struct MongoDocumentStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

fn match_doc_id(key: &MatchKey, name: DocumentName) -> String {
    format!("{}:court_{}:{}", key.event_id, key.court_id, name)
}

fn event_doc_id(event_id: &str, document: EventDocument) -> String {
    format!("{event_id}:{document}")
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoDocumentStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let store = Self {
            inner: Arc::new(MongoInner {
                state: RwLock::new(MongoState { client, database }),
                config,
            }),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"event_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("document_event_idx".to_owned()))
                    .build(),
            )
            .build();

        self.collection()
            .await
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: COLLECTION_NAME,
                index: "event_id",
                source,
            })?;
        Ok(())
    }

    async fn collection(&self) -> Collection<MongoDocument> {
        let guard = self.inner.state.read().await;
        guard.database.collection::<MongoDocument>(COLLECTION_NAME)
    }

    async fn find(&self, id: String) -> MongoResult<Option<Value>> {
        let document = self
            .collection()
            .await
            .find_one(doc! {"_id": id.as_str()})
            .await
            .map_err(|source| MongoDaoError::LoadDocument { id, source })?;
        Ok(document.map(|doc| doc.body))
    }

    async fn replace(&self, id: String, event_id: String, body: Value) -> MongoResult<()> {
        let document = MongoDocument {
            id: id.clone(),
            event_id,
            updated_at: DateTime::now(),
            body,
        };
        self.collection()
            .await
            .replace_one(doc! {"_id": id.as_str()}, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveDocument { id, source })?;
        Ok(())
    }
}

impl DocumentStore for MongoDocumentStore {
    fn load(
        &self,
        key: &MatchKey,
        name: DocumentName,
    ) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let store = self.clone();
        let id = match_doc_id(key, name);
        Box::pin(async move { store.find(id).await.map_err(Into::into) })
    }

    fn save(
        &self,
        key: &MatchKey,
        name: DocumentName,
        document: Value,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let id = match_doc_id(key, name);
        let event_id = key.event_id.clone();
        Box::pin(async move {
            store
                .replace(id, event_id, document)
                .await
                .map_err(Into::into)
        })
    }

    fn load_event_document(
        &self,
        event_id: &str,
        document: EventDocument,
    ) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let store = self.clone();
        let id = event_doc_id(event_id, document);
        Box::pin(async move { store.find(id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
