use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::Value;

use crate::{
    dao::{
        document_store::{DocumentName, DocumentStore, EventDocument},
        storage::{StorageError, StorageResult},
    },
    state::match_state::MatchKey,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
};

const ID_FIELD: &str = "_id";
const REV_FIELD: &str = "_rev";

/// Document store backed by one CouchDB database. Document ids are
/// `{event}:court_{court}:{name}` for match documents and `{event}:{name}` for
/// event documents.
#[derive(Clone)]
pub struct CouchDocumentStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

fn match_doc_id(key: &MatchKey, name: DocumentName) -> String {
    format!("{}:court_{}:{}", key.event_id, key.court_id, name)
}

fn event_doc_id(event_id: &str, document: EventDocument) -> String {
    format!("{event_id}:{document}")
}

impl CouchDocumentStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };
        store.ensure_database().await?;
        Ok(store)
    }

    fn with_auth(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.auth {
            Some((ref user, ref pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    fn request(&self, method: Method, doc_id: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.database_url(), doc_id);
        self.with_auth(self.client.request(method, url))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url();

        let response = self
            .with_auth(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .with_auth(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    /// Raw body of `doc_id`, `None` on 404.
    async fn fetch_text(&self, doc_id: &str) -> CouchResult<Option<String>> {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_owned(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response
                    .text()
                    .await
                    .map(Some)
                    .map_err(|source| CouchDaoError::DecodeResponse {
                        path: doc_id.to_owned(),
                        source,
                    })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_owned(),
                status: other,
            }),
        }
    }

    async fn get_document(&self, doc_id: &str) -> StorageResult<Option<Value>> {
        let Some(text) = self.fetch_text(doc_id).await? else {
            return Ok(None);
        };
        let mut value: Value =
            serde_json::from_str(&text).map_err(|source| StorageError::Malformed {
                document: doc_id.to_owned(),
                source,
            })?;
        if let Value::Object(ref mut map) = value {
            map.remove(ID_FIELD);
            map.remove(REV_FIELD);
        }
        Ok(Some(value))
    }

    async fn current_rev(&self, doc_id: &str) -> CouchResult<Option<String>> {
        let Some(text) = self.fetch_text(doc_id).await? else {
            return Ok(None);
        };
        // An unreadable previous revision is overwritten anyway.
        Ok(serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|value| value.get(REV_FIELD)?.as_str().map(str::to_owned)))
    }

    async fn put_document(&self, doc_id: &str, document: Value) -> CouchResult<()> {
        let Value::Object(mut body) = document else {
            return Err(CouchDaoError::NotAnObject {
                path: doc_id.to_owned(),
            });
        };
        if let Some(rev) = self.current_rev(doc_id).await? {
            body.insert(REV_FIELD.to_owned(), Value::String(rev));
        }

        let response = self
            .request(Method::PUT, doc_id)
            .json(&body)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_owned(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::RequestStatus {
                path: doc_id.to_owned(),
                status: response.status(),
            })
        }
    }
}

impl DocumentStore for CouchDocumentStore {
    fn load(
        &self,
        key: &MatchKey,
        name: DocumentName,
    ) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let store = self.clone();
        let doc_id = match_doc_id(key, name);
        Box::pin(async move { store.get_document(&doc_id).await })
    }

    fn save(
        &self,
        key: &MatchKey,
        name: DocumentName,
        document: Value,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let doc_id = match_doc_id(key, name);
        Box::pin(async move {
            store
                .put_document(&doc_id, document)
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
        let doc_id = event_doc_id(event_id, document);
        Box::pin(async move { store.get_document(&doc_id).await })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.database_url();
            let response = store
                .with_auth(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
