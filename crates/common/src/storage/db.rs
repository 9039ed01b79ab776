use crate::error::AppError;

use super::types::StoredObject;
use std::{
    ops::Deref,
    sync::atomic::{AtomicBool, Ordering},
};
use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Surreal,
};
use tracing::debug;

/// Store adapter over SurrealDB.
///
/// A client is either *owned* (constructed here from an address) or
/// *borrowed* (wrapped around a handle the host application manages).
/// Only the owned variant implements teardown: `close` on a borrowed
/// client is a no-op so the host keeps full control of its handle.
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
    owns_connection: bool,
    closed: AtomicBool,
}

impl SurrealDbClient {
    /// Connects to the given address and takes ownership of the resulting
    /// handle. Credentials are optional; namespace and database are always
    /// selected.
    pub async fn connect(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;

        if !username.is_empty() {
            db.signin(Root { username, password }).await?;
        }

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient {
            client: db,
            owns_connection: true,
            closed: AtomicBool::new(false),
        })
    }

    /// Wraps an externally supplied client without taking ownership.
    pub fn from_client(client: Surreal<Any>) -> Self {
        SurrealDbClient {
            client,
            owns_connection: false,
            closed: AtomicBool::new(false),
        }
    }

    pub fn owns_connection(&self) -> bool {
        self.owns_connection
    }

    /// True once an owned handle has been released via [`close`](Self::close).
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Liveness check. A shared single client that reports it is already
    /// connected counts as healthy.
    pub async fn ensure_connected(&self) -> Result<(), AppError> {
        match self.client.health().await {
            Ok(()) => Ok(()),
            Err(Error::Api(surrealdb::error::Api::AlreadyConnected)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Releases the underlying handle when this client owns it. Idempotent:
    /// the handle is released at most once.
    pub async fn close(&self) -> Result<(), AppError> {
        if self.owns_connection && !self.closed.swap(true, Ordering::SeqCst) {
            debug!("releasing owned store connection");
            self.client.invalidate().await?;
        }
        Ok(())
    }

    /// Defines the lexical analyzer and every index the engine relies on.
    /// The vector indexes are parameterized on the embedding width so the
    /// store always matches the configured model.
    pub async fn ensure_initialized(&self, dimensions: usize) -> Result<(), Error> {
        self.client
            .query("DEFINE ANALYZER IF NOT EXISTS simple TOKENIZERS class FILTERS lowercase, ascii")
            .await?;

        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_document_path ON TABLE document FIELDS path")
            .await?;
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_document_screen ON TABLE document FIELDS screen")
            .await?;
        self.client
            .query(
                "DEFINE INDEX IF NOT EXISTS idx_document_content_search ON TABLE document \
                 FIELDS content SEARCH ANALYZER simple BM25 HIGHLIGHTS",
            )
            .await?;
        self.client
            .query(format!(
                "DEFINE INDEX OVERWRITE idx_document_embedding ON TABLE document \
                 FIELDS embedding HNSW DIMENSION {dimensions} DIST EUCLIDEAN"
            ))
            .await?;

        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_node_name ON TABLE node FIELDS name")
            .await?;
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_node_type ON TABLE node FIELDS node_type")
            .await?;
        self.client
            .query(format!(
                "DEFINE INDEX OVERWRITE idx_node_embedding ON TABLE node \
                 FIELDS embedding HNSW DIMENSION {dimensions} DIST EUCLIDEAN"
            ))
            .await?;

        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_edge_source ON TABLE edge FIELDS source_id")
            .await?;
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_edge_target ON TABLE edge FIELDS target_id")
            .await?;
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_edge_relation ON TABLE edge FIELDS relation_type")
            .await?;

        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_cache_hash ON TABLE cache FIELDS request_hash UNIQUE")
            .await?;

        Ok(())
    }

    pub async fn rebuild_indexes(&self) -> Result<(), Error> {
        self.client
            .query("REBUILD INDEX IF EXISTS idx_document_embedding ON document")
            .await?;
        self.client
            .query("REBUILD INDEX IF EXISTS idx_document_content_search ON document")
            .await?;
        self.client
            .query("REBUILD INDEX IF EXISTS idx_node_embedding ON node")
            .await?;
        Ok(())
    }

    /// Operation to store a object in SurrealDB, requires the struct to implement StoredObject
    ///
    /// # Arguments
    /// * `item` - The item to be stored
    ///
    /// # Returns
    /// * `Result` - Item or Error
    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    /// Operation to retrieve a single object by its ID, requires the struct to implement StoredObject
    ///
    /// # Arguments
    /// * `id` - The ID of the item to retrieve
    ///
    /// # Returns
    /// * `Result<Option<T>, Error>` - The found item or Error
    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    /// Operation to delete a single object by its ID, requires the struct to implement StoredObject
    ///
    /// # Arguments
    /// * `id` - The ID of the item to delete
    ///
    /// # Returns
    /// * `Result<Option<T>, Error>` - The deleted item or Error
    pub async fn delete_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.delete((T::table_name(), id)).await
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Create an in-memory SurrealDB client for testing.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient {
            client: db,
            owns_connection: true,
            closed: AtomicBool::new(false),
        })
    }
}
