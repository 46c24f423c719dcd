//! MongoDB implementation of the document backend

use bson::{doc, Bson, Document};
use futures_util::StreamExt;
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::{IndexOptions, ReturnDocument},
    Client, Collection, IndexModel,
};
use serde_json::Value;
use tracing::{error, info};

use crate::db::store::DocumentStore;
use crate::types::{Error, Result};

/// Document store backed by a MongoDB collection.
#[derive(Debug, Clone)]
pub struct MongoStore {
    collection: Collection<Document>,
}

impl MongoStore {
    /// Connect, ping, and ensure the unique login index.
    pub async fn connect(uri: &str, db_name: &str, collection_name: &str) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_uri = if uri.contains('?') {
            format!("{uri}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000")
        } else {
            format!("{uri}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000")
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| Error::Database(format!("Failed to connect to MongoDB: {e}")))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| Error::Database(format!("MongoDB ping failed: {e}")))?;

        info!("Connected to MongoDB database '{}'", db_name);

        let collection = client
            .database(db_name)
            .collection::<Document>(collection_name);
        let store = Self { collection };
        store.apply_indexes().await?;

        Ok(store)
    }

    /// Unique index on `login` — the authoritative uniqueness guard; the
    /// pre-create lookup in this layer is only an early rejection.
    async fn apply_indexes(&self) -> Result<()> {
        let index = IndexModel::builder()
            .keys(doc! { "login": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("login_unique".to_string())
                    .build(),
            )
            .build();

        self.collection
            .create_index(index)
            .await
            .map_err(|e| Error::Database(format!("Failed to create indexes: {e}")))?;

        Ok(())
    }
}

fn to_bson_document(value: &Value) -> Result<Document> {
    bson::to_document(value)
        .map_err(|e| Error::Validation(format!("payload is not a valid document: {e}")))
}

fn to_json(document: Document) -> Value {
    Bson::from(document).into_relaxed_extjson()
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref write_error)) => write_error.code == 11000,
        _ => false,
    }
}

#[async_trait::async_trait]
impl DocumentStore for MongoStore {
    async fn create(&self, doc: Value) -> Result<Value> {
        let document = to_bson_document(&doc)?;

        let result = self.collection.insert_one(document).await.map_err(|e| {
            if is_duplicate_key(&e) {
                Error::Conflict("login already taken".to_string())
            } else {
                Error::Database(format!("Insert failed: {e}"))
            }
        })?;

        let inserted = self
            .collection
            .find_one(doc! { "_id": result.inserted_id })
            .await
            .map_err(|e| Error::Database(format!("Find failed: {e}")))?;

        inserted
            .map(to_json)
            .ok_or_else(|| Error::Database("Inserted record not readable".to_string()))
    }

    async fn get(&self, login: &str) -> Result<Value> {
        self.collection
            .find_one(doc! { "login": login })
            .await
            .map_err(|e| Error::Database(format!("Find failed: {e}")))?
            .map(to_json)
            .ok_or(Error::NotFound)
    }

    async fn update(&self, login: &str, update: Value) -> Result<Value> {
        let document = to_bson_document(&update)?;

        // Operator documents go through update, flat documents replace the
        // record wholesale.
        let has_operators = document.keys().any(|key| key.starts_with('$'));
        let updated = if has_operators {
            self.collection
                .find_one_and_update(doc! { "login": login }, document)
                .return_document(ReturnDocument::After)
                .await
        } else {
            self.collection
                .find_one_and_replace(doc! { "login": login }, document)
                .return_document(ReturnDocument::After)
                .await
        };

        updated
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    Error::Conflict("login already taken".to_string())
                } else {
                    Error::Database(format!("Update failed: {e}"))
                }
            })?
            .map(to_json)
            .ok_or(Error::NotFound)
    }

    async fn delete(&self, login: &str) -> Result<Value> {
        self.collection
            .find_one_and_delete(doc! { "login": login })
            .await
            .map_err(|e| Error::Database(format!("Delete failed: {e}")))?
            .map(to_json)
            .ok_or(Error::NotFound)
    }

    async fn find(&self, filter: Value) -> Result<Vec<Value>> {
        let filter = to_bson_document(&filter)?;

        let mut cursor = self
            .collection
            .find(filter)
            .await
            .map_err(|e| Error::Database(format!("Find failed: {e}")))?;

        let mut records = Vec::new();
        while let Some(item) = cursor.next().await {
            match item {
                Ok(document) => records.push(to_json(document)),
                Err(e) => {
                    error!("Error reading document: {}", e);
                }
            }
        }

        if records.is_empty() {
            Err(Error::NotFound)
        } else {
            Ok(records)
        }
    }
}
