//! MongoDB proposal mirror.
//!
//! One document per proposal, addressed by its `proposalId` string. The
//! server-assigned `_id` never leaves this module.

use async_trait::async_trait;
use errors::{MappingError, StoreKind, SyncError};
use mongodb::{
    Client, Collection, IndexModel,
    bson::{Bson, Document, doc},
    options::{ClientOptions, IndexOptions}
};
use proposal_core::{DocumentRecord, DocumentRepository, FieldMap, ProposalId, SyncOperation};

const ID_FIELD: &str = "proposalId";

pub struct MongoProposalRepository {
    client: Client,
    database: String,
    collection: String
}

fn unavailable(operation: &'static str) -> impl FnOnce(mongodb::error::Error) -> SyncError {
    move |e| SyncError::unavailable(StoreKind::Document, operation, e)
}

fn organization_filter(organization_id: Option<i64>) -> Document {
    match organization_id {
        Some(org) => doc! { "organization_id": org },
        None => Document::new()
    }
}

pub(crate) fn to_bson(fields: &FieldMap) -> Result<Document, SyncError> {
    mongodb::bson::to_document(fields)
        .map_err(|e| MappingError::new("document", e.to_string()).into())
}

/// Relaxed extended JSON keeps numbers and strings plain, which is the shape
/// the sync engine compares against.
pub(crate) fn from_bson(mut document: Document) -> DocumentRecord {
    document.remove("_id");
    let mut record = DocumentRecord::new();
    for (key, value) in document {
        record.insert(key, value.into_relaxed_extjson());
    }
    record
}

impl MongoProposalRepository {
    pub async fn new(
        connection_string: &str,
        database: &str,
        collection: &str
    ) -> Result<Self, SyncError> {
        let client_options = ClientOptions::parse(connection_string)
            .await
            .map_err(unavailable("connect"))?;
        let client = Client::with_options(client_options).map_err(unavailable("connect"))?;

        client
            .database(database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(unavailable("ping"))?;

        Ok(Self {
            client,
            database: database.to_string(),
            collection: collection.to_string()
        })
    }

    pub async fn connect(config: &config::MongodbConfig) -> Result<Self, SyncError> {
        let repository =
            Self::new(&config.connection_string, &config.database, &config.collection).await?;
        tracing::info!(
            database = %config.database,
            collection = %config.collection,
            "Connected to MongoDB"
        );
        Ok(repository)
    }

    fn collection(&self) -> Collection<Document> {
        self.client
            .database(&self.database)
            .collection(&self.collection)
    }

    /// Unique index on `proposalId`, so a racing insert cannot create a
    /// second mirror of the same proposal.
    pub async fn ensure_indexes(&self) -> Result<(), SyncError> {
        let index = IndexModel::builder()
            .keys(doc! { ID_FIELD: 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.collection()
            .create_index(index)
            .await
            .map_err(unavailable("ensure_indexes"))?;
        Ok(())
    }

    /// Test helper for seeding documents that bypass the sync engine.
    pub async fn insert_raw(&self, fields: &FieldMap) -> Result<(), SyncError> {
        self.collection()
            .insert_one(to_bson(fields)?)
            .await
            .map_err(unavailable("insert_raw"))?;
        Ok(())
    }
}

#[async_trait]
impl DocumentRepository for MongoProposalRepository {
    #[tracing::instrument(skip(self), fields(record_id = %id))]
    async fn get_by_id(&self, id: ProposalId) -> Result<Option<DocumentRecord>, SyncError> {
        let found = self
            .collection()
            .find_one(doc! { ID_FIELD: id.document_key() })
            .await
            .map_err(unavailable("get_by_id"))?;
        Ok(found.map(from_bson))
    }

    #[tracing::instrument(skip(self, document), fields(record_id = %id))]
    async fn upsert(
        &self,
        id: ProposalId,
        document: &DocumentRecord
    ) -> Result<SyncOperation, SyncError> {
        let mut replacement = to_bson(document.fields())?;
        replacement.remove("_id");
        replacement.insert(ID_FIELD, id.document_key());

        let result = self
            .collection()
            .replace_one(doc! { ID_FIELD: id.document_key() }, replacement)
            .upsert(true)
            .await
            .map_err(unavailable("upsert"))?;

        Ok(if result.matched_count > 0 {
            SyncOperation::Update
        } else {
            SyncOperation::Insert
        })
    }

    async fn list_ids(&self, organization_id: Option<i64>) -> Result<Vec<String>, SyncError> {
        let values = self
            .collection()
            .distinct(ID_FIELD, organization_filter(organization_id))
            .await
            .map_err(unavailable("list_ids"))?;

        Ok(values
            .into_iter()
            .map(|value| match value {
                Bson::String(s) => s,
                other => other.to_string()
            })
            .collect())
    }

    async fn count(&self, organization_id: Option<i64>) -> Result<u64, SyncError> {
        self.collection()
            .count_documents(organization_filter(organization_id))
            .await
            .map_err(unavailable("count"))
    }
}
