use anyhow::{Context, Result};
use mongodb::options::ClientOptions;
use mongodb::{
    Client, Collection, Database as MongoDatabase,
    bson::{doc, oid::ObjectId, to_document},
};
use once_cell::sync::OnceCell;
use serde::{Serialize, de::DeserializeOwned};

use crate::config::CONFIG;
use crate::data_models::{CrawlJob, Document, FeedCheckSummary};

/// Global database instance
static DB: OnceCell<Database> = OnceCell::new();

/// Collection names as constants for consistency
pub mod collections {
    pub const DOCUMENTS: &str = "documents";
    pub const FEED_CHECKS: &str = "feed_checks";
    pub const JOBS: &str = "jobs";
}

/// Connection wrapper providing typed collection access. Everything here is
/// optional at runtime: when `MONGO_URI` is unset the system runs without
/// persistence and none of this is constructed.
#[derive(Debug, Clone)]
pub struct Database {
    db: MongoDatabase,
}

impl Database {
    /// Connect with an explicit URI and database name.
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        let client_options = ClientOptions::parse(uri)
            .await
            .context("Failed to parse MongoDB connection string")?;

        let client =
            Client::with_options(client_options).context("Failed to create MongoDB client")?;

        // Ping the database to verify connection
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .context("Failed to connect to MongoDB")?;

        log::info!("Connected to MongoDB database: {}", db_name);

        Ok(Self {
            db: client.database(db_name),
        })
    }

    /// Connect using environment configuration. Errors when `MONGO_URI` is
    /// not set; callers that tolerate running without Mongo check first.
    pub async fn from_config() -> Result<Self> {
        let uri = CONFIG
            .mongo_uri
            .as_deref()
            .context("MONGO_URI is not set")?;
        Self::new(uri, &CONFIG.mongo_db_name).await
    }

    /// Initialize the global database instance.
    /// Call this once at application startup.
    pub async fn init_global() -> Result<&'static Database> {
        let db = Self::from_config().await?;
        DB.set(db)
            .map_err(|_| anyhow::anyhow!("Database already initialized"))?;
        Ok(DB.get().unwrap())
    }

    /// Get a typed collection by name
    pub fn collection<T>(&self, name: &str) -> Collection<T>
    where
        T: Send + Sync,
    {
        self.db.collection(name)
    }

    // =========================================================================
    // Collection accessors
    // =========================================================================

    pub fn documents(&self) -> Collection<Document> {
        self.collection(collections::DOCUMENTS)
    }

    pub fn feed_checks(&self) -> Collection<FeedCheckSummary> {
        self.collection(collections::FEED_CHECKS)
    }

    pub fn jobs(&self) -> Collection<CrawlJob> {
        self.collection(collections::JOBS)
    }
}

// =============================================================================
// Generic CRUD operations
// =============================================================================

/// Thin typed wrapper over a collection for the operations every repo here
/// shares.
pub struct Repository<T>
where
    T: Send + Sync,
{
    collection: Collection<T>,
}

impl<T> Repository<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    pub fn new(collection: Collection<T>) -> Self {
        Self { collection }
    }

    /// Insert a single document
    pub async fn insert(&self, doc: &T) -> Result<ObjectId> {
        let result = self
            .collection
            .insert_one(doc)
            .await
            .context("Failed to insert document")?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| anyhow::anyhow!("Failed to get inserted ObjectId"))
    }

    /// Find a single document matching a filter
    pub async fn find_one(&self, filter: mongodb::bson::Document) -> Result<Option<T>> {
        self.collection
            .find_one(filter)
            .await
            .context("Failed to find document")
    }

    /// Count documents matching a filter
    pub async fn count(&self, filter: mongodb::bson::Document) -> Result<u64> {
        self.collection
            .count_documents(filter)
            .await
            .context("Failed to count documents")
    }
}

// =============================================================================
// Crawled document operations
// =============================================================================

pub struct DocumentRepo {
    repo: Repository<Document>,
}

impl DocumentRepo {
    pub fn new(db: &Database) -> Self {
        Self {
            repo: Repository::new(db.documents()),
        }
    }

    pub async fn insert(&self, document: &Document) -> Result<ObjectId> {
        self.repo.insert(document).await
    }

    /// Insert or replace by URL, so a re-crawl updates the stored row in
    /// place instead of accumulating duplicates.
    pub async fn upsert(&self, document: &Document) -> Result<ObjectId> {
        let mut serialized = to_document(document)?;
        // _id is immutable in MongoDB, keep it out of the update
        serialized.remove("_id");

        if let Ok(Some(existing)) = self.find_by_url(&document.url).await {
            self.repo
                .collection
                .update_one(doc! { "url": &document.url }, doc! { "$set": serialized })
                .await
                .context("Failed to upsert document")?;
            Ok(existing.id)
        } else {
            self.insert(document).await
        }
    }

    pub async fn find_by_url(&self, url: &str) -> Result<Option<Document>> {
        self.repo.find_one(doc! { "url": url }).await
    }

    /// Total stored documents
    pub async fn count(&self) -> Result<u64> {
        self.repo.count(doc! {}).await
    }
}

// =============================================================================
// Feed check history
// =============================================================================

pub struct FeedCheckRepo {
    repo: Repository<FeedCheckSummary>,
}

impl FeedCheckRepo {
    pub fn new(db: &Database) -> Self {
        Self {
            repo: Repository::new(db.feed_checks()),
        }
    }

    pub async fn insert(&self, summary: &FeedCheckSummary) -> Result<ObjectId> {
        self.repo.insert(summary).await
    }

    /// Most recent stored check for a feed, if any.
    pub async fn latest_for_feed(&self, feed_url: &str) -> Result<Option<FeedCheckSummary>> {
        self.repo
            .collection
            .find_one(doc! { "feed_url": feed_url })
            .sort(doc! { "checked_at": -1 })
            .await
            .context("Failed to find latest feed check")
    }
}
