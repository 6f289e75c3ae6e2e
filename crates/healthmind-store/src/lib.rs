//! SQLite-backed persistence for the health assistant.
//!
//! Every repository follows the same shape: a cheap `Clone`-able struct
//! wrapping a [`db::Database`] handle, with one method per query or
//! mutation, all returning [`error::StoreResult`]. Connections are never
//! exposed past this crate — callers hold repositories, not connections.

pub mod active_streams;
pub mod chat;
pub mod db;
pub mod documents;
pub mod error;
pub mod ingestion_job;
pub mod labs;
pub mod migration;
pub mod symptoms;
pub mod wearable;

pub use active_streams::ActiveStreamStore;
pub use chat::{ChatMessage, ChatSession, ChatSessionStore};
pub use db::Database;
pub use documents::{DocumentStatus, DocumentStore, MedicalDocument, NewMedicalDocument};
pub use error::{StoreError, StoreResult};
pub use ingestion_job::{IngestionJob, IngestionJobStore, JobStatus};
pub use labs::{LabFilter, LabResult, LabResultStore, NewLabResult};
pub use symptoms::{NewSymptomEntry, SymptomEntry, SymptomFilter, SymptomStore};
pub use wearable::{WearableFilter, WearableSample, WearableStore};

/// Bundles every repository behind a single handle so application code
/// only needs to thread one value through its state, not nine.
#[derive(Clone)]
pub struct HealthStore {
    pub chat: ChatSessionStore,
    pub documents: DocumentStore,
    pub labs: LabResultStore,
    pub symptoms: SymptomStore,
    pub wearable: WearableStore,
    pub ingestion_jobs: IngestionJobStore,
    pub active_streams: ActiveStreamStore,
}

impl HealthStore {
    pub fn new(db: Database) -> Self {
        Self {
            chat: ChatSessionStore::new(db.clone()),
            documents: DocumentStore::new(db.clone()),
            labs: LabResultStore::new(db.clone()),
            symptoms: SymptomStore::new(db.clone()),
            wearable: WearableStore::new(db.clone()),
            ingestion_jobs: IngestionJobStore::new(db.clone()),
            active_streams: ActiveStreamStore::new(db),
        }
    }
}
