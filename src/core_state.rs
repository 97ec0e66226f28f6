//! Shared service state for the ingestion API and scheduler wiring.
//!
//! Connections are opened per operation rather than held: SQLite handles
//! are cheap here and per-alert serialization comes from the version guard
//! on the alert row, not from connection ownership.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::catalog::ThresholdCatalog;
use crate::classifier::ClassifierConfig;
use crate::db;
use crate::db::DatabaseError;
use crate::engine::AlertEngine;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Everything a request handler needs, shared behind an `Arc`.
pub struct CoreState {
    db_path: PathBuf,
    pub catalog: ThresholdCatalog,
    pub classifier_config: ClassifierConfig,
    pub engine: Arc<AlertEngine>,
}

impl CoreState {
    pub fn new(
        db_path: PathBuf,
        catalog: ThresholdCatalog,
        classifier_config: ClassifierConfig,
        engine: Arc<AlertEngine>,
    ) -> Self {
        Self { db_path, catalog, classifier_config, engine }
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Open a database connection for one operation.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        Ok(db::open_database(&self.db_path)?)
    }
}
