//! Log retention for the local log directories.
//!
//! Each category is pruned independently against its own retention period.
//! A run:
//! 1. Computes `cutoff = now - retention_days` for the category
//! 2. Deletes files last modified strictly before the cutoff
//! 3. Leaves the rotation library's `-audit.json` bookkeeping files alone
//!
//! Dry runs report exactly what a live run would remove without deleting.

mod cleaner;

use std::collections::BTreeMap;

pub use cleaner::RetentionCleaner;
use serde::Serialize;
use thiserror::Error;

use crate::{logs::Category, validation::ValidationError};

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("Invalid retention for {category}: {source}")]
    InvalidPolicy {
        category: Category,
        #[source]
        source: ValidationError,
    },
}

/// Files removed from one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCleanup {
    pub files_removed: u64,
    pub size_freed: u64,
}

/// A file (or category) the cleaner could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupFailure {
    pub category: Category,
    pub file: Option<String>,
    pub error: String,
}

/// Results from a single cleanup run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupResult {
    /// Files removed, or that would be removed on a dry run.
    pub files_removed: u64,
    /// Bytes freed, or that would be freed on a dry run.
    pub size_freed: u64,
    pub dry_run: bool,
    pub per_category: BTreeMap<Category, CategoryCleanup>,
    pub errors: Vec<CleanupFailure>,
}

impl CleanupResult {
    pub fn has_deletions(&self) -> bool {
        self.files_removed > 0
    }
}
