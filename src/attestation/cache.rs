use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;

use super::ArtifactRequest;
use crate::error::Result;
use crate::model::{Attestation, Ecosystem};

/// Everything that can change a verification result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub ecosystem: Ecosystem,
    pub artifact: String,
    pub version: String,
    pub hash: String,
    pub expected_repo_url: Option<String>,
}

impl CacheKey {
    pub fn new(ecosystem: Ecosystem, request: &ArtifactRequest<'_>) -> Self {
        Self {
            ecosystem,
            artifact: request.artifact.to_string(),
            version: request.version.to_string(),
            hash: request.hash.to_string(),
            expected_repo_url: request.expected_repo_url.map(str::to_string),
        }
    }
}

type Cell = Arc<OnceCell<Vec<Attestation>>>;

/// Memoized verification results for one batch run.
///
/// Each key owns a cell; the map lock is only held to find or create the
/// cell, so computations for different keys run independently while callers
/// for the same key wait on a single computation. Errors are not stored and
/// the next caller retries.
#[derive(Default)]
pub struct VerificationCache {
    cells: Mutex<HashMap<CacheKey, Cell>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl VerificationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute<F>(&self, key: CacheKey, compute: F) -> Result<Vec<Attestation>>
    where
        F: FnOnce() -> Result<Vec<Attestation>>,
    {
        let cell = {
            let mut cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
            cells.entry(key).or_default().clone()
        };

        let mut computed = false;
        let value = cell.get_or_try_init(|| {
            computed = true;
            compute()
        })?;

        if computed {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value.clone())
    }

    /// Number of stored results.
    pub fn len(&self) -> usize {
        let cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
        cells.values().filter(|c| c.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }
}
