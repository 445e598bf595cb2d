//! Collaborator traits for template catalogs and the ERP snapshot source,
//! plus in-memory implementations.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bomsync_models::{BomError, BomResult, PartAttributes};

use crate::tree::BomTree;

/// Source of initial trees and candidate alternates.
pub trait CatalogProvider: Send + Sync {
    /// Initial tree for a product key.
    fn template(&self, product_key: &str) -> BomResult<BomTree>;

    /// Candidate alternates for the primary with this part number.
    fn alternates_for(&self, part_number: &str) -> Vec<PartAttributes>;
}

/// Source of the external ERP snapshot, keyed by position.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<BomTree>;
}

#[derive(Debug, Default)]
pub struct StaticCatalog {
    templates: HashMap<String, BomTree>,
    alternates: HashMap<String, Vec<PartAttributes>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, product_key: impl Into<String>, tree: BomTree) -> Self {
        self.templates.insert(product_key.into(), tree);
        self
    }

    pub fn with_alternate(mut self, part_number: impl Into<String>, alternate: PartAttributes) -> Self {
        self.alternates.entry(part_number.into()).or_default().push(alternate);
        self
    }
}

impl CatalogProvider for StaticCatalog {
    fn template(&self, product_key: &str) -> BomResult<BomTree> {
        self.templates
            .get(product_key)
            .cloned()
            .ok_or_else(|| BomError::node_not_found(format!("template {}", product_key)))
    }

    fn alternates_for(&self, part_number: &str) -> Vec<PartAttributes> {
        self.alternates.get(part_number).cloned().unwrap_or_default()
    }
}

/// Serves a fixed snapshot that tests can replace or take offline.
#[derive(Debug, Default)]
pub struct StaticSnapshotProvider {
    snapshot: RwLock<Option<BomTree>>,
}

impl StaticSnapshotProvider {
    pub fn new(snapshot: BomTree) -> Self {
        Self { snapshot: RwLock::new(Some(snapshot)) }
    }

    /// A provider whose fetches always fail.
    pub fn offline() -> Self {
        Self::default()
    }

    pub fn set_snapshot(&self, snapshot: Option<BomTree>) {
        match self.snapshot.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }
}

#[async_trait]
impl SnapshotProvider for StaticSnapshotProvider {
    async fn fetch_snapshot(&self) -> Result<BomTree> {
        let guard = self
            .snapshot
            .read()
            .map_err(|_| anyhow!("snapshot lock poisoned"))?;
        guard.clone().ok_or_else(|| anyhow!("ERP endpoint is offline"))
    }
}
