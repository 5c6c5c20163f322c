use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::config::HostelConfig;
use crate::store::{Document, DocumentStore};

/// Entry point for reporting, triage and verification. Cheap to clone; holds
/// no state of its own beyond the store handle and configuration.
#[derive(Clone)]
pub struct HostelService {
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) cfg: Arc<HostelConfig>,
}

impl HostelService {
    pub fn new(store: Arc<dyn DocumentStore>, cfg: HostelConfig) -> Self {
        Self { store, cfg: Arc::new(cfg) }
    }

    pub fn config(&self) -> &HostelConfig { &self.cfg }
    pub fn store(&self) -> &Arc<dyn DocumentStore> { &self.store }
}

// Listings skip documents that no longer match the model instead of failing the whole view.
pub(crate) fn decode_all<T: DeserializeOwned>(docs: Vec<Document>) -> Vec<T> {
    docs.into_iter()
        .filter_map(|doc| match doc.decode::<T>() {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(id = %doc.id, error = %e, "skipping malformed document");
                None
            }
        })
        .collect()
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
