//! Human readable document numbers
use super::error::Result;
use super::storage::Store;
use chrono::{Datelike, Utc};
use sled::Tree;

/// Monotonic number source keyed by a prefix such as `QTN`
pub trait DocumentNumbers: Send + Sync {
    fn next_number(&self, prefix: &str) -> Result<String>;
}

/// Per prefix, company and year counter kept in the `sequences` tree.
///
/// Numbers look like `QTN/STC/2026/0001` and restart every calendar year.
#[derive(Clone)]
pub struct SledSequence {
    tree: Tree,
    company_code: String,
}

impl SledSequence {
    pub fn new(store: &Store, company_code: &str) -> Self {
        Self {
            tree: store.sequences.clone(),
            company_code: company_code.to_string(),
        }
    }
}

impl DocumentNumbers for SledSequence {
    fn next_number(&self, prefix: &str) -> Result<String> {
        let year = Utc::now().year();
        let key = format!("{prefix}-{}-{year}", self.company_code);

        let next = self.tree.update_and_fetch(key.as_bytes(), |old| {
            let current = old
                .and_then(|raw| <[u8; 8]>::try_from(raw).ok())
                .map_or(0, u64::from_be_bytes);
            Some((current + 1).to_be_bytes().to_vec())
        })?;

        let value = next
            .and_then(|raw| <[u8; 8]>::try_from(raw.as_ref()).ok())
            .map_or(1, u64::from_be_bytes);

        Ok(format!("{prefix}/{}/{year}/{value:04}", self.company_code))
    }
}
