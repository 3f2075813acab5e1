//! Utility functions for identifiers

use crate::error::{PersistenceError, WorkflowError};
use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> Result<String, WorkflowError> {
    let hrp = bech32::Hrp::parse(hrp).map_err(|e| PersistenceError::Identifier(e.to_string()))?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .map_err(|e| PersistenceError::Identifier(e.to_string()))?;
    Ok(encode)
}

/// `<a>\0<b>` composite key, keeps prefix scans from matching a longer neighbour.
pub(crate) fn composite_key(prefix: &[u8], suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 1 + suffix.len());
    key.extend_from_slice(prefix);
    key.push(0);
    key.extend_from_slice(suffix);
    key
}

/// Trims and rejects blank free text.
pub(crate) fn non_blank(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}
