//! Error taxonomy for the sync pipeline.
//!
//! Each layer owns its own error type ([`ProtocolError`] on the wire,
//! [`StoreError`] in storage). At the pipeline boundary they collapse into
//! [`SyncError`], which is what the connection handler logs.

use thiserror::Error;

use crate::protocol::ProtocolError;
use crate::storage::StoreError;

/// Errors surfaced by the mutation pipeline.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The request could not be decoded or failed validation. No record was
    /// touched.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] ProtocolError),

    /// Reading or writing the persistent store failed for this list.
    #[error("store unavailable for list '{list_id}': {source}")]
    StoreUnavailable {
        list_id: String,
        #[source]
        source: StoreError,
    },
}

impl SyncError {
    pub(crate) fn store(list_id: &str, source: StoreError) -> Self {
        Self::StoreUnavailable {
            list_id: list_id.to_string(),
            source,
        }
    }

    /// The list this error concerns, if known.
    pub fn list_id(&self) -> Option<&str> {
        match self {
            Self::InvalidRequest(_) => None,
            Self::StoreUnavailable { list_id, .. } => Some(list_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_unavailable_display() {
        let err = SyncError::store("L1", StoreError::Database("disk full".into()));
        let msg = err.to_string();
        assert!(msg.contains("L1"));
        assert!(msg.contains("disk full"));
        assert_eq!(err.list_id(), Some("L1"));
    }

    #[test]
    fn test_invalid_request_from_protocol() {
        let err: SyncError = ProtocolError::MissingField("id").into();
        assert!(matches!(err, SyncError::InvalidRequest(_)));
        assert!(err.list_id().is_none());
        assert!(err.to_string().starts_with("invalid request"));
    }
}
