#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("meta store request failed: {0}")]
    Backend(#[from] anyhow::Error),

    #[error("failed to encode or decode {key}: {source}")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The lock guarding a write was released or re-acquired by someone else.
    #[error("lock {key} is no longer held")]
    LockLost { key: String },

    #[error("{kind} {id} already exists")]
    AlreadyExists { kind: &'static str, id: String },
}

impl StoreError {
    pub fn is_lock_lost(&self) -> bool {
        matches!(self, StoreError::LockLost { .. })
    }
}
