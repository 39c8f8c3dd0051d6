//! Error types for subvault

use thiserror::Error;

use crate::network::transport::TransportError;

/// Main error type for subvault operations
#[derive(Error, Debug)]
pub enum VaultError {
    /// Domain is absent from the store and from every network tier
    #[error("No subdomain data found for {0}")]
    NotFound(String),

    /// Root domain cannot be used as a store key
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    /// Content address is empty or not safe to put in a URL
    #[error("Invalid content address: {0:?}")]
    InvalidContentId(String),

    /// Local content node did not answer the availability check
    #[error("Content node unavailable: {0}")]
    NodeUnavailable(String),

    /// Every gateway tier was tried and none returned the content
    #[error("Failed to fetch {cid} from all {attempts} endpoints (last error: {last_error})")]
    GatewaysExhausted {
        cid: String,
        attempts: usize,
        last_error: String,
    },

    /// HTTP transport failure for a single endpoint
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Stored or fetched data could not be decoded
    #[error("Corrupt data: {0}")]
    CorruptData(String),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// External discovery tool is not installed
    #[error("Scanner not found: {0}")]
    ToolNotFound(String),

    /// External discovery tool ran but failed
    #[error("Scan failed: {0}")]
    ScanFailed(String),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    /// Whether a resolution tier may absorb this error and fall through to the next tier.
    ///
    /// Disk and database failures are not recoverable: they abort the operation in progress.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            VaultError::NotFound(_)
                | VaultError::InvalidContentId(_)
                | VaultError::NodeUnavailable(_)
                | VaultError::GatewaysExhausted { .. }
                | VaultError::Transport(_)
                | VaultError::CorruptData(_)
                | VaultError::Serialization(_)
        )
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        VaultError::Serialization(err.to_string())
    }
}

/// Result type alias using VaultError
pub type VaultResult<T> = Result<T, VaultError>;
