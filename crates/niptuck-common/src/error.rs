/// Error types shared across the NipTuck crates.
///
/// These errors represent failures in infrastructure components (Redis, the on-disk key-value
/// file) that sit underneath the credential store. Scoring errors are defined in the scorer
/// crate and wrap `CommonError` via `#[from]`.

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store io error at {path}: {source}")]
    StoreIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("store file {path} is not a JSON object: {source}")]
    StoreFormat {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no data directory available for the credential store; set NIPTUCK_STORE_PATH")]
    NoDataDir,
}
