use thiserror::Error;

/// Rejected input, reported before any network call is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid {field}: {value} is not a 0x-prefixed 20-byte address")]
    Address { field: &'static str, value: String },

    #[error("Invalid {field}: {value} is not 0x-prefixed hex data")]
    HexData { field: &'static str, value: String },

    #[error("Invalid offset {0}: page size must be between 1 and {max}", max = crate::data::history::MAX_PAGE_SIZE)]
    PageSize(u64),

    #[error("Invalid page {0}: pages start at 1")]
    Page(u64),

    #[error("Invalid block range: startBlock {start} is after endBlock {end}")]
    BlockRange { start: u64, end: u64 },

    #[error("Invalid function signature: {0}")]
    FunctionSignature(String),

    #[error("Invalid network: {network} or networkEnv: {env}")]
    Network { network: String, env: String },

    #[error("Invalid parameters: {0}")]
    Params(String),
}

/// The rate limiter's consumer task is gone, or dropped a job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("Rate limiter queue is closed")]
    QueueClosed,

    #[error("Rate-limited job was dropped before completing")]
    JobDropped,
}

/// Failures talking to the block explorer REST API.
#[derive(Error, Debug)]
pub enum ExplorerError {
    #[error("Explorer request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error("Explorer API error: {message} ({detail})")]
    Api { message: String, detail: String },

    #[error("Invalid explorer response: {0}")]
    Malformed(String),
}

/// Failures talking to the JSON-RPC gateway.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error(transparent)]
    UnknownNetwork(#[from] ValidationError),

    #[error("RPC request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Upstream { code: i64, message: String },

    #[error("RPC response carried neither result nor error")]
    EmptyResult,

    #[error("ABI encoding failed: {0}")]
    Abi(String),
}
