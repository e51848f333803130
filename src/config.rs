use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::data::cache::DEFAULT_CACHE_CAPACITY;
use crate::data::explorer::ETHERSCAN_V2_URL;
use crate::data::rpc::DEFAULT_URL_TEMPLATE;
use crate::data::types::SortOrder;

#[derive(Parser, Debug)]
#[command(
    name = "chain-aggregator",
    version,
    about = "Transaction history, ABI and balance aggregation over a block explorer and JSON-RPC gateway"
)]
pub struct Config {
    /// Block explorer API key
    #[arg(long, env = "ETHERSCAN_API_KEY", default_value = "", hide_env_values = true)]
    pub etherscan_api_key: String,

    /// Block explorer API endpoint
    #[arg(long, env = "ETHERSCAN_API_URL", default_value = ETHERSCAN_V2_URL)]
    pub etherscan_api_url: String,

    /// Explorer requests per second
    #[arg(long, env = "ETHERSCAN_RATE_LIMIT", default_value = "5",
          value_parser = clap::value_parser!(u32).range(1..))]
    pub etherscan_rate_limit: u32,

    /// JSON-RPC gateway project key (appended to the URL)
    #[arg(long, env = "RPC_API_KEY", default_value = "", hide_env_values = true)]
    pub rpc_api_key: String,

    /// JSON-RPC gateway project secret (sent as basic auth)
    #[arg(long, env = "RPC_API_SECRET", hide_env_values = true)]
    pub rpc_api_secret: Option<String>,

    /// Gateway URL; `{host}` is replaced by the network's host label
    #[arg(long, env = "RPC_URL_TEMPLATE", default_value = DEFAULT_URL_TEMPLATE)]
    pub rpc_url_template: String,

    /// Timeout for every outbound HTTP request, in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value = "30")]
    pub http_timeout_secs: u64,

    /// Maximum number of cached responses
    #[arg(long, env = "CACHE_CAPACITY", default_value_t = DEFAULT_CACHE_CAPACITY)]
    pub cache_capacity: usize,

    /// Expire cached responses after this many seconds
    #[arg(long, env = "CACHE_TTL_SECS")]
    pub cache_ttl_secs: Option<u64>,

    /// Cache failed responses too
    #[arg(long, env = "CACHE_FAILURES")]
    pub cache_failures: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

impl Config {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch an address's complete transaction history
    History {
        address: String,
        #[arg(long, default_value = "1")]
        chain_id: u64,
        #[arg(long, default_value = "1000")]
        offset: u64,
        #[arg(long, default_value = "0")]
        start_block: u64,
        #[arg(long)]
        end_block: Option<u64>,
        #[arg(long, value_enum, default_value = "asc")]
        sort: SortOrder,
    },
    /// Fetch an ERC-20 balance, scaled by the token's decimals
    TokenBalance {
        address: String,
        token_address: String,
        #[arg(long, default_value = "1")]
        chain_id: u64,
    },
    /// Build the ABI map and token candidates for a JSON array of transactions
    ExtractTokens {
        /// File holding the transactions; stdin when omitted
        file: Option<PathBuf>,
        #[arg(long, default_value = "1")]
        chain_id: u64,
    },
    /// Run any named operation with JSON params
    Invoke {
        method: String,
        #[arg(default_value = "{}")]
        params: String,
    },
    /// List supported networks and environments
    Networks,
    /// Answer `{"method", "params"}` requests, one JSON object per line on stdin
    Serve,
}
