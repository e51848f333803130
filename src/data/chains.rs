use std::collections::BTreeMap;

use crate::data::error::ValidationError;

/// One gateway endpoint: a (network, environment) pair and the host label the
/// gateway serves it under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkEndpoint {
    pub network: &'static str,
    pub env: &'static str,
    pub host: &'static str,
    pub chain_id: Option<u64>,
}

const fn endpoint(
    network: &'static str,
    env: &'static str,
    host: &'static str,
    chain_id: Option<u64>,
) -> NetworkEndpoint {
    NetworkEndpoint {
        network,
        env,
        host,
        chain_id,
    }
}

/// Used for chain ids missing from the table.
pub const PRIMARY_NETWORK: &str = "ethereum";
pub const PRIMARY_ENV: &str = "mainnet";

pub const NETWORK_ENDPOINTS: &[NetworkEndpoint] = &[
    endpoint("arbitrum", "mainnet", "arbitrum-mainnet", Some(42161)),
    endpoint("arbitrum", "sepolia", "arbitrum-sepolia", Some(421614)),
    endpoint("avalanche", "mainnet", "avalanche-mainnet", Some(43114)),
    endpoint("avalanche", "fuji", "avalanche-fuji", Some(43113)),
    endpoint("base", "mainnet", "base-mainnet", Some(8453)),
    endpoint("base", "sepolia", "base-sepolia", Some(84532)),
    endpoint("blast", "mainnet", "blast-mainnet", Some(81457)),
    endpoint("blast", "sepolia", "blast-sepolia", Some(168587773)),
    endpoint("bsc", "mainnet", "bsc-mainnet", Some(56)),
    endpoint("bsc", "testnet", "bsc-testnet", Some(97)),
    endpoint("celo", "mainnet", "celo-mainnet", Some(42220)),
    endpoint("celo", "alfajores", "celo-alfajores", Some(44787)),
    endpoint("ethereum", "mainnet", "mainnet", Some(1)),
    endpoint("ethereum", "sepolia", "sepolia", Some(11155111)),
    endpoint("ethereum", "holesky", "holesky", Some(17000)),
    endpoint("linea", "mainnet", "linea-mainnet", Some(59144)),
    endpoint("linea", "sepolia", "linea-sepolia", Some(59141)),
    endpoint("mantle", "mainnet", "mantle-mainnet", Some(5000)),
    endpoint("mantle", "sepolia", "mantle-sepolia", Some(5003)),
    endpoint("opbnb", "mainnet", "opbnb-mainnet", Some(204)),
    endpoint("opbnb", "testnet", "opbnb-testnet", Some(5611)),
    endpoint("optimism", "mainnet", "optimism-mainnet", Some(10)),
    endpoint("optimism", "sepolia", "optimism-sepolia", Some(11155420)),
    endpoint("palm", "mainnet", "palm-mainnet", Some(11297108109)),
    endpoint("palm", "testnet", "palm-testnet", Some(11297108099)),
    endpoint("polygon", "mainnet", "polygon-mainnet", Some(137)),
    endpoint("polygon", "amoy", "polygon-amoy", Some(80002)),
    endpoint("scroll", "mainnet", "scroll-mainnet", Some(534352)),
    endpoint("scroll", "sepolia", "scroll-sepolia", Some(534351)),
    endpoint("starknet", "mainnet", "starknet-mainnet", None),
    endpoint("starknet", "sepolia", "starknet-sepolia", None),
    endpoint("swellchain", "mainnet", "swellchain-mainnet", Some(1923)),
    endpoint("swellchain", "testnet", "swellchain-testnet", Some(1924)),
    endpoint("unichain", "mainnet", "unichain-mainnet", Some(130)),
    endpoint("unichain", "sepolia", "unichain-sepolia", Some(1301)),
    endpoint("zksync", "mainnet", "zksync-mainnet", Some(324)),
    endpoint("zksync", "sepolia", "zksync-sepolia", Some(300)),
];

/// Look up the endpoint for a chain id, falling back to the primary
/// network's production environment for unknown ids.
pub fn endpoint_for_chain(chain_id: u64) -> &'static NetworkEndpoint {
    NETWORK_ENDPOINTS
        .iter()
        .find(|e| e.chain_id == Some(chain_id))
        .unwrap_or_else(primary_endpoint)
}

/// Whether `chain_id` is in the table (as opposed to taking the fallback).
pub fn is_mapped(chain_id: u64) -> bool {
    NETWORK_ENDPOINTS.iter().any(|e| e.chain_id == Some(chain_id))
}

fn primary_endpoint() -> &'static NetworkEndpoint {
    // The table always carries the primary pair.
    NETWORK_ENDPOINTS
        .iter()
        .find(|e| e.network == PRIMARY_NETWORK && e.env == PRIMARY_ENV)
        .unwrap_or(&NETWORK_ENDPOINTS[0])
}

/// Resolve a (network, environment) pair to its host label. Unknown pairs
/// fail closed rather than falling back.
pub fn endpoint_host(network: &str, env: &str) -> Result<&'static str, ValidationError> {
    let network_lc = network.trim().to_lowercase();
    let env_lc = env.trim().to_lowercase();
    NETWORK_ENDPOINTS
        .iter()
        .find(|e| e.network == network_lc && e.env == env_lc)
        .map(|e| e.host)
        .ok_or_else(|| ValidationError::Network {
            network: network.to_string(),
            env: env.to_string(),
        })
}

/// All networks with their environments, in table order.
pub fn network_list() -> BTreeMap<String, Vec<String>> {
    let mut networks: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for e in NETWORK_ENDPOINTS {
        networks
            .entry(e.network.to_string())
            .or_default()
            .push(e.env.to_string());
    }
    networks
}
