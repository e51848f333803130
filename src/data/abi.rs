use std::collections::{BTreeMap, HashMap, HashSet};

use alloy::json_abi::JsonAbi;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::data::error::ExplorerError;
use crate::data::explorer::ExplorerApi;
use crate::data::types::ContractAbi;
use crate::utils::normalize_address;

/// What one explorer ABI lookup produced.
#[derive(Debug)]
pub enum AbiLookup {
    Verified(ContractAbi),
    /// No published source, or a published ABI with no entries.
    Unverified,
    Failed(ExplorerError),
}

impl AbiLookup {
    fn from_result(result: Result<Option<ContractAbi>, ExplorerError>) -> Self {
        match result {
            Ok(Some(abi)) if !abi.is_empty() => Self::Verified(abi),
            Ok(_) => Self::Unverified,
            Err(e) => Self::Failed(e),
        }
    }
}

/// ABIs resolved for one batch of transactions, keyed by lowercase address.
///
/// Lives only as long as the batch; nothing here outlives the request.
#[derive(Debug, Default)]
pub struct AbiBatch {
    abis: HashMap<String, ContractAbi>,
}

impl AbiBatch {
    /// Look up every distinct address once. Lookups are issued together and
    /// paced by the explorer client's rate limiter. Unverified contracts and
    /// failed lookups are left out of the batch; neither fails it.
    pub async fn resolve<I, S>(explorer: &dyn ExplorerApi, chain_id: u64, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let distinct = distinct_lowercase(addresses);
        let lookups = distinct.iter().map(|address| async move {
            let lookup = AbiLookup::from_result(explorer.contract_abi(chain_id, address).await);
            (address.as_str(), lookup)
        });

        let mut abis = HashMap::new();
        for (address, lookup) in join_all(lookups).await {
            match lookup {
                AbiLookup::Verified(abi) => {
                    debug!(address, entries = abi.entries().len(), "Resolved contract ABI.");
                    abis.insert(address.to_string(), abi);
                }
                AbiLookup::Unverified => {
                    debug!(address, "Contract has no verified ABI.");
                }
                AbiLookup::Failed(e) => {
                    warn!(address, error = %e, "ABI lookup failed; contract skipped.");
                }
            }
        }
        Self { abis }
    }

    pub fn get(&self, address: &str) -> Option<&JsonAbi> {
        self.abis.get(&address.to_lowercase()).map(ContractAbi::parsed)
    }

    pub fn len(&self) -> usize {
        self.abis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.abis.is_empty()
    }

    pub fn into_map(self) -> BTreeMap<String, ContractAbi> {
        self.abis.into_iter().collect()
    }
}

/// Lowercase and de-duplicate, keeping first-seen order. Anything that is
/// not a well-formed address is dropped.
pub fn distinct_lowercase<I, S>(addresses: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    addresses
        .into_iter()
        .filter_map(|a| normalize_address(a.as_ref()))
        .filter(|a| seen.insert(a.clone()))
        .collect()
}
