pub mod abi;
pub mod balance;
pub mod cache;
pub mod chains;
pub mod decoder;
pub mod error;
pub mod explorer;
pub mod history;
pub mod rate_limit;
pub mod router;
pub mod rpc;
pub mod types;

#[cfg(test)]
pub mod test_support;

use std::collections::{BTreeMap, HashSet};
use std::fmt::Display;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::data::abi::AbiBatch;
use crate::data::balance::{format_units, parse_quantity};
use crate::data::decoder::{DecodeOutcome, TxDecoder};
use crate::data::error::RpcError;
use crate::data::explorer::ExplorerApi;
use crate::data::history::fetch_history;
use crate::data::rpc::{CallParams, ContractCaller, RpcTarget, call_function, token_decimals};
use crate::data::types::*;

const NATIVE_DECIMALS: i64 = 18;

/// The operations exposed to callers. Every method takes an already
/// validated request and answers with an envelope; upstream failures become
/// failed envelopes and are logged here.
pub struct AggregationService {
    explorer: Arc<dyn ExplorerApi>,
    rpc: Arc<dyn ContractCaller>,
}

impl AggregationService {
    pub fn new(explorer: Arc<dyn ExplorerApi>, rpc: Arc<dyn ContractCaller>) -> Self {
        Self { explorer, rpc }
    }

    /// Complete transaction list for an address.
    pub async fn tx_history(&self, request: &TxHistoryRequest) -> Envelope<TxHistoryResponse> {
        info!(address = %request.address, chain_id = request.chain_id, "Fetching transaction history.");
        match fetch_history(self.explorer.as_ref(), request).await {
            Ok(tx_history) => Envelope::ok(TxHistoryResponse { tx_history }),
            Err(e) => upstream_failure("getTxHistory", e),
        }
    }

    /// ERC-20 balance of `address`, scaled by the token's decimals.
    pub async fn token_balance(
        &self,
        request: &TokenBalanceRequest,
    ) -> Envelope<TokenBalanceResponse> {
        info!(
            address = %request.address,
            token = %request.token_address,
            chain_id = request.chain_id,
            "Fetching token balance."
        );
        let raw = match self
            .explorer
            .token_balance(request.chain_id, &request.address, &request.token_address)
            .await
        {
            Ok(raw) => raw,
            Err(e) => return upstream_failure("getTokenBalance", e),
        };
        let decimals = token_decimals(self.rpc.as_ref(), request.chain_id, &request.token_address).await;
        Envelope::ok(TokenBalanceResponse {
            balance: format_units(&raw, i64::from(decimals)),
            decimals,
        })
    }

    /// Resolve the ABI of every contract the batch calls, then decode each
    /// call and collect its address-typed arguments as token candidates.
    ///
    /// Contracts without an ABI and calls that fail to decode contribute
    /// nothing; neither fails the batch.
    pub async fn extract_tokens(&self, request: &ExtractTokensRequest) -> Envelope<AbiMapResponse> {
        info!(txs = request.txs.len(), chain_id = request.chain_id, "Building ABI map.");
        let recipients = request.txs.iter().filter_map(|tx| tx.to.as_deref());
        let batch = AbiBatch::resolve(self.explorer.as_ref(), request.chain_id, recipients).await;

        let mut seen = HashSet::new();
        let mut token_addresses = Vec::new();
        for tx in &request.txs {
            let Some(abi) = tx.to.as_deref().and_then(|to| batch.get(to)) else {
                continue;
            };
            match TxDecoder::decode(abi, tx) {
                outcome @ DecodeOutcome::Decoded(_) => {
                    for address in outcome.address_arguments() {
                        if seen.insert(address.clone()) {
                            token_addresses.push(address);
                        }
                    }
                }
                DecodeOutcome::Skipped(reason) => {
                    debug!(hash = ?tx.hash, to = ?tx.to, %reason, "Transaction not decoded.");
                }
            }
        }

        info!(
            contracts = batch.len(),
            tokens = token_addresses.len(),
            "ABI map built."
        );
        Envelope::ok(AbiMapResponse {
            abi_map: batch.into_map(),
            token_addresses,
        })
    }

    /// The verified ABI of one contract; empty for unverified contracts.
    pub async fn contract_abi(&self, request: &ContractAbiRequest) -> Envelope<ContractAbiResponse> {
        info!(contract = %request.contract_address, chain_id = request.chain_id, "Fetching contract ABI.");
        match self
            .explorer
            .contract_abi(request.chain_id, &request.contract_address)
            .await
        {
            Ok(abi) => Envelope::ok(ContractAbiResponse {
                abi: abi.unwrap_or_default(),
            }),
            Err(e) => upstream_failure("getContractABI", e),
        }
    }

    pub async fn call_contract(&self, request: &CallContractRequest) -> Envelope<CallResult> {
        info!(to = %request.to, chain_id = request.chain_id, "Calling contract.");
        let call = CallParams {
            to: request.to.clone(),
            data: request.data.clone(),
            from: request.from.clone(),
            value: request.value.clone(),
            gas: request.gas.clone(),
            gas_price: request.gas_price.clone(),
        };
        match self
            .rpc
            .eth_call(&RpcTarget::Chain(request.chain_id), &call, &request.block_tag)
            .await
        {
            Ok(result) => Envelope::ok(CallResult { result }),
            Err(e) => rpc_failure("callContract", e),
        }
    }

    /// Native currency balance as a hex wei quantity and as a decimal string.
    pub async fn native_balance(
        &self,
        request: &NativeBalanceRequest,
    ) -> Envelope<NativeBalanceResponse> {
        info!(address = %request.address, chain_id = request.chain_id, "Fetching native balance.");
        match self
            .rpc
            .get_balance(&RpcTarget::Chain(request.chain_id), &request.address, "latest")
            .await
        {
            Ok(balance) => {
                let formatted = match parse_quantity(&balance) {
                    Some(wei) => format_units(&wei.to_string(), NATIVE_DECIMALS),
                    None => balance.clone(),
                };
                Envelope::ok(NativeBalanceResponse { balance, formatted })
            }
            Err(e) => rpc_failure("getNativeGasBalance", e),
        }
    }

    /// Call a contract through a human-readable function signature.
    pub async fn call_blockchain(
        &self,
        request: &CallFunctionRequest,
    ) -> Envelope<FunctionCallResponse> {
        info!(
            address = %request.address,
            signature = %request.function_signature,
            network = %request.network,
            env = %request.network_env,
            "Calling contract function."
        );
        match call_function(self.rpc.as_ref(), request).await {
            Ok(response) => Envelope::ok(response),
            Err(e) => rpc_failure("callBlockchain", e),
        }
    }

    /// Every supported network with its environments.
    pub fn list_blockchains(&self) -> Envelope<BTreeMap<String, Vec<String>>> {
        Envelope::ok(chains::network_list())
    }
}

fn upstream_failure<T>(method: &str, e: impl Display) -> Envelope<T> {
    error!(method, error = %e, "Operation failed.");
    Envelope::failed(STATUS_UPSTREAM_FAILURE, e.to_string())
}

fn rpc_failure<T>(method: &str, e: RpcError) -> Envelope<T> {
    match e {
        RpcError::UnknownNetwork(_) => {
            error!(method, error = %e, "Rejected request.");
            Envelope::failed(STATUS_BAD_REQUEST, e.to_string())
        }
        other => upstream_failure(method, other),
    }
}
