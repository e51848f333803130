//! In-memory explorer used by the aggregation tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use alloy::dyn_abi::{DynSolValue, JsonAbiExt};
use alloy::json_abi::JsonAbi;
use alloy::primitives::{Address, U256, hex};
use async_trait::async_trait;

use crate::data::error::ExplorerError;
use crate::data::explorer::{ExplorerApi, TxListQuery};
use crate::data::types::{ContractAbi, SortOrder, Transaction};

pub const HOLDER: &str = "0xd8da6bf26964af9d7eed9e03e53415d37aa96045";
pub const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
pub const ROUTER: &str = "0x7a250d5630b4cf539739df2c5dacb4c659f2488d";
pub const UNVERIFIED: &str = "0x1111111111111111111111111111111111111111";

pub fn tx(hash: &str, block_number: u64) -> Transaction {
    Transaction {
        block_number,
        block_hash: format!("0x{block_number:064x}"),
        timestamp: 1_700_000_000 + block_number,
        hash: hash.to_string(),
        nonce: "0".to_string(),
        transaction_index: "0".to_string(),
        from: HOLDER.to_string(),
        to: Some(USDC.to_string()),
        value: "0".to_string(),
        gas: "21000".to_string(),
        gas_price: "1000000000".to_string(),
        input: "0x".to_string(),
        method_id: "0x".to_string(),
        function_name: String::new(),
        contract_address: None,
        cumulative_gas_used: "21000".to_string(),
        gas_used: "21000".to_string(),
        confirmations: "1".to_string(),
        is_error: "0".to_string(),
        receipt_status: "1".to_string(),
    }
}

/// `count` transactions, `per_block` of them in each block, starting at block 1.
pub fn txs(count: usize, per_block: usize) -> Vec<Transaction> {
    (0..count)
        .map(|i| tx(&format!("0x{i:064x}"), 1 + (i / per_block.max(1)) as u64))
        .collect()
}

pub fn erc20_abi() -> JsonAbi {
    serde_json::from_str(
        r#"[
        {"type":"function","name":"transfer","inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}],"outputs":[{"name":"","type":"bool"}],"stateMutability":"nonpayable"},
        {"type":"function","name":"approve","inputs":[{"name":"spender","type":"address"},{"name":"amount","type":"uint256"}],"outputs":[{"name":"","type":"bool"}],"stateMutability":"nonpayable"},
        {"type":"function","name":"decimals","inputs":[],"outputs":[{"name":"","type":"uint8"}],"stateMutability":"view"}
    ]"#,
    )
    .unwrap()
}

/// The ABI as the explorer would publish it.
pub fn published(abi: &JsonAbi) -> ContractAbi {
    serde_json::from_value(serde_json::to_value(abi).unwrap()).unwrap()
}

/// Calldata for an ERC-20 `(address, uint256)` function such as `transfer` or `approve`.
pub fn erc20_calldata(function: &str, to: &str, amount: u64) -> String {
    let to: Address = to.parse().unwrap();
    let abi = erc20_abi();
    let func = &abi.function(function).unwrap()[0];
    let encoded = func
        .abi_encode_input(&[DynSolValue::Address(to), DynSolValue::Uint(U256::from(amount), 256)])
        .unwrap();
    format!("0x{}", hex::encode(encoded))
}

#[derive(Default)]
pub struct FakeExplorer {
    pub head: u64,
    /// Ascending by block.
    pub txs: Vec<Transaction>,
    /// `None` marks an unverified contract; a missing key is an API error.
    pub abis: HashMap<String, Option<JsonAbi>>,
    pub balances: HashMap<(String, String), String>,
    /// 1-based index of the page request that fails.
    pub fail_on_page: Option<usize>,
    pub queries: Mutex<Vec<TxListQuery>>,
    pub head_lookups: AtomicUsize,
    pub abi_lookups: Mutex<Vec<String>>,
}

impl FakeExplorer {
    pub fn with_txs(txs: Vec<Transaction>) -> Self {
        let head = txs.last().map(|t| t.block_number + 10).unwrap_or(10);
        Self {
            head,
            txs,
            ..Default::default()
        }
    }

    pub fn page_requests(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl ExplorerApi for FakeExplorer {
    async fn latest_block(&self, _chain_id: u64) -> Result<u64, ExplorerError> {
        self.head_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.head)
    }

    async fn transactions(&self, query: &TxListQuery) -> Result<Vec<Transaction>, ExplorerError> {
        let request_number = {
            let mut queries = self.queries.lock().unwrap();
            queries.push(query.clone());
            queries.len()
        };
        if self.fail_on_page == Some(request_number) {
            return Err(ExplorerError::Api {
                message: "NOTOK".to_string(),
                detail: "Max rate limit reached".to_string(),
            });
        }

        let window = self
            .txs
            .iter()
            .filter(|t| t.block_number >= query.start_block && t.block_number <= query.end_block);
        let page: Vec<Transaction> = match query.sort {
            SortOrder::Asc => window.take(query.offset as usize).cloned().collect(),
            SortOrder::Desc => window.rev().take(query.offset as usize).cloned().collect(),
        };
        Ok(page)
    }

    async fn contract_abi(
        &self,
        _chain_id: u64,
        address: &str,
    ) -> Result<Option<ContractAbi>, ExplorerError> {
        self.abi_lookups.lock().unwrap().push(address.to_string());
        match self.abis.get(address) {
            Some(abi) => Ok(abi.as_ref().map(published)),
            None => Err(ExplorerError::Malformed(format!("no fixture for {address}"))),
        }
    }

    async fn token_balance(
        &self,
        _chain_id: u64,
        holder: &str,
        token: &str,
    ) -> Result<String, ExplorerError> {
        self.balances
            .get(&(holder.to_string(), token.to_string()))
            .cloned()
            .ok_or_else(|| ExplorerError::Api {
                message: "NOTOK".to_string(),
                detail: "Error! Invalid contract address format".to_string(),
            })
    }
}
