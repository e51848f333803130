use std::collections::BTreeMap;

use alloy::dyn_abi::DynSolValue;
use alloy::json_abi::JsonAbi;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::data::error::ValidationError;
use crate::data::history::MAX_PAGE_SIZE;
use crate::utils::{is_address, is_hex_data};

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_UPSTREAM_FAILURE: u16 = 500;

/// One row of an account's transaction list, as returned by the explorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(with = "decimal_u64")]
    pub block_number: u64,
    #[serde(default)]
    pub block_hash: String,
    #[serde(rename = "timeStamp", with = "decimal_u64")]
    pub timestamp: u64,
    pub hash: String,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub transaction_index: String,
    pub from: String,
    /// Empty for contract creations.
    #[serde(default, deserialize_with = "blank_as_none", serialize_with = "none_as_blank")]
    pub to: Option<String>,
    /// Base-unit amount as a decimal string.
    pub value: String,
    #[serde(default)]
    pub gas: String,
    #[serde(default)]
    pub gas_price: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub method_id: String,
    #[serde(default)]
    pub function_name: String,
    #[serde(default, deserialize_with = "blank_as_none", serialize_with = "none_as_blank")]
    pub contract_address: Option<String>,
    #[serde(default)]
    pub cumulative_gas_used: String,
    #[serde(default)]
    pub gas_used: String,
    #[serde(default)]
    pub confirmations: String,
    #[serde(default)]
    pub is_error: String,
    #[serde(default, rename = "txreceipt_status")]
    pub receipt_status: String,
}

impl Transaction {
    pub fn is_success(&self) -> bool {
        self.is_error != "1"
    }
}

/// The subset of a transaction the token extractor needs. Accepts full
/// `Transaction` rows as well as hand-built `{to, input, functionName}` objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TxRef {
    pub hash: Option<String>,
    pub to: Option<String>,
    pub input: Option<String>,
    pub function_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DecodedCall {
    pub function_name: String,
    pub params: Vec<DecodedParam>,
}

#[derive(Debug, Clone)]
pub struct DecodedParam {
    pub name: String,
    /// Canonical Solidity type, e.g. `address` or `uint256[]`.
    pub kind: String,
    pub value: DynSolValue,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

// --- Requests ---

fn default_chain_id() -> u64 {
    1
}

fn default_page() -> u64 {
    1
}

fn default_offset() -> u64 {
    MAX_PAGE_SIZE
}

fn default_block_tag() -> String {
    "latest".to_string()
}

fn check_address(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if is_address(value) {
        Ok(())
    } else {
        Err(ValidationError::Address {
            field,
            value: value.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxHistoryRequest {
    pub address: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    #[serde(default = "default_page")]
    pub page: u64,
    /// Page size, capped by the explorer at `MAX_PAGE_SIZE`.
    #[serde(default = "default_offset")]
    pub offset: u64,
    #[serde(default)]
    pub start_block: u64,
    /// Resolved from the chain head when absent.
    #[serde(default)]
    pub end_block: Option<u64>,
    #[serde(default)]
    pub sort: SortOrder,
}

impl TxHistoryRequest {
    pub fn new(address: impl Into<String>, chain_id: u64) -> Self {
        Self {
            address: address.into(),
            chain_id,
            page: default_page(),
            offset: default_offset(),
            start_block: 0,
            end_block: None,
            sort: SortOrder::Asc,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        check_address("address", &self.address)?;
        if self.offset == 0 || self.offset > MAX_PAGE_SIZE {
            return Err(ValidationError::PageSize(self.offset));
        }
        if self.page == 0 {
            return Err(ValidationError::Page(self.page));
        }
        if let Some(end) = self.end_block {
            if self.start_block > end {
                return Err(ValidationError::BlockRange {
                    start: self.start_block,
                    end,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalanceRequest {
    pub address: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    pub token_address: String,
}

impl TokenBalanceRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_address("address", &self.address)?;
        check_address("tokenAddress", &self.token_address)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractTokensRequest {
    pub txs: Vec<TxRef>,
    pub chain_id: u64,
}

impl ExtractTokensRequest {
    /// A blank `to` is a contract creation; anything else must be an address.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.txs
            .iter()
            .filter_map(|tx| tx.to.as_deref())
            .filter(|to| !to.trim().is_empty())
            .try_for_each(|to| check_address("txs[].to", to.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractAbiRequest {
    pub contract_address: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
}

impl ContractAbiRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_address("contractAddress", &self.contract_address)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallContractRequest {
    pub to: String,
    pub data: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub gas: Option<String>,
    #[serde(default)]
    pub gas_price: Option<String>,
    pub chain_id: u64,
    #[serde(default = "default_block_tag")]
    pub block_tag: String,
}

impl CallContractRequest {
    pub fn new(to: impl Into<String>, data: impl Into<String>, chain_id: u64) -> Self {
        Self {
            to: to.into(),
            data: data.into(),
            from: None,
            value: None,
            gas: None,
            gas_price: None,
            chain_id,
            block_tag: default_block_tag(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        check_address("to", &self.to)?;
        if let Some(from) = &self.from {
            check_address("from", from)?;
        }
        if !is_hex_data(&self.data) {
            return Err(ValidationError::HexData {
                field: "data",
                value: self.data.clone(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeBalanceRequest {
    pub address: String,
    pub chain_id: u64,
}

impl NativeBalanceRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_address("address", &self.address)
    }
}

/// A read-only call described by a human-readable signature, routed by
/// network name rather than chain id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFunctionRequest {
    pub address: String,
    /// e.g. `balanceOf(address) view returns (uint256)`
    pub function_signature: String,
    pub network: String,
    pub network_env: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl CallFunctionRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_address("address", &self.address)?;
        if !is_function_signature(&self.function_signature) {
            return Err(ValidationError::FunctionSignature(
                self.function_signature.clone(),
            ));
        }
        crate::data::chains::endpoint_host(&self.network, &self.network_env)?;
        Ok(())
    }
}

/// `name(...)` followed by anything, where `name` is a Solidity identifier.
fn is_function_signature(signature: &str) -> bool {
    let Some(open) = signature.find('(') else {
        return false;
    };
    let name = &signature[..open];
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    head_ok
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && signature.trim_end().ends_with(')')
}

// --- Responses ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxHistoryResponse {
    pub tx_history: Vec<Transaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalanceResponse {
    pub balance: String,
    pub decimals: u8,
}

/// A verified contract ABI: the explorer's entries in published order, and
/// the parsed form the decoder works from. Serializes back to the entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Value>", into = "Vec<Value>")]
pub struct ContractAbi {
    entries: Vec<Value>,
    parsed: JsonAbi,
}

impl ContractAbi {
    pub fn parsed(&self) -> &JsonAbi {
        &self.parsed
    }

    pub fn entries(&self) -> &[Value] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TryFrom<Vec<Value>> for ContractAbi {
    type Error = serde_json::Error;

    fn try_from(entries: Vec<Value>) -> Result<Self, Self::Error> {
        let parsed = serde_json::from_value(Value::Array(entries.clone()))?;
        Ok(Self { entries, parsed })
    }
}

impl From<ContractAbi> for Vec<Value> {
    fn from(abi: ContractAbi) -> Self {
        abi.entries
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbiMapResponse {
    pub abi_map: BTreeMap<String, ContractAbi>,
    pub token_addresses: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractAbiResponse {
    pub abi: ContractAbi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResult {
    pub result: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeBalanceResponse {
    /// Hex-encoded wei, as returned by the node.
    pub balance: String,
    pub formatted: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallResponse {
    pub result: String,
    pub decoded: Vec<String>,
}

// --- Envelope ---

/// Uniform reply for every exposed operation: data on success, a
/// human-readable message in its place on failure.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub response: Payload<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,
    pub status: u16,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Payload<T> {
    Data(T),
    Message(String),
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            response: Payload::Data(data),
            error: None,
            status: STATUS_OK,
        }
    }

    pub fn failed(status: u16, message: impl Into<String>) -> Self {
        Self {
            response: Payload::Message(message.into()),
            error: Some(true),
            status,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error == Some(true)
    }

    pub fn data(&self) -> Option<&T> {
        match &self.response {
            Payload::Data(data) => Some(data),
            Payload::Message(_) => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match &self.response {
            Payload::Data(_) => None,
            Payload::Message(message) => Some(message),
        }
    }
}

impl<T: Serialize> Envelope<T> {
    /// Erase the payload type so envelopes of different operations can share
    /// one cache and one output stream.
    pub fn into_value(self) -> Envelope<Value> {
        let response = match self.response {
            Payload::Data(data) => match serde_json::to_value(data) {
                Ok(value) => Payload::Data(value),
                Err(e) => {
                    return Envelope::failed(
                        STATUS_UPSTREAM_FAILURE,
                        format!("Failed to serialize response: {e}"),
                    );
                }
            },
            Payload::Message(message) => Payload::Message(message),
        };
        Envelope {
            response,
            error: self.error,
            status: self.status,
        }
    }
}

// --- Serde helpers ---

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.trim().is_empty()))
}

fn none_as_blank<S: Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(value.as_deref().unwrap_or_default())
}

/// Explorer quantities arrive as decimal strings; accept bare numbers too.
mod decimal_u64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(n),
            Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
        }
    }
}
