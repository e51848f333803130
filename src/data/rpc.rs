use std::time::Duration;

use alloy::dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt, Specifier};
use alloy::json_abi::Function;
use alloy::primitives::hex;
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use crate::data::balance::DEFAULT_DECIMALS;
use crate::data::chains::{endpoint_for_chain, endpoint_host, is_mapped};
use crate::data::decoder::format_sol_value;
use crate::data::error::RpcError;
use crate::data::types::{CallFunctionRequest, FunctionCallResponse};

pub const DEFAULT_URL_TEMPLATE: &str = "https://{host}.infura.io/v3/";

sol! {
    #[allow(missing_docs)]
    function decimals() external view returns (uint8);
}

/// Where a call is routed: by chain id (unknown ids take the primary
/// network) or by an explicit network/environment pair (unknown pairs fail).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcTarget {
    Chain(u64),
    Network { network: String, env: String },
}

/// `eth_call` transaction object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallParams {
    pub to: String,
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<String>,
}

impl CallParams {
    pub fn new(to: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            data: data.into(),
            ..Default::default()
        }
    }
}

/// Read-only calls against a JSON-RPC gateway.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ContractCaller: Send + Sync {
    /// `eth_call`; returns the raw hex return data.
    async fn eth_call(
        &self,
        target: &RpcTarget,
        call: &CallParams,
        block_tag: &str,
    ) -> Result<String, RpcError>;

    /// `eth_getBalance`; returns the hex wei quantity.
    async fn get_balance(
        &self,
        target: &RpcTarget,
        address: &str,
        block_tag: &str,
    ) -> Result<String, RpcError>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Posts JSON-RPC requests to `{template with host}{api key}`, with the
/// project secret as basic auth on every network.
pub struct RpcDispatcher {
    client: reqwest::Client,
    url_template: String,
    api_key: String,
    api_secret: Option<String>,
}

impl RpcDispatcher {
    pub fn new(
        url_template: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            url_template: url_template.into(),
            api_key: api_key.into(),
            api_secret,
        }
    }

    fn url_for(&self, target: &RpcTarget) -> Result<String, RpcError> {
        let host = match target {
            RpcTarget::Chain(chain_id) => {
                let endpoint = endpoint_for_chain(*chain_id);
                if !is_mapped(*chain_id) {
                    warn!(
                        chain_id,
                        network = endpoint.network,
                        env = endpoint.env,
                        "Unmapped chain id; using the primary network."
                    );
                }
                endpoint.host
            }
            RpcTarget::Network { network, env } => endpoint_host(network, env)?,
        };
        Ok(format!("{}{}", self.url_template.replace("{host}", host), self.api_key))
    }

    async fn request(&self, target: &RpcTarget, method: &str, params: Value) -> Result<String, RpcError> {
        let url = self.url_for(target)?;
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(secret) = &self.api_secret {
            request = request.basic_auth("", Some(secret));
        }
        let response: RpcResponse = request.send().await?.error_for_status()?.json().await?;

        if let Some(error) = response.error {
            return Err(RpcError::Upstream {
                code: error.code,
                message: error.message,
            });
        }
        match response.result {
            Some(Value::String(result)) => Ok(result),
            _ => Err(RpcError::EmptyResult),
        }
    }
}

#[async_trait]
impl ContractCaller for RpcDispatcher {
    #[tracing::instrument(skip(self, call), fields(to = %call.to), level = "debug")]
    async fn eth_call(
        &self,
        target: &RpcTarget,
        call: &CallParams,
        block_tag: &str,
    ) -> Result<String, RpcError> {
        self.request(target, "eth_call", json!([call, block_tag])).await
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn get_balance(
        &self,
        target: &RpcTarget,
        address: &str,
        block_tag: &str,
    ) -> Result<String, RpcError> {
        self.request(target, "eth_getBalance", json!([address, block_tag])).await
    }
}

/// ERC-20 `decimals()` of `token`, or 18 when the call fails or returns
/// nothing usable.
pub async fn token_decimals(caller: &dyn ContractCaller, chain_id: u64, token: &str) -> u8 {
    let data = format!("0x{}", hex::encode(decimalsCall {}.abi_encode()));
    let call = CallParams::new(token, data);
    let raw = match caller.eth_call(&RpcTarget::Chain(chain_id), &call, "latest").await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(token, error = %e, "decimals() call failed; assuming {DEFAULT_DECIMALS}.");
            return DEFAULT_DECIMALS;
        }
    };
    match parse_decimals(&raw) {
        Some(decimals) => decimals,
        None => {
            warn!(token, raw = %raw, "decimals() returned no value; assuming {DEFAULT_DECIMALS}.");
            DEFAULT_DECIMALS
        }
    }
}

fn parse_decimals(raw: &str) -> Option<u8> {
    let bytes = hex::decode(raw.trim()).ok()?;
    if bytes.is_empty() {
        return None;
    }
    decimalsCall::abi_decode_returns(&bytes, true).ok().map(|r| r._0)
}

/// Parse a human-readable signature such as
/// `balanceOf(address owner) view returns (uint256)`.
pub fn parse_signature(signature: &str) -> Result<Function, RpcError> {
    let signature = signature.trim();
    let full = if signature.starts_with("function ") {
        signature.to_string()
    } else {
        format!("function {signature}")
    };
    Function::parse(&full).map_err(|e| RpcError::Abi(format!("{signature}: {e}")))
}

/// Coerce JSON arguments into the function's input types. Each argument is
/// rendered as a Solidity literal (arrays as `[a, b]`) and parsed against its type.
pub fn coerce_arguments(func: &Function, params: &[Value]) -> Result<Vec<DynSolValue>, RpcError> {
    if func.inputs.len() != params.len() {
        return Err(RpcError::Abi(format!(
            "{} expects {} arguments, got {}",
            func.name,
            func.inputs.len(),
            params.len()
        )));
    }
    func.inputs
        .iter()
        .zip(params)
        .map(|(input, value)| {
            let ty = input.resolve().map_err(|e| RpcError::Abi(e.to_string()))?;
            ty.coerce_str(&literal(value))
                .map_err(|e| RpcError::Abi(format!("argument {}: {e}", input.name)))
        })
        .collect()
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(literal).collect();
            format!("[{}]", inner.join(", "))
        }
        other => other.to_string(),
    }
}

/// Encode a call from a human-readable signature, send it to the named
/// network, and decode the return data against the declared outputs.
pub async fn call_function(
    caller: &dyn ContractCaller,
    request: &CallFunctionRequest,
) -> Result<FunctionCallResponse, RpcError> {
    let func = parse_signature(&request.function_signature)?;
    let args = coerce_arguments(&func, &request.params)?;
    let input = func
        .abi_encode_input(&args)
        .map_err(|e| RpcError::Abi(e.to_string()))?;

    let target = RpcTarget::Network {
        network: request.network.clone(),
        env: request.network_env.clone(),
    };
    let call = CallParams::new(&request.address, format!("0x{}", hex::encode(input)));
    let result = caller.eth_call(&target, &call, "latest").await?;

    let decoded = if func.outputs.is_empty() {
        Vec::new()
    } else {
        let bytes = hex::decode(result.trim()).map_err(|e| RpcError::Abi(e.to_string()))?;
        func.abi_decode_output(&bytes, false)
            .map_err(|e| RpcError::Abi(e.to_string()))?
            .iter()
            .map(format_sol_value)
            .collect()
    };
    Ok(FunctionCallResponse { result, decoded })
}
