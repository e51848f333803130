use std::future::Future;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::data::AggregationService;
use crate::data::cache::RequestCache;
use crate::data::error::ValidationError;
use crate::data::types::*;

/// Request types that can reject their own contents.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

macro_rules! validate_with_inherent {
    ($($ty:ty),* $(,)?) => {
        $(impl Validate for $ty {
            fn validate(&self) -> Result<(), ValidationError> {
                <$ty>::validate(self)
            }
        })*
    };
}

validate_with_inherent!(
    TxHistoryRequest,
    TokenBalanceRequest,
    ExtractTokensRequest,
    ContractAbiRequest,
    CallContractRequest,
    NativeBalanceRequest,
    CallFunctionRequest,
);

/// Dispatches named operations: parse and validate the params, then answer
/// from the request cache or run the operation.
pub struct ToolRouter {
    service: AggregationService,
    cache: RequestCache,
}

impl ToolRouter {
    pub fn new(service: AggregationService, cache: RequestCache) -> Self {
        Self { service, cache }
    }

    pub async fn handle(&self, method: &str, params: Value) -> Envelope<Value> {
        let svc = &self.service;
        match method {
            "getTxHistory" => match parse::<TxHistoryRequest>(method, params) {
                Ok(req) => self.cached(method, &req, svc.tx_history(&req)).await,
                Err(rejected) => rejected,
            },
            "getTokenBalance" => match parse::<TokenBalanceRequest>(method, params) {
                Ok(req) => self.cached(method, &req, svc.token_balance(&req)).await,
                Err(rejected) => rejected,
            },
            "buildContractABIMappingAndExtractTokens" => {
                match parse::<ExtractTokensRequest>(method, params) {
                    Ok(req) => self.cached(method, &req, svc.extract_tokens(&req)).await,
                    Err(rejected) => rejected,
                }
            }
            "getContractABI" => match parse::<ContractAbiRequest>(method, params) {
                Ok(req) => self.cached(method, &req, svc.contract_abi(&req)).await,
                Err(rejected) => rejected,
            },
            "callContract" => match parse::<CallContractRequest>(method, params) {
                Ok(req) => self.cached(method, &req, svc.call_contract(&req)).await,
                Err(rejected) => rejected,
            },
            "getNativeGasBalance" => match parse::<NativeBalanceRequest>(method, params) {
                Ok(req) => self.cached(method, &req, svc.native_balance(&req)).await,
                Err(rejected) => rejected,
            },
            "callBlockchain" => match parse::<CallFunctionRequest>(method, params) {
                Ok(req) => self.cached(method, &req, svc.call_blockchain(&req)).await,
                Err(rejected) => rejected,
            },
            "listBlockchains" => {
                self.cached(method, &Value::Object(Default::default()), async {
                    svc.list_blockchains()
                })
                .await
            }
            _ => {
                warn!(method, "Unknown method.");
                Envelope::failed(STATUS_NOT_FOUND, format!("Unknown method: {method}"))
            }
        }
    }

    /// Key the cache on the parsed request so omitted defaults and explicit
    /// defaults share an entry.
    async fn cached<R, T, F>(&self, method: &str, request: &R, operation: F) -> Envelope<Value>
    where
        R: Serialize,
        T: Serialize,
        F: Future<Output = Envelope<T>>,
    {
        let key = match serde_json::to_value(request) {
            Ok(key) => key,
            Err(e) => {
                return Envelope::failed(
                    STATUS_UPSTREAM_FAILURE,
                    format!("Failed to serialize request: {e}"),
                );
            }
        };
        self.cache
            .process(method, &key, async { operation.await.into_value() })
            .await
    }
}

fn parse<R>(method: &str, params: Value) -> Result<R, Envelope<Value>>
where
    R: DeserializeOwned + Validate,
{
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params
    };
    let request: R = serde_json::from_value(params)
        .map_err(|e| reject(method, ValidationError::Params(e.to_string())))?;
    request.validate().map_err(|e| reject(method, e))?;
    Ok(request)
}

fn reject(method: &str, e: ValidationError) -> Envelope<Value> {
    warn!(method, error = %e, "Rejected request.");
    Envelope::failed(STATUS_BAD_REQUEST, e.to_string())
}
