use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::data::error::ExplorerError;
use crate::data::rate_limit::RateLimiter;
use crate::data::types::{ContractAbi, SortOrder, Transaction};
use crate::utils::parse_hex_u64;

pub const ETHERSCAN_V2_URL: &str = "https://api.etherscan.io/v2/api";

/// Substring the explorer puts in `result` for contracts without published source.
const UNVERIFIED_MARKER: &str = "not verified";

/// One `txlist` page request: a block window plus page/offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxListQuery {
    pub address: String,
    pub chain_id: u64,
    pub start_block: u64,
    pub end_block: u64,
    pub page: u64,
    pub offset: u64,
    pub sort: SortOrder,
}

/// The block-explorer lookups the aggregation layer depends on.
#[async_trait]
pub trait ExplorerApi: Send + Sync {
    /// Current chain head.
    async fn latest_block(&self, chain_id: u64) -> Result<u64, ExplorerError>;

    /// One page of an account's normal transactions.
    async fn transactions(&self, query: &TxListQuery) -> Result<Vec<Transaction>, ExplorerError>;

    /// The verified ABI of a contract; `Ok(None)` when the contract is unverified.
    async fn contract_abi(
        &self,
        chain_id: u64,
        address: &str,
    ) -> Result<Option<ContractAbi>, ExplorerError>;

    /// Raw ERC-20 balance of `holder` in base units, as a decimal string.
    async fn token_balance(
        &self,
        chain_id: u64,
        holder: &str,
        token: &str,
    ) -> Result<String, ExplorerError>;
}

/// The explorer's standard `{status, message, result}` wrapper. Proxy actions
/// answer in JSON-RPC shape instead, so every field is optional.
#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<Value>,
}

impl EtherscanResponse {
    fn api_error(&self) -> ExplorerError {
        let detail = match (&self.error, &self.result) {
            (Some(error), _) => error.to_string(),
            (None, Value::String(s)) => s.clone(),
            (None, other) => other.to_string(),
        };
        ExplorerError::Api {
            message: if self.message.is_empty() {
                "unexpected response".to_string()
            } else {
                self.message.clone()
            },
            detail,
        }
    }
}

/// Etherscan v2 (multichain) client. Every request goes through the shared
/// rate limiter.
pub struct EtherscanClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    limiter: RateLimiter,
}

impl EtherscanClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        limiter: RateLimiter,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            limiter,
        }
    }

    async fn get<T>(&self, chain_id: u64, params: &[(&str, String)]) -> Result<T, ExplorerError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let mut query: Vec<(&str, String)> = Vec::with_capacity(params.len() + 2);
        query.push(("chainid", chain_id.to_string()));
        query.extend(params.iter().cloned());
        query.push(("apikey", self.api_key.clone()));

        let request = self.client.get(&self.base_url).query(&query);
        let outcome = self
            .limiter
            .run(async move {
                let response = request.send().await?.error_for_status()?;
                response.json::<T>().await
            })
            .await?;
        Ok(outcome?)
    }
}

#[async_trait]
impl ExplorerApi for EtherscanClient {
    #[tracing::instrument(skip(self), level = "debug")]
    async fn latest_block(&self, chain_id: u64) -> Result<u64, ExplorerError> {
        let response: EtherscanResponse = self
            .get(
                chain_id,
                &[
                    ("module", "proxy".to_string()),
                    ("action", "eth_blockNumber".to_string()),
                ],
            )
            .await?;

        match response.result.as_str().and_then(parse_hex_u64) {
            Some(number) => Ok(number),
            None if response.error.is_some() || response.status == "0" => {
                Err(response.api_error())
            }
            None => Err(ExplorerError::Malformed(format!(
                "eth_blockNumber result {} is not a hex quantity",
                response.result
            ))),
        }
    }

    #[tracing::instrument(skip(self, query), fields(address = %query.address, start = query.start_block, end = query.end_block), level = "debug")]
    async fn transactions(&self, query: &TxListQuery) -> Result<Vec<Transaction>, ExplorerError> {
        let response: EtherscanResponse = self
            .get(
                query.chain_id,
                &[
                    ("module", "account".to_string()),
                    ("action", "txlist".to_string()),
                    ("address", query.address.clone()),
                    ("startblock", query.start_block.to_string()),
                    ("endblock", query.end_block.to_string()),
                    ("page", query.page.to_string()),
                    ("offset", query.offset.to_string()),
                    ("sort", query.sort.as_str().to_string()),
                ],
            )
            .await?;

        if !response.result.is_array() {
            return Err(response.api_error());
        }
        serde_json::from_value(response.result)
            .map_err(|e| ExplorerError::Malformed(format!("transaction list: {e}")))
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn contract_abi(
        &self,
        chain_id: u64,
        address: &str,
    ) -> Result<Option<ContractAbi>, ExplorerError> {
        let response: EtherscanResponse = self
            .get(
                chain_id,
                &[
                    ("module", "contract".to_string()),
                    ("action", "getabi".to_string()),
                    ("address", address.to_string()),
                ],
            )
            .await?;

        let result = response.result.as_str().unwrap_or_default();
        if response.status == "1" {
            let abi: ContractAbi = serde_json::from_str(result)
                .map_err(|e| ExplorerError::Malformed(format!("ABI JSON for {address}: {e}")))?;
            return Ok(Some(abi));
        }
        if result.contains(UNVERIFIED_MARKER) {
            return Ok(None);
        }
        Err(response.api_error())
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn token_balance(
        &self,
        chain_id: u64,
        holder: &str,
        token: &str,
    ) -> Result<String, ExplorerError> {
        let response: EtherscanResponse = self
            .get(
                chain_id,
                &[
                    ("module", "account".to_string()),
                    ("action", "tokenbalance".to_string()),
                    ("contractaddress", token.to_string()),
                    ("address", holder.to_string()),
                    ("tag", "latest".to_string()),
                ],
            )
            .await?;

        match (response.status.as_str(), response.result.as_str()) {
            ("1", Some(balance)) => Ok(balance.to_string()),
            _ => Err(response.api_error()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const HOLDER: &str = "0xd8da6bf26964af9d7eed9e03e53415d37aa96045";
    const TOKEN: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

    fn client_for(server: &mockito::Server) -> EtherscanClient {
        EtherscanClient::new(
            format!("{}/v2/api", server.url()),
            "test-key",
            RateLimiter::new(100),
            Duration::from_secs(5),
        )
    }

    fn action(name: &str) -> Matcher {
        Matcher::UrlEncoded("action".into(), name.into())
    }

    #[tokio::test]
    async fn test_latest_block() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/api")
            .match_query(Matcher::AllOf(vec![
                action("eth_blockNumber"),
                Matcher::UrlEncoded("chainid".into(), "8453".into()),
                Matcher::UrlEncoded("apikey".into(), "test-key".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":83,"result":"0x1312d00"}"#)
            .create_async()
            .await;

        let head = client_for(&server).latest_block(8453).await.unwrap();

        assert_eq!(head, 20_000_000);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_transactions_page() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!({
            "status": "1",
            "message": "OK",
            "result": [{
                "blockNumber": "100", "timeStamp": "1700000000",
                "hash": "0xaa", "from": HOLDER, "to": TOKEN, "value": "0",
                "input": "0xa9059cbb", "functionName": "transfer(address,uint256)",
                "isError": "0"
            }]
        });
        let mock = server
            .mock("GET", "/v2/api")
            .match_query(Matcher::AllOf(vec![
                action("txlist"),
                Matcher::UrlEncoded("startblock".into(), "5".into()),
                Matcher::UrlEncoded("endblock".into(), "500".into()),
                Matcher::UrlEncoded("offset".into(), "10".into()),
                Matcher::UrlEncoded("sort".into(), "asc".into()),
            ]))
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let query = TxListQuery {
            address: HOLDER.to_string(),
            chain_id: 1,
            start_block: 5,
            end_block: 500,
            page: 1,
            offset: 10,
            sort: SortOrder::Asc,
        };
        let txs = client_for(&server).transactions(&query).await.unwrap();

        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].block_number, 100);
        assert_eq!(txs[0].to.as_deref(), Some(TOKEN));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_no_transactions_is_empty_page() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/api")
            .match_query(action("txlist"))
            .with_status(200)
            .with_body(r#"{"status":"0","message":"No transactions found","result":[]}"#)
            .create_async()
            .await;

        let query = TxListQuery {
            address: HOLDER.to_string(),
            chain_id: 1,
            start_block: 0,
            end_block: 10,
            page: 1,
            offset: 1000,
            sort: SortOrder::Asc,
        };
        let txs = client_for(&server).transactions(&query).await.unwrap();
        assert!(txs.is_empty());
    }

    #[tokio::test]
    async fn test_transactions_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/api")
            .match_query(action("txlist"))
            .with_status(200)
            .with_body(r#"{"status":"0","message":"NOTOK","result":"Max rate limit reached"}"#)
            .create_async()
            .await;

        let query = TxListQuery {
            address: HOLDER.to_string(),
            chain_id: 1,
            start_block: 0,
            end_block: 10,
            page: 1,
            offset: 1000,
            sort: SortOrder::Asc,
        };
        let err = client_for(&server).transactions(&query).await.unwrap_err();
        match err {
            ExplorerError::Api { message, detail } => {
                assert_eq!(message, "NOTOK");
                assert_eq!(detail, "Max rate limit reached");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_http_failure_is_transport_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/api")
            .match_query(action("eth_blockNumber"))
            .with_status(502)
            .create_async()
            .await;

        let err = client_for(&server).latest_block(1).await.unwrap_err();
        assert!(matches!(err, ExplorerError::Transport(_)));
    }

    #[tokio::test]
    async fn test_contract_abi_verified_and_unverified() {
        let mut server = mockito::Server::new_async().await;
        let abi = r#"[{"type":"function","name":"decimals","inputs":[],"outputs":[{"name":"","type":"uint8"}],"stateMutability":"view"}]"#;
        let verified = serde_json::json!({ "status": "1", "message": "OK", "result": abi });
        server
            .mock("GET", "/v2/api")
            .match_query(Matcher::AllOf(vec![
                action("getabi"),
                Matcher::UrlEncoded("address".into(), TOKEN.into()),
            ]))
            .with_status(200)
            .with_body(verified.to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/v2/api")
            .match_query(Matcher::AllOf(vec![
                action("getabi"),
                Matcher::UrlEncoded("address".into(), HOLDER.into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"status":"0","message":"NOTOK","result":"Contract source code not verified"}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let found = client.contract_abi(1, TOKEN).await.unwrap().unwrap();
        assert_eq!(found.parsed().functions().count(), 1);
        assert_eq!(
            serde_json::to_value(&found).unwrap(),
            serde_json::from_str::<Value>(abi).unwrap()
        );
        assert!(client.contract_abi(1, HOLDER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_contract_abi_malformed_json() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/api")
            .match_query(action("getabi"))
            .with_status(200)
            .with_body(r#"{"status":"1","message":"OK","result":"[{not json"}"#)
            .create_async()
            .await;

        let err = client_for(&server).contract_abi(1, TOKEN).await.unwrap_err();
        assert!(matches!(err, ExplorerError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_token_balance() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/api")
            .match_query(Matcher::AllOf(vec![
                action("tokenbalance"),
                Matcher::UrlEncoded("contractaddress".into(), TOKEN.into()),
                Matcher::UrlEncoded("address".into(), HOLDER.into()),
                Matcher::UrlEncoded("tag".into(), "latest".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"status":"1","message":"OK","result":"135499"}"#)
            .create_async()
            .await;

        let balance = client_for(&server).token_balance(1, HOLDER, TOKEN).await.unwrap();
        assert_eq!(balance, "135499");
    }
}
