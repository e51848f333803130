mod config;
mod data;
mod utils;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Command, Config};
use crate::data::AggregationService;
use crate::data::cache::RequestCache;
use crate::data::explorer::EtherscanClient;
use crate::data::rate_limit::RateLimiter;
use crate::data::router::ToolRouter;
use crate::data::rpc::RpcDispatcher;
use crate::data::types::{Envelope, STATUS_BAD_REQUEST};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    let config = Config::parse();
    init_tracing(&config.log_level)?;

    let router = build_router(&config);
    let envelope = match config.command {
        Command::History {
            address,
            chain_id,
            offset,
            start_block,
            end_block,
            sort,
        } => {
            let params = json!({
                "address": address,
                "chainId": chain_id,
                "offset": offset,
                "startBlock": start_block,
                "endBlock": end_block,
                "sort": sort,
            });
            router.handle("getTxHistory", params).await
        }
        Command::TokenBalance {
            address,
            token_address,
            chain_id,
        } => {
            let params = json!({
                "address": address,
                "tokenAddress": token_address,
                "chainId": chain_id,
            });
            router.handle("getTokenBalance", params).await
        }
        Command::ExtractTokens { file, chain_id } => {
            let raw = match file {
                Some(path) => tokio::fs::read_to_string(&path)
                    .await
                    .wrap_err_with(|| format!("Failed to read {}", path.display()))?,
                None => {
                    let mut raw = String::new();
                    tokio::io::stdin().read_to_string(&mut raw).await?;
                    raw
                }
            };
            let txs: Value = serde_json::from_str(&raw).wrap_err("Transactions are not valid JSON")?;
            // Accept a bare array or a saved `getTxHistory` response.
            let txs = match txs {
                Value::Object(mut body) if body.contains_key("txHistory") => body
                    .remove("txHistory")
                    .unwrap_or_default(),
                other => other,
            };
            let params = json!({ "txs": txs, "chainId": chain_id });
            router
                .handle("buildContractABIMappingAndExtractTokens", params)
                .await
        }
        Command::Invoke { method, params } => {
            let params: Value = serde_json::from_str(&params).wrap_err("Params are not valid JSON")?;
            router.handle(&method, params).await
        }
        Command::Networks => router.handle("listBlockchains", Value::Null).await,
        Command::Serve => {
            serve(&router).await?;
            return Ok(ExitCode::SUCCESS);
        }
    };

    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(if envelope.is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level)
            .wrap_err_with(|| format!("Invalid log level: {log_level}"))?,
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
    Ok(())
}

fn build_router(config: &Config) -> ToolRouter {
    if config.etherscan_api_key.is_empty() {
        warn!("ETHERSCAN_API_KEY is not set; explorer requests will be rejected upstream.");
    }
    if config.rpc_api_key.is_empty() {
        warn!("RPC_API_KEY is not set; gateway requests will be rejected upstream.");
    }

    let limiter = RateLimiter::new(config.etherscan_rate_limit);
    let spacing_ms = limiter.interval().as_millis() as u64;
    let explorer = EtherscanClient::new(
        config.etherscan_api_url.clone(),
        config.etherscan_api_key.clone(),
        limiter,
        config.http_timeout(),
    );
    let rpc = RpcDispatcher::new(
        config.rpc_url_template.clone(),
        config.rpc_api_key.clone(),
        config.rpc_api_secret.clone(),
        config.http_timeout(),
    );
    let cache = RequestCache::new(config.cache_capacity, config.cache_ttl(), config.cache_failures);

    info!(
        explorer = %config.etherscan_api_url,
        rate_limit = config.etherscan_rate_limit,
        spacing_ms,
        cache_capacity = config.cache_capacity,
        cache_ttl_secs = ?config.cache_ttl_secs,
        "Aggregation service ready."
    );
    ToolRouter::new(AggregationService::new(Arc::new(explorer), Arc::new(rpc)), cache)
}

#[derive(Debug, Deserialize)]
struct ServeRequest {
    method: String,
    #[serde(default)]
    params: Value,
}

/// One request per stdin line, one envelope per stdout line, until EOF.
async fn serve(router: &ToolRouter) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    info!("Serving requests from stdin.");

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let envelope = match serde_json::from_str::<ServeRequest>(&line) {
            Ok(request) => router.handle(&request.method, request.params).await,
            Err(e) => Envelope::failed(STATUS_BAD_REQUEST, format!("Invalid request: {e}")),
        };
        let mut out = serde_json::to_vec(&envelope)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }
    info!("Input closed; shutting down.");
    Ok(())
}
