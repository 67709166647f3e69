use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use crate::config::SourceConfig;
use crate::error::SourceError;
use crate::logging::{LogContext, MetricsLogger, PerformanceMonitor};
use crate::models::{normalize_address, AddressInfo, Transaction};
use crate::source::TransactionSource;

const TRANSFER_CATEGORIES: [&str; 3] = ["external", "erc20", "internal"];

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Vec<Value>,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Debug, Deserialize)]
struct AssetTransfersResult {
    #[serde(default)]
    transfers: Vec<AssetTransfer>,
}

/// One record of an `alchemy_getAssetTransfers` response
#[derive(Debug, Deserialize)]
pub struct AssetTransfer {
    #[serde(rename = "blockNum")]
    pub block_num: String,
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub value: Option<f64>,
    pub asset: Option<String>,
    #[serde(default)]
    pub metadata: Option<TransferMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct TransferMetadata {
    #[serde(rename = "blockTimestamp")]
    pub block_timestamp: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    From,
    To,
}

impl Direction {
    fn param(self) -> &'static str {
        match self {
            Direction::From => "fromAddress",
            Direction::To => "toAddress",
        }
    }
}

/// Address history from an Alchemy-compatible JSON-RPC endpoint
#[derive(Clone)]
pub struct RpcSource {
    client: Client,
    endpoint: String,
    max_transfers: u32,
    detect_contracts: bool,
}

impl RpcSource {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let endpoint = config.request_url();

        LogContext::new("rpc_source", "initialization")
            .with_metadata("endpoint", json!(config.endpoint))
            .with_metadata("timeout_seconds", json!(config.timeout_seconds))
            .info("Initializing RPC source");

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SourceError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            max_transfers: config.max_transfers,
            detect_contracts: config.detect_contracts,
        })
    }

    async fn make_request(&self, method: &str, params: Vec<Value>) -> Result<Value, SourceError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: 1,
        };

        LogContext::new("rpc_source", "make_request")
            .with_metadata("method", json!(method))
            .trace(&format!("Sending RPC request: {}", method));

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SourceError::Unavailable(format!("Request timed out: {}", e))
                } else {
                    SourceError::from(e)
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let seconds = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok())
                .unwrap_or(60);
            return Err(SourceError::RateLimited { seconds });
        }
        if !status.is_success() {
            return Err(SourceError::Unavailable(format!(
                "HTTP error: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let rpc_response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;

        if let Some(error) = rpc_response.error {
            return Err(match error.code {
                // limit exceeded
                -32005 | 429 => SourceError::RateLimited { seconds: 60 },
                -32603 => SourceError::Unavailable(error.message),
                _ => SourceError::InvalidResponse(format!(
                    "Code: {}, Message: {}",
                    error.code, error.message
                )),
            });
        }

        rpc_response
            .result
            .ok_or_else(|| SourceError::InvalidResponse("No result in response".to_string()))
    }

    async fn asset_transfers(
        &self,
        address: &str,
        direction: Direction,
    ) -> Result<Vec<AssetTransfer>, SourceError> {
        let mut filter = json!({
            "fromBlock": "0x0",
            "toBlock": "latest",
            "category": TRANSFER_CATEGORIES,
            "withMetadata": true,
            "excludeZeroValue": true,
            "maxCount": format!("0x{:x}", self.max_transfers),
            "order": "desc",
        });
        filter[direction.param()] = json!(address);

        let monitor = PerformanceMonitor::new("rpc_get_asset_transfers")
            .with_metadata("address", json!(address))
            .with_metadata("direction", json!(direction.param()));
        let result = self.make_request("alchemy_getAssetTransfers", vec![filter]).await;
        let duration = monitor.finish_with_result(&result);
        MetricsLogger::log_source_call("alchemy_getAssetTransfers", duration, result.is_ok());

        let parsed: AssetTransfersResult = serde_json::from_value(result?)
            .map_err(|e| SourceError::InvalidResponse(format!("Malformed transfer list: {}", e)))?;
        Ok(parsed.transfers)
    }

    /// Whether `address` has deployed code
    pub async fn is_contract(&self, address: &str) -> Result<bool, SourceError> {
        let monitor = PerformanceMonitor::new("rpc_get_code").with_metadata("address", json!(address));
        let result = self
            .make_request("eth_getCode", vec![json!(address), json!("latest")])
            .await;
        let duration = monitor.finish_with_result(&result);
        MetricsLogger::log_source_call("eth_getCode", duration, result.is_ok());

        let code = result?;
        let code = code
            .as_str()
            .ok_or_else(|| SourceError::InvalidResponse("Code is not a string".to_string()))?;
        Ok(!matches!(code, "" | "0x" | "0x0"))
    }
}

/// Parse a `0x`-prefixed hex quantity
pub fn parse_hex_u64(value: &str) -> Result<u64, SourceError> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u64::from_str_radix(digits, 16)
        .map_err(|e| SourceError::InvalidResponse(format!("Failed to parse hex '{}': {}", value, e)))
}

fn parse_timestamp(metadata: &Option<TransferMetadata>) -> Option<i64> {
    let raw = metadata.as_ref()?.block_timestamp.as_deref()?;
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.timestamp())
        .ok()
}

/// Convert raw transfer records into transactions, collapsing records that
/// share `(hash, from, to)`. Contract creations without a recipient are dropped.
pub fn normalize_transfers(transfers: Vec<AssetTransfer>) -> Result<Vec<Transaction>, SourceError> {
    let mut seen = BTreeSet::new();
    let mut transactions = Vec::new();

    for transfer in transfers {
        let Some(to) = transfer.to.as_deref() else {
            continue;
        };
        let from = normalize_address(&transfer.from);
        let to = normalize_address(to);
        let hash = transfer.hash.to_lowercase();

        if !seen.insert((hash.clone(), from.clone(), to.clone())) {
            continue;
        }

        let block_height = parse_hex_u64(&transfer.block_num)?;
        let mut tx = Transaction::transfer(&hash, block_height, &from, &to, transfer.value.unwrap_or(0.0));
        if let Some(asset) = transfer.asset.as_deref() {
            tx = tx.with_asset(asset);
        }
        if let Some(timestamp) = parse_timestamp(&transfer.metadata) {
            tx = tx.with_timestamp(timestamp);
        }
        transactions.push(tx);
    }

    Ok(transactions)
}

#[async_trait]
impl TransactionSource for RpcSource {
    async fn fetch_transactions(&self, address: &str) -> Result<Vec<Transaction>, SourceError> {
        let address = normalize_address(address);
        let context = LogContext::new("rpc_source", "fetch_transactions").with_address(&address);

        let mut transfers = self.asset_transfers(&address, Direction::From).await?;
        transfers.extend(self.asset_transfers(&address, Direction::To).await?);

        let transactions = normalize_transfers(transfers)?;
        if transactions.is_empty() {
            return Err(SourceError::NotFound(address));
        }

        context
            .with_metadata("transactions", json!(transactions.len()))
            .debug(&format!("Fetched {} transfers", transactions.len()));
        Ok(transactions)
    }

    async fn lookup_labels(
        &self,
        addresses: &[String],
    ) -> Result<HashMap<String, AddressInfo>, SourceError> {
        let mut info = HashMap::new();
        if !self.detect_contracts {
            return Ok(info);
        }

        for address in addresses {
            let address = normalize_address(address);
            // one failed lookup leaves that address unknown, not the batch
            match self.is_contract(&address).await {
                Ok(true) => {
                    info.insert(
                        address,
                        AddressInfo {
                            label: None,
                            is_contract: true,
                        },
                    );
                }
                Ok(false) => {}
                Err(e) => LogContext::new("rpc_source", "lookup_labels")
                    .with_address(&address)
                    .warn(&format!("Contract check failed: {}", e)),
            }
        }
        Ok(info)
    }

    fn name(&self) -> &str {
        "rpc"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(hash: &str, from: &str, to: Option<&str>, value: Option<f64>) -> AssetTransfer {
        AssetTransfer {
            block_num: "0x10".to_string(),
            hash: hash.to_string(),
            from: from.to_string(),
            to: to.map(str::to_string),
            value,
            asset: Some("ETH".to_string()),
            metadata: Some(TransferMetadata {
                block_timestamp: Some("2021-09-01T12:00:00.000Z".to_string()),
            }),
        }
    }

    #[test]
    fn test_parse_hex_u64() {
        assert_eq!(parse_hex_u64("0x10").unwrap(), 16);
        assert_eq!(parse_hex_u64("0X1f").unwrap(), 31);
        assert_eq!(parse_hex_u64("ff").unwrap(), 255);
        assert!(matches!(parse_hex_u64("0xzz"), Err(SourceError::InvalidResponse(_))));
    }

    #[test]
    fn test_normalize_transfers_dedups_and_lowercases() {
        let transactions = normalize_transfers(vec![
            transfer("0xAB", "0xA1", Some("0xB2"), Some(1.5)),
            transfer("0xab", "0xa1", Some("0xb2"), Some(1.5)),
            transfer("0xab", "0xa1", Some("0xc3"), None),
            transfer("0xcd", "0xa1", None, Some(9.0)),
        ])
        .unwrap();

        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].hash, "0xab");
        assert_eq!(transactions[0].inputs[0].address, "0xa1");
        assert_eq!(transactions[0].block_height, 16);
        assert_eq!(transactions[0].asset.as_deref(), Some("ETH"));
        assert_eq!(transactions[0].timestamp, Some(1_630_497_600));
        assert_eq!(transactions[1].outputs[0].value, 0.0);
    }

    #[test]
    fn test_transfer_deserialization() {
        let raw = json!({
            "blockNum": "0xc5bd53",
            "hash": "0x1",
            "from": "0xa",
            "to": "0xb",
            "value": null,
            "asset": null,
            "category": "erc20",
            "metadata": { "blockTimestamp": "2021-09-01T12:00:00.000Z" }
        });
        let parsed: AssetTransfer = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.value, None);
        assert_eq!(parsed.asset, None);
        assert_eq!(parse_hex_u64(&parsed.block_num).unwrap(), 12_959_059);
    }

    #[test]
    fn test_new_builds_request_url() {
        let config = SourceConfig {
            endpoint: "http://localhost:8545".to_string(),
            api_key: Some("demo".to_string()),
            ..SourceConfig::default()
        };
        let source = RpcSource::new(&config).unwrap();
        assert_eq!(source.endpoint, "http://localhost:8545/demo");
        assert_eq!(source.name(), "rpc");
    }
}
