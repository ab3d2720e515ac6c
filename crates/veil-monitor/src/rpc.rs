//! zcashd JSON-RPC client.
//!
//! Speaks JSON-RPC 1.0 over HTTP with basic auth. Only the shielded wallet
//! calls the monitor needs are wrapped.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use veil_core::{ShieldedAddress, TxHash, Zatoshis};

use crate::chain::{ChainClient, IncomingTransaction, ShieldedAccount};
use crate::error::{MonitorError, Result};

const RPC_ID: &str = "veil-rpc";

/// Connection settings for a zcashd node.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Node endpoint, e.g. `http://127.0.0.1:8232`.
    pub url: String,
    pub username: String,
    pub password: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8232".to_string(),
            username: String::new(),
            password: String::new(),
            timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// One entry of `z_listreceivedbyaddress`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedNote {
    pub txid: String,
    /// Decimal ZEC, kept for nodes that do not report `amountZat`.
    pub amount: f64,
    #[serde(default)]
    pub amount_zat: Option<u64>,
    #[serde(default)]
    pub confirmations: i64,
    /// Hex-encoded memo field.
    #[serde(default)]
    pub memo: String,
    #[serde(default)]
    pub change: bool,
}

/// JSON-RPC client for a zcashd wallet.
pub struct ZcashRpcClient {
    http: reqwest::Client,
    config: RpcConfig,
}

impl ZcashRpcClient {
    /// Build a client. Fails only if the HTTP stack cannot be initialized.
    pub fn new(config: RpcConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MonitorError::Connection(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// Invoke `method` and deserialize its result.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let body = json!({
            "jsonrpc": "1.0",
            "id": RPC_ID,
            "method": method,
            "params": params,
        });

        debug!(method, "rpc call");
        let response = self
            .http
            .post(&self.config.url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        // zcashd reports RPC errors with a 500 status and a JSON body, so the
        // body is read before looking at the status.
        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_transport(e))?;
        let parsed: RpcResponse<T> = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(e) if status.is_success() => {
                return Err(MonitorError::InvalidResponse(e.to_string()))
            }
            Err(_) => return Err(MonitorError::Connection(format!("HTTP error: {}", status))),
        };

        if let Some(err) = parsed.error {
            return Err(MonitorError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        parsed
            .result
            .ok_or_else(|| MonitorError::InvalidResponse(format!("{} returned no result", method)))
    }

    fn map_transport(&self, e: reqwest::Error) -> MonitorError {
        if e.is_timeout() {
            MonitorError::Timeout(self.config.timeout)
        } else {
            MonitorError::Connection(e.to_string())
        }
    }
}

#[async_trait]
impl ChainClient for ZcashRpcClient {
    async fn new_shielded_address(&self) -> Result<ShieldedAccount> {
        let address: String = self.call("z_getnewaddress", json!([])).await?;
        let viewing_key = match self
            .call::<String>("z_exportviewingkey", json!([address]))
            .await
        {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, "viewing key export failed");
                None
            }
        };
        Ok(ShieldedAccount {
            address: ShieldedAddress::from(address),
            viewing_key,
        })
    }

    async fn list_incoming_transactions(
        &self,
        address: &ShieldedAddress,
    ) -> Result<Vec<IncomingTransaction>> {
        let notes: Vec<ReceivedNote> = self
            .call("z_listreceivedbyaddress", json!([address.as_str()]))
            .await?;
        parse_received(notes)
    }
}

/// Memo byte zcashd uses for "no memo"; the rest of the field is zero.
const NO_MEMO: u8 = 0xf6;

fn is_blank_memo(memo: &[u8]) -> bool {
    match memo.split_first() {
        None => true,
        Some((&first, rest)) => (first == NO_MEMO || first == 0) && rest.iter().all(|&b| b == 0),
    }
}

/// Convert raw notes into incoming transactions, one per txid.
///
/// A transaction may pay the address in several notes. Their amounts are
/// summed, the lowest confirmation count wins, and the first memo that
/// carries data is used. Change outputs are dropped. A memo that is not
/// valid hex is treated as empty so the payment is still recorded and
/// rejected.
pub fn parse_received(notes: Vec<ReceivedNote>) -> Result<Vec<IncomingTransaction>> {
    let mut out: Vec<IncomingTransaction> = Vec::with_capacity(notes.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for note in notes {
        if note.change {
            continue;
        }
        let amount = match note.amount_zat {
            Some(zat) => Zatoshis::new(zat),
            None => Zatoshis::from_zec_f64(note.amount)
                .map_err(|e| MonitorError::InvalidResponse(e.to_string()))?,
        };
        let raw_memo = match hex::decode(&note.memo) {
            Ok(bytes) => Bytes::from(bytes),
            Err(_) => {
                warn!(txid = %note.txid, "memo is not hex");
                Bytes::new()
            }
        };
        let confirmations = u32::try_from(note.confirmations.max(0)).unwrap_or(u32::MAX);

        match index.get(&note.txid) {
            Some(&i) => {
                let tx = &mut out[i];
                tx.amount = tx.amount.checked_add(amount).ok_or_else(|| {
                    MonitorError::InvalidResponse(format!("amount overflow in {}", note.txid))
                })?;
                tx.confirmations = tx.confirmations.min(confirmations);
                if is_blank_memo(&tx.raw_memo) && !is_blank_memo(&raw_memo) {
                    tx.raw_memo = raw_memo;
                }
            }
            None => {
                index.insert(note.txid.clone(), out.len());
                out.push(IncomingTransaction {
                    tx_hash: TxHash::from(note.txid),
                    amount,
                    confirmations,
                    raw_memo,
                });
            }
        }
    }
    Ok(out)
}
