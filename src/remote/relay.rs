//! Relay gateway client
//!
//! The relay gateway holds the relay identity's signing key and exposes
//! contract reads and writes over a small JSON API. Every response is an
//! envelope: `{"result": ...}` on success, `{"error": "..."}` on failure.
//!
//! Failures are mapped onto the pass error taxonomy here: reads become
//! `RemoteRead`, approvals `AllowanceGrant`, swaps `SwapRejected`.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::types::{Address, AllowanceGrant, ReserveStatus, SwapInstruction, SwapKind, TxReceipt};
use super::{PoolWriter, PriceSource, ReserveReader, TokenReader, TokenWriter};
use crate::band::Wad;
use crate::config::{ContractsConfig, RelayConfig};
use crate::error::{Error, Result};

/// Header carrying the relay API key
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: Option<T>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AmountResponse {
    amount: Wad,
}

#[derive(Debug, Deserialize)]
struct BpsResponse {
    bps: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolIdResponse {
    pool_id: String,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    price: Wad,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApproveRequest<'a> {
    owner: &'a Address,
    spender: &'a Address,
    amount: Wad,
}

/// HTTP client for the relay gateway
pub struct RelayClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    reserve: Address,
    pool: Address,
}

impl RelayClient {
    /// Create a new relay client
    pub fn new(relay: &RelayConfig, contracts: &ContractsConfig) -> Result<Self> {
        url::Url::parse(&relay.endpoint)
            .map_err(|e| Error::Config(format!("Invalid relay endpoint: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_millis(relay.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        info!("Relay client initialized for {}", relay.endpoint);

        Ok(Self {
            client,
            endpoint: relay.endpoint.trim_end_matches('/').to_string(),
            api_key: if relay.api_key.is_empty() {
                None
            } else {
                Some(relay.api_key.clone())
            },
            reserve: contracts.reserve.clone(),
            pool: contracts.pool.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    fn with_key(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header(API_KEY_HEADER, key),
            None => req,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> std::result::Result<T, String> {
        debug!("GET {}", path);
        let response = self
            .with_key(self.client.get(self.url(path)))
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))?;
        Self::unwrap_envelope(response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> std::result::Result<T, String> {
        debug!("POST {}", path);
        let response = self
            .with_key(self.client.post(self.url(path)))
            .json(body)
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))?;
        Self::unwrap_envelope(response).await
    }

    async fn unwrap_envelope<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> std::result::Result<T, String> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| format!("Failed to read response: {}", e))?;

        parse_envelope(status.as_u16(), &text)
    }

    /// Ping the gateway, returning round-trip latency
    pub async fn health_check(&self) -> Result<Duration> {
        let start = Instant::now();
        let response = self
            .with_key(self.client.get(self.url("v1/health")))
            .send()
            .await
            .map_err(|e| Error::RemoteRead(format!("Health check failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::RemoteRead(format!(
                "Health check returned HTTP {}",
                response.status()
            )));
        }

        Ok(start.elapsed())
    }

    async fn submit_swap(&self, instruction: &SwapInstruction, expected: SwapKind) -> Result<TxReceipt> {
        if instruction.kind != expected {
            return Err(Error::SwapRejected(format!(
                "instruction kind {:?} submitted as {:?}",
                instruction.kind, expected
            )));
        }

        let receipt: TxReceipt = self
            .post("v1/vault/swap", instruction)
            .await
            .map_err(Error::SwapRejected)?;

        info!("Swap submitted: {}", receipt.tx_hash);
        Ok(receipt)
    }
}

/// Decode a relay response body. Gateway errors win over HTTP status.
fn parse_envelope<T: DeserializeOwned>(status: u16, body: &str) -> std::result::Result<T, String> {
    let envelope: Envelope<T> = match serde_json::from_str(body) {
        Ok(e) => e,
        Err(e) if (200..300).contains(&status) => {
            return Err(format!("Failed to parse response: {}", e));
        }
        Err(_) => return Err(format!("HTTP {}", status)),
    };

    if let Some(error) = envelope.error {
        return Err(error);
    }
    if !(200..300).contains(&status) {
        return Err(format!("HTTP {}", status));
    }

    envelope
        .result
        .ok_or_else(|| "Response contained neither result nor error".to_string())
}

#[async_trait]
impl ReserveReader for RelayClient {
    async fn reserve_status(&self) -> Result<ReserveStatus> {
        self.get(&format!("v1/reserves/{}/status", self.reserve))
            .await
            .map_err(|e| Error::RemoteRead(format!("reserve status: {}", e)))
    }

    async fn ceiling_multiplier_bps(&self) -> Result<u32> {
        let r: BpsResponse = self
            .get(&format!("v1/reserves/{}/ceiling-multiplier", self.reserve))
            .await
            .map_err(|e| Error::RemoteRead(format!("ceiling multiplier: {}", e)))?;
        Ok(r.bps)
    }
}

#[async_trait]
impl TokenReader for RelayClient {
    async fn total_supply(&self, token: &Address) -> Result<Wad> {
        let r: AmountResponse = self
            .get(&format!("v1/tokens/{}/supply", token))
            .await
            .map_err(|e| Error::RemoteRead(format!("total supply of {}: {}", token, e)))?;
        Ok(r.amount)
    }

    async fn balance_of(&self, token: &Address, owner: &Address) -> Result<Wad> {
        let r: AmountResponse = self
            .get(&format!("v1/tokens/{}/balances/{}", token, owner))
            .await
            .map_err(|e| Error::RemoteRead(format!("balance of {} in {}: {}", owner, token, e)))?;
        Ok(r.amount)
    }
}

#[async_trait]
impl TokenWriter for RelayClient {
    async fn approve(&self, grant: &AllowanceGrant) -> Result<TxReceipt> {
        let body = ApproveRequest {
            owner: &grant.owner,
            spender: &grant.spender,
            amount: grant.amount,
        };

        self.post(&format!("v1/tokens/{}/approve", grant.asset), &body)
            .await
            .map_err(|reason| Error::AllowanceGrant {
                spender: grant.spender.to_string(),
                reason,
            })
    }
}

#[async_trait]
impl PoolWriter for RelayClient {
    async fn pool_id(&self, pool: &Address) -> Result<String> {
        let r: PoolIdResponse = self
            .get(&format!("v1/pools/{}/id", pool))
            .await
            .map_err(|e| Error::RemoteRead(format!("pool id of {}: {}", pool, e)))?;
        Ok(r.pool_id)
    }

    async fn swap_exact_output(&self, instruction: &SwapInstruction) -> Result<TxReceipt> {
        self.submit_swap(instruction, SwapKind::ExactOutput).await
    }

    async fn swap_exact_input(&self, instruction: &SwapInstruction) -> Result<TxReceipt> {
        self.submit_swap(instruction, SwapKind::ExactInput).await
    }
}

#[async_trait]
impl PriceSource for RelayClient {
    async fn spot_price(&self) -> Result<Wad> {
        let r: PriceResponse = self
            .get(&format!("v1/pools/{}/price", self.pool))
            .await
            .map_err(|e| Error::RemoteRead(format!("spot price: {}", e)))?;
        Ok(r.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contracts() -> ContractsConfig {
        crate::config::tests::test_contracts()
    }

    #[test]
    fn test_envelope_result() {
        let r: AmountResponse =
            parse_envelope(200, r#"{"result":{"amount":"2000000"}}"#).unwrap();
        assert_eq!(r.amount, Wad::from_units(2_000_000));
    }

    #[test]
    fn test_envelope_error_wins() {
        let r = parse_envelope::<AmountResponse>(400, r#"{"error":"BAL#507 swap limit"}"#);
        assert_eq!(r.unwrap_err(), "BAL#507 swap limit");

        let r = parse_envelope::<AmountResponse>(200, r#"{"error":"reverted"}"#);
        assert_eq!(r.unwrap_err(), "reverted");
    }

    #[test]
    fn test_envelope_non_json_failure() {
        let r = parse_envelope::<AmountResponse>(502, "<html>bad gateway</html>");
        assert_eq!(r.unwrap_err(), "HTTP 502");

        let r = parse_envelope::<AmountResponse>(200, "{}");
        assert!(r.unwrap_err().contains("neither"));
    }

    #[test]
    fn test_client_rejects_bad_endpoint() {
        let relay = RelayConfig {
            endpoint: "not a url".to_string(),
            ..RelayConfig::default()
        };
        assert!(matches!(
            RelayClient::new(&relay, &contracts()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_url_building() {
        let relay = RelayConfig {
            endpoint: "http://127.0.0.1:8545/".to_string(),
            ..RelayConfig::default()
        };
        let client = RelayClient::new(&relay, &contracts()).unwrap();
        assert_eq!(client.url("v1/health"), "http://127.0.0.1:8545/v1/health");
        assert!(client.api_key.is_none());
    }

    #[tokio::test]
    async fn test_swap_kind_mismatch_rejected_locally() {
        let relay = RelayConfig::default();
        let client = RelayClient::new(&relay, &contracts()).unwrap();
        let c = contracts();
        let instruction = SwapInstruction {
            pool_id: "pool".to_string(),
            kind: SwapKind::ExactInput,
            steps: vec![],
            assets: vec![],
            asset_in: c.managed_token.clone(),
            asset_out: c.reference_asset.clone(),
            amount: Wad::ONE,
            limits: vec![],
            min_output: None,
            funds: crate::remote::FundsDescriptor::external(&c.reserve),
            deadline: 0,
        };
        let err = client.swap_exact_output(&instruction).await.unwrap_err();
        assert!(matches!(err, Error::SwapRejected(_)));
    }
}
