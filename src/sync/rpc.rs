//! `eth_call` reader for the token and points contracts
//!
//! ## Calls
//!
//! | Function             | Returns                    |
//! |----------------------|----------------------------|
//! | `idCounter()`        | uint256 (must fit u64)     |
//! | `ownerOf(uint256)`   | address                    |
//! | `getPoints(address)` | uint256 wei (18 decimals)  |
//!
//! Every call reads the `latest` block through an alloy HTTP provider whose
//! reqwest client carries the transport timeout.

use super::chain::{parse_address, ChainReader};
use super::error::SyncError;
use alloy::eips::BlockId;
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::client::RpcClient;
use alloy::rpc::types::TransactionRequest;
use alloy::sol;
use alloy::sol_types::SolCall;
use alloy::transports::http::Http;
use alloy::transports::TransportError;
use async_trait::async_trait;
use std::time::Duration;

sol! {
    function idCounter() external view returns (uint256);
    function ownerOf(uint256 tokenId) external view returns (address);
    function getPoints(address account) external view returns (uint256);
}

/// Wei per whole point
const POINTS_SCALE: u128 = 1_000_000_000_000_000_000;

/// `ChainReader` backed by a JSON-RPC endpoint
pub struct RpcChainReader {
    provider: DynProvider,
    token_contract: Address,
    points_contract: Address,
}

impl RpcChainReader {
    pub fn new(
        rpc_url: &str,
        token_contract: &str,
        points_contract: &str,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let url = rpc_url
            .parse::<reqwest::Url>()
            .map_err(|e| SyncError::invalid(format!("RPC URL '{}' is invalid: {}", rpc_url, e)))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        let transport = Http::with_client(client, url);
        let provider = ProviderBuilder::new()
            .connect_client(RpcClient::new(transport, false))
            .erased();

        Ok(Self {
            provider,
            token_contract: parse_address(token_contract)?,
            points_contract: parse_address(points_contract)?,
        })
    }

    /// Execute one read-only call against `to` and decode its return value
    async fn eth_call<C: SolCall>(&self, to: Address, call: C) -> Result<C::Return, SyncError> {
        let request = TransactionRequest::default()
            .to(to)
            .input(Bytes::from(call.abi_encode()).into());

        let output = self
            .provider
            .call(request)
            .block(BlockId::latest())
            .await
            .map_err(map_transport_error)?;

        C::abi_decode_returns(&output).map_err(|e| {
            SyncError::invalid(format!("cannot decode {} result: {}", C::SIGNATURE, e))
        })
    }
}

#[async_trait]
impl ChainReader for RpcChainReader {
    async fn token_counter(&self) -> Result<u64, SyncError> {
        let counter = self.eth_call(self.token_contract, idCounterCall {}).await?;
        counter_from_word(counter)
    }

    async fn owner_of(&self, token_id: u64) -> Result<String, SyncError> {
        let call = ownerOfCall {
            tokenId: U256::from(token_id),
        };
        let owner = self.eth_call(self.token_contract, call).await?;
        Ok(format!("{:#x}", owner))
    }

    async fn points_balance(&self, address: &str) -> Result<f64, SyncError> {
        let call = getPointsCall {
            account: parse_address(address)?,
        };
        let wei = self.eth_call(self.points_contract, call).await?;
        points_from_wei(wei)
    }
}

/// Node error objects go through `classify_rpc_error`; malformed payloads
/// are invalid responses; everything else means the node is unreachable.
fn map_transport_error(err: TransportError) -> SyncError {
    if let Some(payload) = err.as_error_resp() {
        return classify_rpc_error(payload.code, &payload.message);
    }
    if err.is_deser_error() {
        return SyncError::invalid(format!("malformed RPC response: {}", err));
    }
    SyncError::remote(err.to_string())
}

/// Reverts are answers from the node (bad id, missing owner); other error
/// objects are treated as the node being unavailable.
fn classify_rpc_error(code: i64, message: &str) -> SyncError {
    let formatted = format!("RPC error {}: {}", code, message);
    if code == 3 || message.to_lowercase().contains("revert") {
        SyncError::invalid(formatted)
    } else {
        SyncError::remote(formatted)
    }
}

fn counter_from_word(counter: U256) -> Result<u64, SyncError> {
    u64::try_from(counter)
        .map_err(|_| SyncError::invalid(format!("idCounter {} does not fit in u64", counter)))
}

/// uint256 wei to whole points (lossy above 2^53 like any f64)
fn points_from_wei(wei: U256) -> Result<f64, SyncError> {
    let scale = U256::from(POINTS_SCALE);

    let whole = u128::try_from(wei / scale)
        .map_err(|_| SyncError::invalid(format!("points balance {} is out of range", wei)))?;
    let fraction = u128::try_from(wei % scale)
        .map_err(|_| SyncError::invalid(format!("points balance {} is out of range", wei)))?;

    Ok(whole as f64 + fraction as f64 / POINTS_SCALE as f64)
}
