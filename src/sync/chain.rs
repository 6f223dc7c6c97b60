//! On-chain read capability consumed by the sync jobs
//!
//! Jobs only see the `ChainReader` trait; `rpc::RpcChainReader` is the
//! production implementation and tests substitute scripted readers.

use super::error::SyncError;
use alloy::primitives::Address;
use async_trait::async_trait;
use std::str::FromStr;

/// Read-only view of the token and points contracts
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Highest minted token id (`idCounter()`)
    async fn token_counter(&self) -> Result<u64, SyncError>;

    /// Current owner of `token_id` (`ownerOf(uint256)`)
    async fn owner_of(&self, token_id: u64) -> Result<String, SyncError>;

    /// Points balance of `address` in whole units (`getPoints(address)`)
    async fn points_balance(&self, address: &str) -> Result<f64, SyncError>;
}

/// Canonical lowercase `0x` + 40 hex form of an address
///
/// Returns `InvalidResponse` for anything that is not a 20-byte hex address.
pub fn normalize_address(raw: &str) -> Result<String, SyncError> {
    parse_address(raw).map(|address| format!("{:#x}", address))
}

/// Parse a `0x`-prefixed address; checksum casing is accepted but not enforced
pub fn parse_address(raw: &str) -> Result<Address, SyncError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| SyncError::invalid(format!("address '{}' lacks 0x prefix", raw)))?;

    Address::from_str(body)
        .map_err(|e| SyncError::invalid(format!("address '{}' is not 20 hex bytes: {}", raw, e)))
}
