//! Gap recovery port: re-fetches a missed trade-id range from an
//! exchange. No concrete exchange-REST implementation ships here — the
//! full REST surface is out of scope — only the trait and a null
//! implementation for tests (§4.9b).

use crate::error::FeedError;
use crate::trade::RawTrade;
use async_trait::async_trait;

#[async_trait]
pub trait GapRecoveryFetcher: Send + Sync {
    async fn fetch_range(
        &self,
        exchange: &str,
        symbol: &str,
        from_trade_id: u64,
        to_trade_id: u64,
    ) -> Result<Vec<RawTrade>, FeedError>;
}

/// Always returns an empty range; used where a fetcher is required by
/// type but no recovery should actually occur (tests, offline runs).
pub struct NullGapRecoveryFetcher;

#[async_trait]
impl GapRecoveryFetcher for NullGapRecoveryFetcher {
    async fn fetch_range(
        &self,
        _exchange: &str,
        _symbol: &str,
        _from_trade_id: u64,
        _to_trade_id: u64,
    ) -> Result<Vec<RawTrade>, FeedError> {
        Ok(Vec::new())
    }
}
