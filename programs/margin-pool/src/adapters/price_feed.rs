// =============================================================================
// TWAP Price Feed
// =============================================================================
// Reads the pool's price feed account: an 8-byte account header followed by a
// Borsh `Vec<PriceObservation>` ordered oldest to newest. Each observation
// carries the running sum of the Q96 price multiplied by seconds, so the
// average over any window is a difference of two sums divided by the time
// between them. Sums are allowed to wrap.
// =============================================================================

use anchor_lang::prelude::*;

use crate::engine::PriceOracle;
use crate::error::MarginPoolError;
use crate::math::Fp96;

/// Bytes before the observation vector.
pub const FEED_HEADER_LEN: usize = 8;

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriceObservation {
    pub timestamp: i64,
    /// Sum of Q96 price * seconds since the feed started
    pub cumulative_price_x96: u128,
}

pub struct TwapPriceFeed {
    observations: Vec<PriceObservation>,
    now: i64,
}

impl TwapPriceFeed {
    pub fn load(feed: &AccountInfo, now: i64) -> Result<Self> {
        let data = feed.try_borrow_data()?;
        Self::from_data(&data, now)
    }

    pub fn from_data(data: &[u8], now: i64) -> Result<Self> {
        require!(data.len() >= FEED_HEADER_LEN, MarginPoolError::InvalidPriceFeed);
        let mut body = &data[FEED_HEADER_LEN..];
        let observations = Vec::<PriceObservation>::deserialize(&mut body)
            .map_err(|_| error!(MarginPoolError::InvalidPriceFeed))?;
        require!(
            observations.windows(2).all(|w| w[0].timestamp < w[1].timestamp),
            MarginPoolError::InvalidPriceFeed
        );
        Ok(Self { observations, now })
    }

    /// Average price over the last `seconds_ago` seconds.
    ///
    /// The newest observation must fall inside the window and an older one
    /// must sit at or before its start.
    pub fn twap(&self, seconds_ago: u16) -> Result<Fp96> {
        let newest = self
            .observations
            .last()
            .ok_or(MarginPoolError::StalePrice)?;
        let window_start = self.now - seconds_ago as i64;
        require!(newest.timestamp >= window_start, MarginPoolError::StalePrice);

        let start = self
            .observations
            .iter()
            .rev()
            .find(|o| o.timestamp <= window_start)
            .ok_or(MarginPoolError::StalePrice)?;
        require!(start.timestamp < newest.timestamp, MarginPoolError::StalePrice);

        let elapsed = (newest.timestamp - start.timestamp) as u128;
        let sum = newest
            .cumulative_price_x96
            .wrapping_sub(start.cumulative_price_x96);
        Ok(Fp96::from_inner(sum / elapsed))
    }
}

impl PriceOracle for TwapPriceFeed {
    fn base_price(&self, seconds_ago: u16) -> Result<Fp96> {
        self.twap(seconds_ago)
    }

    fn liquidation_price(&self, seconds_ago: u16) -> Result<Fp96> {
        self.twap(seconds_ago)
    }
}
