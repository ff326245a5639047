// =============================================================================
// Pool Parameters
// =============================================================================
// Admin-tunable configuration stored inside the pool account. Rates are
// expressed against WHOLE_ONE (1_000_000 = 100%); leverage thresholds are
// whole multiples.
// =============================================================================

use anchor_lang::prelude::*;

use crate::constants::*;
use crate::error::MarginPoolError;

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, InitSpace)]
pub struct MarginPoolParams {
    /// Leverage above which a position is margin-called
    pub max_leverage: u8,

    /// Stricter threshold applied while the pool is in recovery mode
    pub recovery_max_leverage: u8,

    /// TWAP window for the regular price (seconds)
    pub price_seconds_ago: u16,

    /// TWAP window for the liquidation price (seconds)
    pub price_seconds_ago_mc: u16,

    /// Base yearly interest rate, multiplied by system leverage
    pub interest_rate: u32,

    /// Yearly protocol fee charged on top of interest
    pub fee: u32,

    /// Fee on swaps performed for leveraged opens and closes
    pub swap_fee: u32,

    /// Accepted price deviation when the pool margin-calls a position
    pub mc_slippage: u32,

    /// Smallest leveraged amount, in base units
    pub position_min_amount: u64,

    /// Ceiling on the pool's free balance, valued in quote units
    pub quote_limit: u64,

    /// Vault surplus that is kept back before distributing to lenders
    pub balance_sync_threshold: u64,
}

impl Default for MarginPoolParams {
    fn default() -> Self {
        Self {
            max_leverage: DEFAULT_MAX_LEVERAGE,
            recovery_max_leverage: DEFAULT_RECOVERY_MAX_LEVERAGE,
            price_seconds_ago: DEFAULT_PRICE_SECONDS_AGO,
            price_seconds_ago_mc: DEFAULT_PRICE_SECONDS_AGO_MC,
            interest_rate: DEFAULT_INTEREST_RATE,
            fee: DEFAULT_FEE,
            swap_fee: DEFAULT_SWAP_FEE,
            mc_slippage: DEFAULT_MC_SLIPPAGE,
            position_min_amount: DEFAULT_POSITION_MIN_AMOUNT,
            quote_limit: DEFAULT_QUOTE_LIMIT,
            balance_sync_threshold: DEFAULT_BALANCE_SYNC_THRESHOLD,
        }
    }
}

impl MarginPoolParams {
    /// Check every field against its hard bound.
    pub fn validate(&self) -> Result<()> {
        require!(
            (MIN_LEVERAGE_BOUND..=MAX_LEVERAGE_BOUND).contains(&self.max_leverage),
            MarginPoolError::InvalidParameter
        );
        require!(
            self.recovery_max_leverage >= MIN_LEVERAGE_BOUND
                && self.recovery_max_leverage <= self.max_leverage,
            MarginPoolError::InvalidParameter
        );
        require!(self.price_seconds_ago > 0, MarginPoolError::InvalidParameter);
        require!(self.price_seconds_ago_mc > 0, MarginPoolError::InvalidParameter);
        require!(self.interest_rate <= MAX_INTEREST_RATE, MarginPoolError::InvalidParameter);
        require!(self.fee <= MAX_FEE, MarginPoolError::InvalidParameter);
        require!(self.swap_fee <= MAX_SWAP_FEE, MarginPoolError::InvalidParameter);
        require!(self.mc_slippage <= MAX_MC_SLIPPAGE, MarginPoolError::InvalidParameter);
        require!(self.position_min_amount > 0, MarginPoolError::InvalidParameter);
        require!(self.quote_limit > 0, MarginPoolError::InvalidParameter);
        Ok(())
    }

    /// Margin-call threshold for the current mode.
    pub fn leverage_threshold(&self, recovery: bool) -> u8 {
        if recovery {
            self.recovery_max_leverage
        } else {
            self.max_leverage
        }
    }
}
