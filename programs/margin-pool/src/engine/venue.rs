// =============================================================================
// External Collaborators
// =============================================================================
// The engine reaches the outside world only through these traits. On-chain
// they are backed by the TWAP feed account and a CPI into the swap program
// (see `crate::adapters`); tests back them with in-memory fakes.
//
// The swap router never receives a reference to the pool, so a swap cannot
// re-enter pool state while an operation is in flight.
// =============================================================================

use anchor_lang::prelude::*;

use crate::math::Fp96;

/// Which asset goes into a swap.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapDirection {
    BaseToQuote,
    QuoteToBase,
}

/// Time-weighted base price, in Q96 quote units per base unit.
pub trait PriceOracle {
    /// Price used for opening, withdrawing and leverage checks.
    fn base_price(&self, seconds_ago: u16) -> Result<Fp96>;

    /// Price used to decide whether a position is margin-called.
    fn liquidation_price(&self, seconds_ago: u16) -> Result<Fp96>;
}

/// Swap venue holding liquidity for the pool's pair.
///
/// Implementations must fail with `SlippageExceeded` when the bound cannot
/// be met; any error aborts the whole operation.
pub trait SwapRouter {
    /// Sell exactly `amount_in`, receiving at least `min_amount_out`.
    fn swap_exact_input(&mut self, direction: SwapDirection, amount_in: u64, min_amount_out: u64) -> Result<u64>;

    /// Buy exactly `amount_out`, paying at most `max_amount_in`.
    fn swap_exact_output(&mut self, direction: SwapDirection, max_amount_in: u64, amount_out: u64) -> Result<u64>;
}

/// Everything an engine call needs besides the pool itself.
pub struct OpContext<'a> {
    /// Unix timestamp of the call
    pub now: i64,
    pub oracle: &'a dyn PriceOracle,
    pub router: &'a mut dyn SwapRouter,
}

/// Token movements between the caller and the pool vaults that the
/// instruction handler must perform after the engine returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Settlement {
    /// Base the caller pays into the base vault
    pub base_in: u64,
    /// Quote the caller pays into the quote vault
    pub quote_in: u64,
    /// Base the pool pays out to the caller
    pub base_out: u64,
    /// Quote the pool pays out to the caller
    pub quote_out: u64,
    /// The caller's own position was margin-called during reinit and the
    /// requested operation was skipped
    pub caller_margin_called: bool,
}

impl Settlement {
    pub fn margin_called() -> Self {
        Self {
            caller_margin_called: true,
            ..Self::default()
        }
    }
}
