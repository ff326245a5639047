// =============================================================================
// Trade Instructions
// =============================================================================
// Leveraged entries and exits through the pool's swap venue.
//
// - short: borrow base and sell it for quote collateral
// - long: borrow quote and buy base collateral
// - close_position: buy back the debt from the position's own collateral,
//   leaving a Lend position with whatever is left
//
// Swaps happen between the vaults and the venue; nothing is transferred to or
// from the user here. The swap fee is credited to the fee holder.
// =============================================================================

use anchor_lang::prelude::*;

use crate::instructions::user_operation::{run_user_operation, UserOperation};
use crate::math::Fp96;

/// Handler for the short instruction
///
/// # Arguments
/// * `base_amount` - Base to borrow and sell
/// * `limit_price` - Lowest accepted Q96 quote per base (0 to skip)
pub fn handler_short<'info>(
    ctx: Context<'_, '_, 'info, 'info, UserOperation<'info>>,
    base_amount: u64,
    limit_price: u128,
) -> Result<()> {
    run_user_operation(ctx, |pool, op, user| {
        pool.short(op, user, base_amount, Fp96::from_inner(limit_price))
    })?;
    Ok(())
}

/// Handler for the long instruction
///
/// # Arguments
/// * `base_amount` - Base to buy with borrowed quote
/// * `limit_price` - Highest accepted Q96 quote per base (0 to skip)
pub fn handler_long<'info>(
    ctx: Context<'_, '_, 'info, 'info, UserOperation<'info>>,
    base_amount: u64,
    limit_price: u128,
) -> Result<()> {
    run_user_operation(ctx, |pool, op, user| {
        pool.long(op, user, base_amount, Fp96::from_inner(limit_price))
    })?;
    Ok(())
}

pub fn handler_close_position<'info>(
    ctx: Context<'_, '_, 'info, 'info, UserOperation<'info>>,
    limit_price: u128,
) -> Result<()> {
    run_user_operation(ctx, |pool, op, user| {
        pool.close_position(op, user, Fp96::from_inner(limit_price))
    })?;
    Ok(())
}
