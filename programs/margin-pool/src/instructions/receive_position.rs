// =============================================================================
// Receive Position Instruction
// =============================================================================
// A caller with no leverage takes over another account's position once it is
// past the pool's leverage threshold at the liquidation price.
//
// Flow:
// 1. Interest is accrued (no margin-call sweep, so the target survives)
// 2. The offered quote and base, plus any collateral the caller lends, repay
//    the target's debt first
// 3. What is left must be within the leverage threshold
// 4. The position moves to the caller; the target owns nothing afterwards
//
// The offered amounts are transferred from the caller to the vaults.
// =============================================================================

use anchor_lang::prelude::*;

use crate::instructions::user_operation::{run_user_operation, UserOperation};

/// Handler for the receive_position instruction
///
/// # Arguments
/// * `target` - Owner of the over-leveraged position
/// * `quote_amount` - Quote paid into the position
/// * `base_amount` - Base paid into the position
pub fn handler_receive_position<'info>(
    ctx: Context<'_, '_, 'info, 'info, UserOperation<'info>>,
    target: Pubkey,
    quote_amount: u64,
    base_amount: u64,
) -> Result<()> {
    run_user_operation(ctx, |pool, op, user| {
        pool.receive_position(op, user, target, quote_amount, base_amount)
    })?;

    msg!("Position of {} received", target);
    Ok(())
}
