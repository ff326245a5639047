// =============================================================================
// Deposit Instructions
// =============================================================================
// Adds collateral to the caller's position, optionally opening leverage on top.
//
// deposit_base:
// - Repays base debt of a Short first; the rest becomes base collateral
// - With `long_amount`, then buys that much base on borrowed quote
//
// deposit_quote:
// - Repays quote debt of a Long first; the rest becomes quote collateral
// - With `short_amount`, then sells that much borrowed base
//
// Limit prices are Q96 quote per base; zero disables the bound.
// =============================================================================

use anchor_lang::prelude::*;

use crate::events::Deposited;
use crate::instructions::user_operation::{run_user_operation, UserOperation};
use crate::math::Fp96;

/// Handler for the deposit_base instruction
///
/// # Arguments
/// * `amount` - Base tokens paid in
/// * `long_amount` - Base to buy with borrowed quote afterwards (0 to skip)
/// * `limit_price` - Highest accepted Q96 price for the long leg
pub fn handler_deposit_base<'info>(
    ctx: Context<'_, '_, 'info, 'info, UserOperation<'info>>,
    amount: u64,
    long_amount: u64,
    limit_price: u128,
) -> Result<()> {
    let settlement = run_user_operation(ctx, |pool, op, user| {
        let settlement = pool.deposit_base(op, user, amount, long_amount, Fp96::from_inner(limit_price))?;
        if !settlement.caller_margin_called {
            emit!(Deposited {
                owner: user,
                base_amount: settlement.base_in,
                quote_amount: 0,
                kind: pool.position(&user).kind(),
            });
        }
        Ok(settlement)
    })?;

    msg!("Base deposit of {} processed, paid in {}", amount, settlement.base_in);
    Ok(())
}

/// Handler for the deposit_quote instruction
///
/// # Arguments
/// * `amount` - Quote tokens paid in
/// * `short_amount` - Borrowed base to sell afterwards (0 to skip)
/// * `limit_price` - Lowest accepted Q96 price for the short leg
pub fn handler_deposit_quote<'info>(
    ctx: Context<'_, '_, 'info, 'info, UserOperation<'info>>,
    amount: u64,
    short_amount: u64,
    limit_price: u128,
) -> Result<()> {
    let settlement = run_user_operation(ctx, |pool, op, user| {
        let settlement = pool.deposit_quote(op, user, amount, short_amount, Fp96::from_inner(limit_price))?;
        if !settlement.caller_margin_called {
            emit!(Deposited {
                owner: user,
                base_amount: 0,
                quote_amount: settlement.quote_in,
                kind: pool.position(&user).kind(),
            });
        }
        Ok(settlement)
    })?;

    msg!("Quote deposit of {} processed, paid in {}", amount, settlement.quote_in);
    Ok(())
}
