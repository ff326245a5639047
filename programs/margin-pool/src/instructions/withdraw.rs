// =============================================================================
// Withdraw Instructions
// =============================================================================
// Pays collateral back out of the caller's position.
//
// - A request above the collateral withdraws everything; a Lend position
//   left with nothing is removed from the ledger
// - The position must stay within max leverage afterwards
// - The pool must hold enough free tokens to pay out
//
// emergency_withdraw is the only way out once the pool is shut down. It pays
// the caller's collateral times the emergency coefficient and clears the
// position.
// =============================================================================

use anchor_lang::prelude::*;

use crate::events::Withdrawn;
use crate::instructions::user_operation::{run_user_operation, UserOperation};

pub fn handler_withdraw_base<'info>(
    ctx: Context<'_, '_, 'info, 'info, UserOperation<'info>>,
    amount: u64,
) -> Result<()> {
    let settlement = run_user_operation(ctx, |pool, op, user| {
        let settlement = pool.withdraw_base(op, user, amount)?;
        if !settlement.caller_margin_called {
            emit!(Withdrawn {
                owner: user,
                base_amount: settlement.base_out,
                quote_amount: 0,
                kind: pool.position(&user).kind(),
            });
        }
        Ok(settlement)
    })?;

    msg!("Withdrew {} base", settlement.base_out);
    Ok(())
}

pub fn handler_withdraw_quote<'info>(
    ctx: Context<'_, '_, 'info, 'info, UserOperation<'info>>,
    amount: u64,
) -> Result<()> {
    let settlement = run_user_operation(ctx, |pool, op, user| {
        let settlement = pool.withdraw_quote(op, user, amount)?;
        if !settlement.caller_margin_called {
            emit!(Withdrawn {
                owner: user,
                base_amount: 0,
                quote_amount: settlement.quote_out,
                kind: pool.position(&user).kind(),
            });
        }
        Ok(settlement)
    })?;

    msg!("Withdrew {} quote", settlement.quote_out);
    Ok(())
}

/// Handler for the emergency_withdraw instruction
///
/// No price read and no swap happen here; the feed and swap accounts are
/// only checked against the pool.
pub fn handler_emergency_withdraw<'info>(ctx: Context<'_, '_, 'info, 'info, UserOperation<'info>>) -> Result<()> {
    let settlement = run_user_operation(ctx, |pool, _op, user| pool.emergency_withdraw(user))?;

    msg!(
        "Emergency withdrawal paid {} base, {} quote",
        settlement.base_out,
        settlement.quote_out
    );
    Ok(())
}
