// =============================================================================
// Maintenance Instructions
// =============================================================================
// Permissionless upkeep. Anyone can sign.
//
// reinit:
// - Accrues interest and fees, then margin-calls every position past the
//   leverage threshold at the liquidation price
//
// sync_balances:
// - Reads the vault token balances after a reinit and spreads any surplus
//   above `balance_sync_threshold` over the collateral holders of that asset
//   (rebasing tokens, direct transfers)
//
// Remaining accounts are the swap route, as for user operations.
// =============================================================================

use anchor_lang::prelude::*;
use anchor_spl::token::{accessor, Token, TokenAccount};

use crate::constants::*;
use crate::error::MarginPoolError;
use crate::instructions::venue_accounts::VenueAccounts;
use crate::state::MarginPool;

#[derive(Accounts)]
pub struct PoolMaintenance<'info> {
    pub caller: Signer<'info>,

    /// Upkeep only rewrites or removes rows, so the account never grows
    #[account(
        mut,
        seeds = [POOL_SEED, pool.base_mint.as_ref(), pool.quote_mint.as_ref()],
        bump = pool.bump
    )]
    pub pool: Box<Account<'info, MarginPool>>,

    #[account(
        mut,
        seeds = [BASE_VAULT_SEED, pool.key().as_ref()],
        bump = pool.base_vault_bump
    )]
    pub base_vault: Box<Account<'info, TokenAccount>>,

    #[account(
        mut,
        seeds = [QUOTE_VAULT_SEED, pool.key().as_ref()],
        bump = pool.quote_vault_bump
    )]
    pub quote_vault: Box<Account<'info, TokenAccount>>,

    /// CHECK: address pinned to the pool's feed, parsed by `TwapPriceFeed`
    #[account(address = pool.price_feed @ MarginPoolError::InvalidPriceFeed)]
    pub price_feed: UncheckedAccount<'info>,

    /// CHECK: address pinned to the pool's swap venue
    #[account(address = pool.swap_program @ MarginPoolError::InvalidSwapProgram)]
    pub swap_program: UncheckedAccount<'info>,

    pub token_program: Program<'info, Token>,
}

impl<'info> PoolMaintenance<'info> {
    pub fn venue<'a>(&self, route_accounts: &'a [AccountInfo<'info>]) -> VenueAccounts<'a, 'info> {
        VenueAccounts {
            base_vault: self.base_vault.to_account_info(),
            quote_vault: self.quote_vault.to_account_info(),
            price_feed: self.price_feed.to_account_info(),
            swap_program: self.swap_program.to_account_info(),
            token_program: self.token_program.to_account_info(),
            route_accounts,
        }
    }
}

pub fn handler_reinit<'info>(ctx: Context<'_, '_, 'info, 'info, PoolMaintenance<'info>>) -> Result<()> {
    let accounts = ctx.accounts;
    let venue = accounts.venue(ctx.remaining_accounts);

    let outcome = venue.run(&mut accounts.pool, |pool, op| {
        pool.require_not_emergency()?;
        pool.reinit(op, None)
    })?;

    msg!(
        "Reinit by {}: {} margin calls, mode {:?}",
        accounts.caller.key(),
        outcome.margin_calls,
        accounts.pool.mode
    );
    Ok(())
}

pub fn handler_sync_balances<'info>(ctx: Context<'_, '_, 'info, 'info, PoolMaintenance<'info>>) -> Result<()> {
    let accounts = ctx.accounts;
    let venue = accounts.venue(ctx.remaining_accounts);

    let (base_surplus, quote_surplus) = venue.run(&mut accounts.pool, |pool, op| {
        pool.require_not_emergency()?;
        // Margin calls move vault balances, so read them after the sweep
        pool.reinit(op, None)?;
        let base_vault = accessor::amount(&venue.base_vault)?;
        let quote_vault = accessor::amount(&venue.quote_vault)?;
        pool.sync_balances(op, base_vault, quote_vault)
    })?;

    msg!("Synced balances: base surplus {}, quote surplus {}", base_surplus, quote_surplus);
    Ok(())
}
