// =============================================================================
// Admin Instructions
// =============================================================================
// Functions only the pool admin can call.
//
// - set_parameters: replace the pool parameters (bounds-checked); interest
//   is accrued at the old rates first
// - set_recovery_mode: toggle the lower leverage threshold
// - shut_down: freeze the pool into emergency mode if one side is insolvent
// - transfer_admin: hand the admin role to another address
// =============================================================================

use anchor_lang::prelude::*;

use crate::adapters::TwapPriceFeed;
use crate::constants::*;
use crate::error::MarginPoolError;
use crate::events::AdminTransferred;
use crate::instructions::maintenance::PoolMaintenance;
use crate::state::{MarginPool, MarginPoolParams};

// =============================================================================
// Set Parameters
// =============================================================================

#[derive(Accounts)]
pub struct SetParameters<'info> {
    #[account(
        constraint = admin.key() == pool.admin @ MarginPoolError::AdminOnly
    )]
    pub admin: Signer<'info>,

    #[account(
        mut,
        seeds = [POOL_SEED, pool.base_mint.as_ref(), pool.quote_mint.as_ref()],
        bump = pool.bump
    )]
    pub pool: Box<Account<'info, MarginPool>>,

    /// Read to accrue interest up to now under the old parameters
    /// CHECK: address pinned to the pool's feed
    #[account(address = pool.price_feed @ MarginPoolError::InvalidPriceFeed)]
    pub price_feed: UncheckedAccount<'info>,
}

pub fn handler_set_parameters(ctx: Context<SetParameters>, params: MarginPoolParams) -> Result<()> {
    let now = Clock::get()?.unix_timestamp;
    let oracle = TwapPriceFeed::load(&ctx.accounts.price_feed.to_account_info(), now)?;

    let pool = &mut ctx.accounts.pool;
    pool.set_parameters(now, &oracle, params)?;

    msg!("Parameters updated by admin {}", ctx.accounts.admin.key());
    msg!(
        "Max leverage: {}, recovery max leverage: {}",
        params.max_leverage,
        params.recovery_max_leverage
    );
    Ok(())
}

// =============================================================================
// Recovery Mode
// =============================================================================

#[derive(Accounts)]
pub struct SetRecoveryMode<'info> {
    #[account(
        constraint = admin.key() == pool.admin @ MarginPoolError::AdminOnly
    )]
    pub admin: Signer<'info>,

    #[account(
        mut,
        seeds = [POOL_SEED, pool.base_mint.as_ref(), pool.quote_mint.as_ref()],
        bump = pool.bump
    )]
    pub pool: Box<Account<'info, MarginPool>>,
}

pub fn handler_set_recovery_mode(ctx: Context<SetRecoveryMode>, enabled: bool) -> Result<()> {
    let pool = &mut ctx.accounts.pool;

    if pool.is_recovery() == enabled {
        msg!(
            "Recovery mode is already {}",
            if enabled { "on" } else { "off" }
        );
        return Ok(());
    }

    pool.set_recovery_mode(enabled)?;

    msg!(
        "Recovery mode {} by admin {}",
        if enabled { "ENABLED" } else { "DISABLED" },
        ctx.accounts.admin.key()
    );
    Ok(())
}

// =============================================================================
// Shut Down
// =============================================================================

/// Uses the maintenance accounts; the signer must be the admin.
pub fn handler_shut_down<'info>(ctx: Context<'_, '_, 'info, 'info, PoolMaintenance<'info>>) -> Result<()> {
    let accounts = ctx.accounts;
    require_keys_eq!(accounts.caller.key(), accounts.pool.admin, MarginPoolError::AdminOnly);

    let venue = accounts.venue(ctx.remaining_accounts);
    venue.run(&mut accounts.pool, |pool, op| pool.shut_down(op))?;

    msg!(
        "Pool SHUT DOWN into {:?}, withdraw coefficient {}",
        accounts.pool.mode,
        accounts.pool.emergency_withdraw_coeff.inner
    );
    Ok(())
}

// =============================================================================
// Admin Transfer
// =============================================================================

#[derive(Accounts)]
pub struct TransferAdmin<'info> {
    /// The current admin must sign
    #[account(
        constraint = admin.key() == pool.admin @ MarginPoolError::AdminOnly
    )]
    pub admin: Signer<'info>,

    #[account(
        mut,
        seeds = [POOL_SEED, pool.base_mint.as_ref(), pool.quote_mint.as_ref()],
        bump = pool.bump
    )]
    pub pool: Box<Account<'info, MarginPool>>,

    /// CHECK: only the address is stored
    pub new_admin: UncheckedAccount<'info>,
}

pub fn handler_transfer_admin(ctx: Context<TransferAdmin>) -> Result<()> {
    let pool = &mut ctx.accounts.pool;
    let new_admin = ctx.accounts.new_admin.key();

    require!(new_admin != Pubkey::default(), MarginPoolError::InvalidAddress);
    require!(new_admin != pool.admin, MarginPoolError::InvalidAddress);

    let old_admin = pool.admin;
    pool.admin = new_admin;

    msg!("Admin transferred: {} -> {}", old_admin, new_admin);
    emit!(AdminTransferred {
        old_admin,
        new_admin,
    });
    Ok(())
}
