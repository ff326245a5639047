// =============================================================================
// Initialize Pool Instruction
// =============================================================================
// Creates a base/quote margin pool.
//
// Creates:
// - Pool account (PDA over both mints), starting with room for no positions
// - Base and quote vaults owned by the pool PDA
//
// Stores the admin, fee holder, price feed and swap program. Coefficients
// start at one, deleverage coefficients at zero, mode Regular.
// =============================================================================

use anchor_lang::prelude::*;
use anchor_spl::token::{Mint, Token, TokenAccount};

use crate::constants::*;
use crate::error::MarginPoolError;
use crate::events::PoolInitialized;
use crate::state::{MarginPool, MarginPoolParams, PoolKeys};

/// Accounts required for the initialize_pool instruction.
#[derive(Accounts)]
pub struct InitializePool<'info> {
    // =========================================================================
    // Signers
    // =========================================================================

    /// Pays for the accounts and becomes pool admin
    #[account(mut)]
    pub admin: Signer<'info>,

    // =========================================================================
    // Pool Account (PDA - created by this instruction)
    // =========================================================================

    #[account(
        init,
        payer = admin,
        space = MarginPool::space_for(1),
        seeds = [POOL_SEED, base_mint.key().as_ref(), quote_mint.key().as_ref()],
        bump
    )]
    pub pool: Box<Account<'info, MarginPool>>,

    // =========================================================================
    // Token Mints
    // =========================================================================

    pub base_mint: Box<Account<'info, Mint>>,

    #[account(constraint = quote_mint.key() != base_mint.key() @ MarginPoolError::InvalidMint)]
    pub quote_mint: Box<Account<'info, Mint>>,

    // =========================================================================
    // Vaults (PDA-owned)
    // =========================================================================

    #[account(
        init,
        payer = admin,
        token::mint = base_mint,
        token::authority = pool,
        seeds = [BASE_VAULT_SEED, pool.key().as_ref()],
        bump
    )]
    pub base_vault: Box<Account<'info, TokenAccount>>,

    #[account(
        init,
        payer = admin,
        token::mint = quote_mint,
        token::authority = pool,
        seeds = [QUOTE_VAULT_SEED, pool.key().as_ref()],
        bump
    )]
    pub quote_vault: Box<Account<'info, TokenAccount>>,

    // =========================================================================
    // Configuration Accounts
    // =========================================================================

    /// Owner of the fee-collecting position
    /// CHECK: only the address is stored
    pub fee_holder: UncheckedAccount<'info>,

    /// TWAP feed for the pair
    /// CHECK: layout is validated whenever a price is read
    pub price_feed: UncheckedAccount<'info>,

    /// Swap venue invoked for margin calls and leveraged trades
    /// CHECK: must be an executable program
    #[account(constraint = swap_program.executable @ MarginPoolError::InvalidSwapProgram)]
    pub swap_program: UncheckedAccount<'info>,

    // =========================================================================
    // Programs
    // =========================================================================

    pub system_program: Program<'info, System>,
    pub token_program: Program<'info, Token>,
}

pub fn handler_initialize_pool(ctx: Context<InitializePool>, params: MarginPoolParams) -> Result<()> {
    params.validate()?;

    let fee_holder = ctx.accounts.fee_holder.key();
    require_keys_neq!(fee_holder, Pubkey::default(), MarginPoolError::InvalidAddress);

    let keys = PoolKeys {
        admin: ctx.accounts.admin.key(),
        fee_holder,
        base_mint: ctx.accounts.base_mint.key(),
        quote_mint: ctx.accounts.quote_mint.key(),
        base_vault: ctx.accounts.base_vault.key(),
        quote_vault: ctx.accounts.quote_vault.key(),
        price_feed: ctx.accounts.price_feed.key(),
        swap_program: ctx.accounts.swap_program.key(),
    };
    let now = Clock::get()?.unix_timestamp;

    let mut pool = MarginPool::new(keys, params, now);
    pool.bump = ctx.bumps.pool;
    pool.base_vault_bump = ctx.bumps.base_vault;
    pool.quote_vault_bump = ctx.bumps.quote_vault;
    ctx.accounts.pool.set_inner(pool);

    msg!("Margin pool initialized: {}", ctx.accounts.pool.key());
    msg!("Base mint: {}, quote mint: {}", keys.base_mint, keys.quote_mint);
    msg!("Fee holder: {}", keys.fee_holder);

    emit!(PoolInitialized {
        pool: ctx.accounts.pool.key(),
        base_mint: keys.base_mint,
        quote_mint: keys.quote_mint,
        admin: keys.admin,
        fee_holder: keys.fee_holder,
    });

    Ok(())
}
