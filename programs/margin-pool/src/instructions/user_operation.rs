// =============================================================================
// User Operation Accounts
// =============================================================================
// Every position instruction (deposit, withdraw, short, long, close, receive,
// emergency withdraw) takes the same accounts and runs the same way:
//
// 1. Grow the pool account so the call can add the caller's ledger row
//    (the fee holder's row exists from pool creation)
// 2. Run the engine call with the TWAP feed and the CPI swap router
// 3. Move the returned settlement between the user and the vaults
//
// Remaining accounts are forwarded to the swap program as the route.
// =============================================================================

use anchor_lang::prelude::*;
use anchor_spl::token::{self, Token, TokenAccount, Transfer};

use crate::constants::*;
use crate::engine::{OpContext, Settlement};
use crate::error::MarginPoolError;
use crate::instructions::venue_accounts::VenueAccounts;
use crate::state::MarginPool;

#[derive(Accounts)]
pub struct UserOperation<'info> {
    // =========================================================================
    // Signers
    // =========================================================================

    /// Position owner; pays for pool growth
    #[account(mut)]
    pub user: Signer<'info>,

    // =========================================================================
    // Pool Accounts
    // =========================================================================

    #[account(
        mut,
        seeds = [POOL_SEED, pool.base_mint.as_ref(), pool.quote_mint.as_ref()],
        bump = pool.bump,
        realloc = MarginPool::space_for(pool.ledger.len() + 1).max(pool.to_account_info().data_len()),
        realloc::payer = user,
        realloc::zero = false
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

    // =========================================================================
    // User Token Accounts
    // =========================================================================

    #[account(
        mut,
        constraint = user_base_account.mint == pool.base_mint @ MarginPoolError::InvalidMint,
        constraint = user_base_account.owner == user.key() @ MarginPoolError::InvalidTokenAccountOwner
    )]
    pub user_base_account: Box<Account<'info, TokenAccount>>,

    #[account(
        mut,
        constraint = user_quote_account.mint == pool.quote_mint @ MarginPoolError::InvalidMint,
        constraint = user_quote_account.owner == user.key() @ MarginPoolError::InvalidTokenAccountOwner
    )]
    pub user_quote_account: Box<Account<'info, TokenAccount>>,

    // =========================================================================
    // Collaborators
    // =========================================================================

    /// CHECK: address pinned to the pool's feed, parsed by `TwapPriceFeed`
    #[account(address = pool.price_feed @ MarginPoolError::InvalidPriceFeed)]
    pub price_feed: UncheckedAccount<'info>,

    /// CHECK: address pinned to the pool's swap venue
    #[account(address = pool.swap_program @ MarginPoolError::InvalidSwapProgram)]
    pub swap_program: UncheckedAccount<'info>,

    // =========================================================================
    // Programs
    // =========================================================================

    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
}

/// Run `op` for the signing user and settle its token movements.
pub fn run_user_operation<'info, F>(
    ctx: Context<'_, '_, 'info, 'info, UserOperation<'info>>,
    op: F,
) -> Result<Settlement>
where
    F: FnOnce(&mut MarginPool, &mut OpContext, Pubkey) -> Result<Settlement>,
{
    let accounts = ctx.accounts;
    let user = accounts.user.key();

    let venue = VenueAccounts {
        base_vault: accounts.base_vault.to_account_info(),
        quote_vault: accounts.quote_vault.to_account_info(),
        price_feed: accounts.price_feed.to_account_info(),
        swap_program: accounts.swap_program.to_account_info(),
        token_program: accounts.token_program.to_account_info(),
        route_accounts: ctx.remaining_accounts,
    };
    let settlement = venue.run(&mut accounts.pool, |pool, op_ctx| op(pool, op_ctx, user))?;

    if settlement.caller_margin_called {
        msg!("Position of {} was margin-called, nothing settled", user);
        return Ok(settlement);
    }

    // =========================================================================
    // Settlement Transfers
    // =========================================================================

    let base_mint = accounts.pool.base_mint;
    let quote_mint = accounts.pool.quote_mint;
    let bump = [accounts.pool.bump];
    let pool_seeds: &[&[u8]] = &[POOL_SEED, base_mint.as_ref(), quote_mint.as_ref(), &bump];
    let signer_seeds = &[pool_seeds];

    let token_program = accounts.token_program.to_account_info();

    if settlement.base_in > 0 {
        let transfer_ctx = CpiContext::new(
            token_program.clone(),
            Transfer {
                from: accounts.user_base_account.to_account_info(),
                to: accounts.base_vault.to_account_info(),
                authority: accounts.user.to_account_info(),
            },
        );
        token::transfer(transfer_ctx, settlement.base_in)?;
    }

    if settlement.quote_in > 0 {
        let transfer_ctx = CpiContext::new(
            token_program.clone(),
            Transfer {
                from: accounts.user_quote_account.to_account_info(),
                to: accounts.quote_vault.to_account_info(),
                authority: accounts.user.to_account_info(),
            },
        );
        token::transfer(transfer_ctx, settlement.quote_in)?;
    }

    if settlement.base_out > 0 {
        let transfer_ctx = CpiContext::new_with_signer(
            token_program.clone(),
            Transfer {
                from: accounts.base_vault.to_account_info(),
                to: accounts.user_base_account.to_account_info(),
                authority: accounts.pool.to_account_info(),
            },
            signer_seeds,
        );
        token::transfer(transfer_ctx, settlement.base_out)?;
    }

    if settlement.quote_out > 0 {
        let transfer_ctx = CpiContext::new_with_signer(
            token_program,
            Transfer {
                from: accounts.quote_vault.to_account_info(),
                to: accounts.user_quote_account.to_account_info(),
                authority: accounts.pool.to_account_info(),
            },
            signer_seeds,
        );
        token::transfer(transfer_ctx, settlement.quote_out)?;
    }

    msg!(
        "Settled for {}: in {} base / {} quote, out {} base / {} quote",
        user,
        settlement.base_in,
        settlement.quote_in,
        settlement.base_out,
        settlement.quote_out
    );

    Ok(settlement)
}
