// =============================================================================
// Margin Pool - Leveraged Two-Asset Lending Pool
// =============================================================================
//
// One pool per base/quote pair. Accounts:
// - lend either asset and earn interest paid by leveraged positions
// - short: borrow base and sell it for quote
// - long: borrow quote and buy base
//
// Every call first accrues interest and margin-calls positions that crossed
// the leverage threshold. Amounts are tracked as discounted values scaled by
// pool-wide Q96 coefficients, so accrual touches no individual position.
//
// This is the main entry point for the Anchor program.
// =============================================================================

pub mod adapters;
pub mod constants;
pub mod engine;
pub mod error;
pub mod events;
pub mod instructions;
pub mod math;
pub mod state;

use anchor_lang::prelude::*;

pub use constants::*;
pub use error::*;
pub use events::*;
pub use instructions::*;
pub use state::*;

declare_id!("3dPjyLABdK7Sfod7kVngBig1SzxNW8qqY537nVExXQ4A");

#[program]
pub mod margin_pool {
    use super::*;

    // =========================================================================
    // Pool Initialization
    // =========================================================================

    /// Create a margin pool for a base/quote pair
    ///
    /// Creates:
    /// - Pool account (PDA over both mints)
    /// - Base and quote vaults owned by the pool
    ///
    /// The signer becomes admin. `params` are checked against the hard bounds.
    pub fn initialize_pool(ctx: Context<InitializePool>, params: MarginPoolParams) -> Result<()> {
        instructions::initialize_pool::handler_initialize_pool(ctx, params)
    }

    // =========================================================================
    // Position Operations
    // =========================================================================

    /// Deposit base, repaying short debt first, optionally going long
    ///
    /// # Arguments
    /// * `amount` - Base tokens paid in
    /// * `long_amount` - Base to buy on borrowed quote afterwards (0 to skip)
    /// * `limit_price` - Highest Q96 quote per base for the long (0 to skip)
    pub fn deposit_base<'info>(
        ctx: Context<'_, '_, 'info, 'info, UserOperation<'info>>,
        amount: u64,
        long_amount: u64,
        limit_price: u128,
    ) -> Result<()> {
        instructions::deposit::handler_deposit_base(ctx, amount, long_amount, limit_price)
    }

    /// Deposit quote, repaying long debt first, optionally going short
    ///
    /// # Arguments
    /// * `amount` - Quote tokens paid in
    /// * `short_amount` - Borrowed base to sell afterwards (0 to skip)
    /// * `limit_price` - Lowest Q96 quote per base for the short (0 to skip)
    pub fn deposit_quote<'info>(
        ctx: Context<'_, '_, 'info, 'info, UserOperation<'info>>,
        amount: u64,
        short_amount: u64,
        limit_price: u128,
    ) -> Result<()> {
        instructions::deposit::handler_deposit_quote(ctx, amount, short_amount, limit_price)
    }

    /// Withdraw base collateral; more than held withdraws everything
    pub fn withdraw_base<'info>(
        ctx: Context<'_, '_, 'info, 'info, UserOperation<'info>>,
        amount: u64,
    ) -> Result<()> {
        instructions::withdraw::handler_withdraw_base(ctx, amount)
    }

    /// Withdraw quote collateral; more than held withdraws everything
    pub fn withdraw_quote<'info>(
        ctx: Context<'_, '_, 'info, 'info, UserOperation<'info>>,
        amount: u64,
    ) -> Result<()> {
        instructions::withdraw::handler_withdraw_quote(ctx, amount)
    }

    /// Borrow `base_amount` base and sell it for quote collateral
    pub fn short<'info>(
        ctx: Context<'_, '_, 'info, 'info, UserOperation<'info>>,
        base_amount: u64,
        limit_price: u128,
    ) -> Result<()> {
        instructions::trade::handler_short(ctx, base_amount, limit_price)
    }

    /// Borrow quote and buy `base_amount` base collateral
    pub fn long<'info>(
        ctx: Context<'_, '_, 'info, 'info, UserOperation<'info>>,
        base_amount: u64,
        limit_price: u128,
    ) -> Result<()> {
        instructions::trade::handler_long(ctx, base_amount, limit_price)
    }

    /// Repay a short or long from its own collateral
    ///
    /// # Arguments
    /// * `limit_price` - Worst Q96 price accepted for buying back the debt (0 to skip)
    pub fn close_position<'info>(
        ctx: Context<'_, '_, 'info, 'info, UserOperation<'info>>,
        limit_price: u128,
    ) -> Result<()> {
        instructions::trade::handler_close_position(ctx, limit_price)
    }

    /// Take over an over-leveraged position, paying the offered amounts into it
    ///
    /// # Requirements
    /// * Caller has no position or only lends; lent collateral is paid in too
    /// * Target is past the leverage threshold at the liquidation price
    /// * The received position is within the threshold after repayment
    pub fn receive_position<'info>(
        ctx: Context<'_, '_, 'info, 'info, UserOperation<'info>>,
        target: Pubkey,
        quote_amount: u64,
        base_amount: u64,
    ) -> Result<()> {
        instructions::receive_position::handler_receive_position(ctx, target, quote_amount, base_amount)
    }

    /// Withdraw the caller's share after shutdown
    pub fn emergency_withdraw<'info>(ctx: Context<'_, '_, 'info, 'info, UserOperation<'info>>) -> Result<()> {
        instructions::withdraw::handler_emergency_withdraw(ctx)
    }

    // =========================================================================
    // Maintenance (permissionless)
    // =========================================================================

    /// Accrue interest and margin-call positions past the threshold
    pub fn reinit<'info>(ctx: Context<'_, '_, 'info, 'info, PoolMaintenance<'info>>) -> Result<()> {
        instructions::maintenance::handler_reinit(ctx)
    }

    /// Distribute vault surplus above the sync threshold to collateral holders
    pub fn sync_balances<'info>(ctx: Context<'_, '_, 'info, 'info, PoolMaintenance<'info>>) -> Result<()> {
        instructions::maintenance::handler_sync_balances(ctx)
    }

    // =========================================================================
    // Admin Operations
    // =========================================================================

    /// Replace the pool parameters (admin only)
    pub fn set_parameters(ctx: Context<SetParameters>, params: MarginPoolParams) -> Result<()> {
        instructions::admin::handler_set_parameters(ctx, params)
    }

    /// Switch recovery mode on or off (admin only)
    ///
    /// While on, leverage cannot be opened and positions are margin-called
    /// at `recovery_max_leverage`.
    pub fn set_recovery_mode(ctx: Context<SetRecoveryMode>, enabled: bool) -> Result<()> {
        instructions::admin::handler_set_recovery_mode(ctx, enabled)
    }

    /// Put the pool into emergency mode (admin only)
    ///
    /// # Warning
    /// * Irreversible; only emergency_withdraw works afterwards
    /// * Fails unless one side of the pool is insolvent
    pub fn shut_down<'info>(ctx: Context<'_, '_, 'info, 'info, PoolMaintenance<'info>>) -> Result<()> {
        instructions::admin::handler_shut_down(ctx)
    }

    /// Transfer admin rights to a new address (admin only)
    pub fn transfer_admin(ctx: Context<TransferAdmin>) -> Result<()> {
        instructions::admin::handler_transfer_admin(ctx)
    }
}
