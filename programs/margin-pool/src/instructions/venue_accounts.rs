// =============================================================================
// Venue Accounts
// =============================================================================
// Builds the engine's collaborators from instruction accounts: the TWAP feed
// as `PriceOracle`, the swap program as `SwapRouter` signed by the pool PDA.
// Shared by user operations, maintenance and admin instructions.
// =============================================================================

use anchor_lang::prelude::*;

use crate::adapters::{CpiSwapRouter, TwapPriceFeed};
use crate::constants::POOL_SEED;
use crate::engine::OpContext;
use crate::state::MarginPool;

pub struct VenueAccounts<'a, 'info> {
    pub base_vault: AccountInfo<'info>,
    pub quote_vault: AccountInfo<'info>,
    pub price_feed: AccountInfo<'info>,
    pub swap_program: AccountInfo<'info>,
    pub token_program: AccountInfo<'info>,
    /// Forwarded to the swap program after the fixed accounts
    pub route_accounts: &'a [AccountInfo<'info>],
}

impl<'a, 'info> VenueAccounts<'a, 'info> {
    /// Run `op` against `pool` with a fresh price feed and swap router.
    pub fn run<R>(
        &self,
        pool: &mut Account<'info, MarginPool>,
        op: impl FnOnce(&mut MarginPool, &mut OpContext) -> Result<R>,
    ) -> Result<R> {
        let now = Clock::get()?.unix_timestamp;
        let oracle = TwapPriceFeed::load(&self.price_feed, now)?;

        let base_mint = pool.base_mint;
        let quote_mint = pool.quote_mint;
        let bump = [pool.bump];
        let pool_seeds: &[&[u8]] = &[POOL_SEED, base_mint.as_ref(), quote_mint.as_ref(), &bump];
        let signer_seeds = &[pool_seeds];

        let mut router = CpiSwapRouter {
            swap_program: self.swap_program.clone(),
            pool: pool.to_account_info(),
            base_vault: self.base_vault.clone(),
            quote_vault: self.quote_vault.clone(),
            token_program: self.token_program.clone(),
            route_accounts: self.route_accounts,
            signer_seeds,
        };
        let mut op_ctx = OpContext {
            now,
            oracle: &oracle,
            router: &mut router,
        };
        op(&mut **pool, &mut op_ctx)
    }
}
