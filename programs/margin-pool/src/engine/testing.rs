// =============================================================================
// Engine Test Harness
// =============================================================================
// In-memory oracle and swap venue plus a `TestEnv` that drives a pool the
// way the instruction handlers do: every call runs against a snapshot and is
// rolled back on error, settlements and swaps move the simulated vaults.
// =============================================================================

use anchor_lang::prelude::*;

use crate::engine::venue::{OpContext, PriceOracle, Settlement, SwapDirection, SwapRouter};
use crate::error::MarginPoolError;
use crate::math::Fp96;
use crate::state::{MarginPool, MarginPoolParams, PoolKeys};

pub const LENDER: Pubkey = Pubkey::new_from_array([1; 32]);
pub const BORROWER: Pubkey = Pubkey::new_from_array([2; 32]);
pub const LONGER: Pubkey = Pubkey::new_from_array([3; 32]);
pub const LIQUIDATOR: Pubkey = Pubkey::new_from_array([4; 32]);
pub const FEE_HOLDER: Pubkey = Pubkey::new_from_array([9; 32]);
pub const ADMIN: Pubkey = Pubkey::new_from_array([10; 32]);

/// Largest accepted gap between a simulated vault and the pool's balance.
const VAULT_TOLERANCE: u128 = 256;

pub struct FixedOracle {
    pub price: Fp96,
    pub liquidation_price: Fp96,
}

impl PriceOracle for FixedOracle {
    fn base_price(&self, _seconds_ago: u16) -> Result<Fp96> {
        Ok(self.price)
    }

    fn liquidation_price(&self, _seconds_ago: u16) -> Result<Fp96> {
        Ok(self.liquidation_price)
    }
}

/// Fills every swap at exactly `price`, rounding against the pool.
pub struct FixedPriceRouter {
    pub price: Fp96,
    /// Net base moved into the pool's vault by swaps
    pub base_delta: i128,
    /// Net quote moved into the pool's vault by swaps
    pub quote_delta: i128,
}

impl SwapRouter for FixedPriceRouter {
    fn swap_exact_input(&mut self, direction: SwapDirection, amount_in: u64, min_amount_out: u64) -> Result<u64> {
        let out = match direction {
            SwapDirection::BaseToQuote => self.price.mul_amount(amount_in as u128)?,
            SwapDirection::QuoteToBase => self.price.recip_mul_amount(amount_in as u128)?,
        };
        let out = u64::try_from(out).map_err(|_| error!(MarginPoolError::MathOverflow))?;
        require!(out >= min_amount_out, MarginPoolError::SlippageExceeded);
        self.record(direction, amount_in, out);
        Ok(out)
    }

    fn swap_exact_output(&mut self, direction: SwapDirection, max_amount_in: u64, amount_out: u64) -> Result<u64> {
        let amount_in = match direction {
            SwapDirection::BaseToQuote => self.price.recip_mul_amount_up(amount_out as u128)?,
            SwapDirection::QuoteToBase => self.price.mul_amount_up(amount_out as u128)?,
        };
        let amount_in = u64::try_from(amount_in).map_err(|_| error!(MarginPoolError::MathOverflow))?;
        require!(amount_in <= max_amount_in, MarginPoolError::SlippageExceeded);
        self.record(direction, amount_in, amount_out);
        Ok(amount_in)
    }
}

impl FixedPriceRouter {
    fn record(&mut self, direction: SwapDirection, amount_in: u64, amount_out: u64) {
        match direction {
            SwapDirection::BaseToQuote => {
                self.base_delta -= amount_in as i128;
                self.quote_delta += amount_out as i128;
            }
            SwapDirection::QuoteToBase => {
                self.quote_delta -= amount_in as i128;
                self.base_delta += amount_out as i128;
            }
        }
    }
}

/// Parameters that keep arithmetic in tests easy to follow: no swap fee and
/// no minimum position size.
pub fn test_params() -> MarginPoolParams {
    MarginPoolParams {
        swap_fee: 0,
        position_min_amount: 1,
        ..MarginPoolParams::default()
    }
}

pub struct TestEnv {
    pub pool: MarginPool,
    pub oracle: FixedOracle,
    pub router: FixedPriceRouter,
    pub now: i64,
    pub vault_base: u128,
    pub vault_quote: u128,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_params(test_params())
    }

    pub fn with_params(params: MarginPoolParams) -> Self {
        let now = 1_700_000_000;
        let keys = PoolKeys {
            admin: ADMIN,
            fee_holder: FEE_HOLDER,
            ..PoolKeys::default()
        };
        Self {
            pool: MarginPool::new(keys, params, now),
            oracle: FixedOracle {
                price: Fp96::one(),
                liquidation_price: Fp96::one(),
            },
            router: FixedPriceRouter {
                price: Fp96::one(),
                base_delta: 0,
                quote_delta: 0,
            },
            now,
            vault_base: 0,
            vault_quote: 0,
        }
    }

    /// Run one engine call atomically.
    pub fn run<T>(&mut self, f: impl FnOnce(&mut MarginPool, &mut OpContext) -> Result<T>) -> Result<T> {
        let snapshot = self.pool.clone();
        self.router.base_delta = 0;
        self.router.quote_delta = 0;

        let result = {
            let mut ctx = OpContext {
                now: self.now,
                oracle: &self.oracle,
                router: &mut self.router,
            };
            f(&mut self.pool, &mut ctx)
        };

        if result.is_err() {
            self.pool = snapshot;
        } else {
            self.vault_base = shift(self.vault_base, self.router.base_delta);
            self.vault_quote = shift(self.vault_quote, self.router.quote_delta);
        }
        self.router.base_delta = 0;
        self.router.quote_delta = 0;
        result
    }

    fn settle(&mut self, result: Result<Settlement>) -> Result<Settlement> {
        let settlement = result?;
        self.vault_base = (self.vault_base + settlement.base_in as u128).saturating_sub(settlement.base_out as u128);
        self.vault_quote = (self.vault_quote + settlement.quote_in as u128).saturating_sub(settlement.quote_out as u128);
        Ok(settlement)
    }

    // =========================================================================
    // Fallible Calls
    // =========================================================================

    pub fn try_deposit_base(&mut self, owner: Pubkey, amount: u64, long_amount: u64) -> Result<Settlement> {
        let result = self.run(|pool, ctx| pool.deposit_base(ctx, owner, amount, long_amount, Fp96::zero()));
        self.settle(result)
    }

    pub fn try_deposit_quote(&mut self, owner: Pubkey, amount: u64, short_amount: u64) -> Result<Settlement> {
        let result = self.run(|pool, ctx| pool.deposit_quote(ctx, owner, amount, short_amount, Fp96::zero()));
        self.settle(result)
    }

    pub fn try_withdraw_base(&mut self, owner: Pubkey, amount: u64) -> Result<Settlement> {
        let result = self.run(|pool, ctx| pool.withdraw_base(ctx, owner, amount));
        self.settle(result)
    }

    pub fn try_withdraw_quote(&mut self, owner: Pubkey, amount: u64) -> Result<Settlement> {
        let result = self.run(|pool, ctx| pool.withdraw_quote(ctx, owner, amount));
        self.settle(result)
    }

    pub fn try_short(&mut self, owner: Pubkey, base_amount: u64) -> Result<Settlement> {
        let result = self.run(|pool, ctx| pool.short(ctx, owner, base_amount, Fp96::zero()));
        self.settle(result)
    }

    pub fn try_long(&mut self, owner: Pubkey, base_amount: u64) -> Result<Settlement> {
        let result = self.run(|pool, ctx| pool.long(ctx, owner, base_amount, Fp96::zero()));
        self.settle(result)
    }

    pub fn try_close(&mut self, owner: Pubkey) -> Result<Settlement> {
        let result = self.run(|pool, ctx| pool.close_position(ctx, owner, Fp96::zero()));
        self.settle(result)
    }

    pub fn try_receive(&mut self, caller: Pubkey, target: Pubkey, quote_amount: u64, base_amount: u64) -> Result<Settlement> {
        let result = self.run(|pool, ctx| pool.receive_position(ctx, caller, target, quote_amount, base_amount));
        self.settle(result)
    }

    pub fn try_reinit(&mut self) -> Result<()> {
        self.run(|pool, ctx| pool.reinit(ctx, None).map(|_| ()))
    }

    pub fn try_shut_down(&mut self) -> Result<()> {
        self.run(|pool, ctx| pool.shut_down(ctx))
    }

    pub fn try_emergency_withdraw(&mut self, owner: Pubkey) -> Result<Settlement> {
        let result = self.run(|pool, _| pool.emergency_withdraw(owner));
        self.settle(result)
    }

    pub fn try_sync(&mut self) -> Result<(u128, u128)> {
        let base = self.vault_base as u64;
        let quote = self.vault_quote as u64;
        self.run(|pool, ctx| pool.sync_balances(ctx, base, quote))
    }

    // =========================================================================
    // Calls Expected to Succeed
    // =========================================================================

    pub fn lend(&mut self, owner: Pubkey, base: u64, quote: u64) {
        if base > 0 {
            self.deposit_base(owner, base);
        }
        if quote > 0 {
            self.deposit_quote(owner, quote);
        }
    }

    pub fn deposit_base(&mut self, owner: Pubkey, amount: u64) -> Settlement {
        self.try_deposit_base(owner, amount, 0).unwrap()
    }

    pub fn deposit_quote(&mut self, owner: Pubkey, amount: u64) -> Settlement {
        self.try_deposit_quote(owner, amount, 0).unwrap()
    }

    pub fn withdraw_base(&mut self, owner: Pubkey, amount: u64) -> Settlement {
        self.try_withdraw_base(owner, amount).unwrap()
    }

    pub fn withdraw_quote(&mut self, owner: Pubkey, amount: u64) -> Settlement {
        self.try_withdraw_quote(owner, amount).unwrap()
    }

    pub fn short(&mut self, owner: Pubkey, base_amount: u64) -> Settlement {
        self.try_short(owner, base_amount).unwrap()
    }

    pub fn long(&mut self, owner: Pubkey, base_amount: u64) -> Settlement {
        self.try_long(owner, base_amount).unwrap()
    }

    pub fn close(&mut self, owner: Pubkey) -> Settlement {
        self.try_close(owner).unwrap()
    }

    pub fn receive(&mut self, caller: Pubkey, target: Pubkey, quote_amount: u64, base_amount: u64) -> Settlement {
        self.try_receive(caller, target, quote_amount, base_amount).unwrap()
    }

    pub fn reinit(&mut self) {
        self.try_reinit().unwrap()
    }

    // =========================================================================
    // Environment
    // =========================================================================

    pub fn advance(&mut self, seconds: i64) {
        self.now += seconds;
    }

    /// Set regular, liquidation and venue price to `numerator / denominator`.
    pub fn set_price(&mut self, numerator: u128, denominator: u128) {
        let price = Fp96::from_ratio(numerator, denominator).unwrap();
        self.oracle.price = price;
        self.oracle.liquidation_price = price;
        self.router.price = price;
    }

    pub fn coefficients(&self) -> [Fp96; 6] {
        [
            self.pool.base_collateral_coeff,
            self.pool.base_debt_coeff,
            self.pool.quote_collateral_coeff,
            self.pool.quote_debt_coeff,
            self.pool.base_delev_coeff,
            self.pool.quote_delev_coeff,
        ]
    }

    pub fn base_collateral(&self, owner: Pubkey) -> u128 {
        self.pool.base_collateral_of(&self.pool.position(&owner)).unwrap()
    }

    pub fn quote_collateral(&self, owner: Pubkey) -> u128 {
        self.pool.quote_collateral_of(&self.pool.position(&owner)).unwrap()
    }

    /// Ledger, aggregates, heaps and vaults agree.
    pub fn assert_consistent(&self) {
        self.pool.check_aggregates().unwrap();
        self.pool.check_heaps().unwrap();
        let base = self.pool.base_balance().unwrap();
        let quote = self.pool.quote_balance().unwrap();
        assert!(
            base.abs_diff(self.vault_base) <= VAULT_TOLERANCE,
            "base balance {} vs vault {}",
            base,
            self.vault_base
        );
        assert!(
            quote.abs_diff(self.vault_quote) <= VAULT_TOLERANCE,
            "quote balance {} vs vault {}",
            quote,
            self.vault_quote
        );
    }
}

fn shift(value: u128, delta: i128) -> u128 {
    if delta >= 0 {
        value + delta as u128
    } else {
        value.saturating_sub(delta.unsigned_abs())
    }
}

/// Assert `result` failed with `expected`.
pub fn assert_error<T: std::fmt::Debug>(result: Result<T>, expected: MarginPoolError) {
    let err = result.unwrap_err();
    assert_eq!(err, error!(expected), "unexpected error {:?}", err);
}
