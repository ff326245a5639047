// =============================================================================
// Reinit: Interest Accrual and Margin-Call Sweep
// =============================================================================
// Every mutating call starts here. In order:
//
// 1. dt = now - last_reinit_timestamp (accrual is skipped when dt == 0)
// 2. system leverage is measured on the pre-accrual state
// 3. each side accrues interest; debt also grows by the protocol fee, and
//    that extra debt is credited to the fee holder as collateral
// 4. heap roots over the threshold at the liquidation price are margin-called
// 5. pool solvency is reported (leverage-increasing calls check it)
// 6. system leverage is refreshed and clamped
//
// Accrual keeps `collateral - debt` of each asset unchanged: the interest
// added to debt is added to collateral through the collateral factor.
// =============================================================================

use anchor_lang::prelude::*;

use crate::constants::{SECONDS_IN_YEAR, WHOLE_ONE};
use crate::engine::venue::{OpContext, PriceOracle};
use crate::error::MarginPoolError;
use crate::events::InterestAccrued;
use crate::math::{mul_div, mul_div_rem, Fp96, Q96};
use crate::state::{HeapNode, MarginPool};

/// What a reinit did beyond accrual.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReinitOutcome {
    /// Positions margin-called by the sweep
    pub margin_calls: u32,
    /// The account that triggered the call was among them
    pub caller_margin_called: bool,
}

/// Oracle prices must be non-zero.
pub(crate) fn checked_price(price: Fp96) -> Result<Fp96> {
    require!(!price.is_zero(), MarginPoolError::InvalidPrice);
    Ok(price)
}

/// Fee for `discounted_debt` growing by `debt_growth`, as discounted
/// collateral at `collateral_coeff`, floored once. The dropped fraction of a
/// unit accumulates in `carry` (Q96) and is paid when it reaches a whole unit.
fn discounted_fee(debt_growth: Fp96, discounted_debt: u128, collateral_coeff: Fp96, carry: &mut u128) -> Result<u128> {
    let (whole, remainder) = mul_div_rem(debt_growth.inner, discounted_debt, collateral_coeff.inner)?;
    let fraction = mul_div(remainder, Q96, collateral_coeff.inner)?;
    let pending = carry.checked_add(fraction).ok_or(MarginPoolError::MathOverflow)?;
    if pending >= Q96 {
        *carry = pending - Q96;
        return whole
            .checked_add(1)
            .ok_or_else(|| error!(MarginPoolError::MathOverflow));
    }
    *carry = pending;
    Ok(whole)
}

/// `rate / WHOLE_ONE * multiplier / SECONDS_IN_YEAR` as a Q96 per-second rate.
fn per_second_rate(rate: u32, multiplier: Fp96) -> Result<Fp96> {
    let denominator = (WHOLE_ONE as u128)
        .checked_mul(SECONDS_IN_YEAR as u128)
        .ok_or(MarginPoolError::MathOverflow)?;
    Ok(Fp96::from_inner(mul_div(multiplier.inner, rate as u128, denominator)?))
}

impl MarginPool {
    /// Regular price at the configured lookback.
    pub fn base_price(&self, oracle: &dyn PriceOracle) -> Result<Fp96> {
        checked_price(oracle.base_price(self.params.price_seconds_ago)?)
    }

    /// Liquidation price at the margin-call lookback.
    pub fn liquidation_price(&self, oracle: &dyn PriceOracle) -> Result<Fp96> {
        checked_price(oracle.liquidation_price(self.params.price_seconds_ago_mc)?)
    }

    /// Full reinit. `caller` is reported back if it gets margin-called.
    pub fn reinit(&mut self, ctx: &mut OpContext, caller: Option<&Pubkey>) -> Result<ReinitOutcome> {
        let price = self.base_price(ctx.oracle)?;
        self.accrue_interest(ctx.now, price)?;

        let outcome = self.margin_call_sweep(ctx, caller)?;

        if self.is_unsafe()? {
            msg!("Pool debt exceeds collateral, leverage is frozen");
        }
        self.refresh_system_leverage(price)?;
        Ok(outcome)
    }

    /// Accrual without the sweep, for calls that must see positions as they
    /// are (liquidation by a third party, shutdown, parameter changes).
    pub fn accrue(&mut self, now: i64, oracle: &dyn PriceOracle) -> Result<()> {
        let price = self.base_price(oracle)?;
        self.accrue_interest(now, price)?;
        self.refresh_system_leverage(price)
    }

    fn refresh_system_leverage(&mut self, price: Fp96) -> Result<()> {
        let (short_leverage, long_leverage) = self.compute_system_leverage(price)?;
        self.short_leverage = short_leverage;
        self.long_leverage = long_leverage;
        Ok(())
    }

    /// Steps 1-3. Returns false when no time has passed.
    pub fn accrue_interest(&mut self, now: i64, price: Fp96) -> Result<bool> {
        require!(
            now >= self.last_reinit_timestamp,
            MarginPoolError::InvalidTimestamp
        );
        let dt = (now - self.last_reinit_timestamp) as u64;
        if dt == 0 {
            return Ok(false);
        }

        // leverage before this accrual drives the rate
        let (short_leverage, long_leverage) = self.compute_system_leverage(price)?;

        let fee_rate = per_second_rate(self.params.fee, Fp96::one())?;
        let fee_factor = Fp96::one().add(fee_rate)?.pow_taylor(dt)?;

        let mut fee_base = 0;
        if self.discounted_base_collateral != 0 {
            let rate = per_second_rate(self.params.interest_rate, short_leverage)?;
            let accrued = Fp96::one().add(rate)?.pow_taylor(dt)?;
            fee_base = self.accrue_base_side(accrued, fee_factor)?;
        }

        let mut fee_quote = 0;
        if self.discounted_quote_collateral != 0 {
            let rate = per_second_rate(self.params.interest_rate, long_leverage)?;
            let accrued = Fp96::one().add(rate)?.pow_taylor(dt)?;
            fee_quote = self.accrue_quote_side(accrued, fee_factor)?;
        }

        self.credit_fee_holder(fee_base, fee_quote)?;
        self.last_reinit_timestamp = now;

        emit!(InterestAccrued {
            elapsed_seconds: dt,
            base_collateral_coeff: self.base_collateral_coeff.inner,
            base_debt_coeff: self.base_debt_coeff.inner,
            quote_collateral_coeff: self.quote_collateral_coeff.inner,
            quote_debt_coeff: self.quote_debt_coeff.inner,
            fee_discounted_base: fee_base,
            fee_discounted_quote: fee_quote,
        });
        Ok(true)
    }

    /// Grow base debt (shorts) and base collateral. Returns the fee as
    /// discounted base collateral for the fee holder.
    fn accrue_base_side(&mut self, accrued: Fp96, fee_factor: Fp96) -> Result<u128> {
        let real_debt = self.real_base_debt()?;
        let real_collateral = self.real_base_collateral()?;

        if real_collateral != 0 {
            let growth = mul_div(accrued.sub(Fp96::one())?.inner, real_debt, real_collateral)?;
            let factor = Fp96::one().add(Fp96::from_inner(growth))?;
            self.base_collateral_coeff = self.base_collateral_coeff.mul(factor)?;
            self.base_delev_coeff = self.base_delev_coeff.mul(factor)?;
        }

        let with_interest = self.base_debt_coeff.mul(accrued)?;
        let with_fee = with_interest.mul(fee_factor)?;
        self.base_debt_coeff = with_fee;

        discounted_fee(
            with_fee.sub(with_interest)?,
            self.discounted_base_debt,
            self.base_collateral_coeff,
            &mut self.base_fee_carry,
        )
    }

    /// Grow quote debt (longs) and quote collateral.
    fn accrue_quote_side(&mut self, accrued: Fp96, fee_factor: Fp96) -> Result<u128> {
        let real_debt = self.real_quote_debt()?;
        let real_collateral = self.real_quote_collateral()?;

        if real_collateral != 0 {
            let growth = mul_div(accrued.sub(Fp96::one())?.inner, real_debt, real_collateral)?;
            let factor = Fp96::one().add(Fp96::from_inner(growth))?;
            self.quote_collateral_coeff = self.quote_collateral_coeff.mul(factor)?;
            self.quote_delev_coeff = self.quote_delev_coeff.mul(factor)?;
        }

        let with_interest = self.quote_debt_coeff.mul(accrued)?;
        let with_fee = with_interest.mul(fee_factor)?;
        self.quote_debt_coeff = with_fee;

        discounted_fee(
            with_fee.sub(with_interest)?,
            self.discounted_quote_debt,
            self.quote_collateral_coeff,
            &mut self.quote_fee_carry,
        )
    }

    /// Step 4. Margin-call heap roots until both are healthy.
    fn margin_call_sweep(&mut self, ctx: &mut OpContext, caller: Option<&Pubkey>) -> Result<ReinitOutcome> {
        let mut outcome = ReinitOutcome::default();
        if self.short_heap.is_empty() && self.long_heap.is_empty() {
            return Ok(outcome);
        }

        let price = self.liquidation_price(ctx.oracle)?;
        let threshold = self.leverage_threshold();

        // every iteration removes one position
        let bound = self.short_heap.len() + self.long_heap.len();
        for _ in 0..bound {
            let Some(node) = self.unhealthy_root(price, threshold)? else {
                break;
            };
            self.margin_call(ctx, node.account, price)?;
            outcome.margin_calls += 1;
            if caller == Some(&node.account) {
                outcome.caller_margin_called = true;
            }
        }
        Ok(outcome)
    }

    fn unhealthy_root(&self, price: Fp96, threshold: u8) -> Result<Option<HeapNode>> {
        for root in [self.short_heap.peek_root(), self.long_heap.peek_root()]
            .into_iter()
            .flatten()
        {
            let position = self.ledger.get(&root.account);
            if self.has_bad_leverage(&position, price, threshold)? {
                return Ok(Some(root));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_POSITIONS;
    use crate::engine::testing::*;

    #[test]
    fn test_per_second_rate_matches_yearly() {
        let rate = per_second_rate(WHOLE_ONE, Fp96::one()).unwrap();
        let year = rate.mul_amount(SECONDS_IN_YEAR as u128 * 1_000_000).unwrap();
        assert!(year.abs_diff(1_000_000) <= 1);
    }

    #[test]
    fn test_zero_elapsed_is_noop() {
        let mut env = TestEnv::new();
        env.lend(LENDER, 10_000, 10_000);
        env.deposit_quote(BORROWER, 100);
        env.short(BORROWER, 1_500);

        let before = env.coefficients();
        env.reinit();
        env.reinit();
        assert_eq!(env.coefficients(), before);
    }

    #[test]
    fn test_accrual_only_grows_coefficients() {
        let mut env = TestEnv::new();
        env.lend(LENDER, 10_000, 10_000);
        env.deposit_quote(BORROWER, 100);
        env.short(BORROWER, 1_500);
        env.deposit_base(LONGER, 100);
        env.long(LONGER, 900);

        let mut previous = env.coefficients();
        for _ in 0..5 {
            env.advance(3 * 24 * 60 * 60);
            env.reinit();
            let current = env.coefficients();
            for (old, new) in previous.iter().zip(current.iter()) {
                assert!(new >= old);
            }
            previous = current;
        }
        assert!(env.pool.base_debt_coeff > Fp96::one());
        assert!(env.pool.quote_debt_coeff > Fp96::one());
        env.assert_consistent();
    }

    #[test]
    fn test_accrual_preserves_balances_and_pays_fee_holder() {
        let mut env = TestEnv::new();
        env.lend(LENDER, 10_000, 10_000);
        env.deposit_quote(BORROWER, 100);
        env.short(BORROWER, 1_500);

        let base_before = env.pool.base_balance().unwrap();
        env.advance(30 * 24 * 60 * 60);
        env.reinit();
        let base_after = env.pool.base_balance().unwrap();
        assert!(base_before.abs_diff(base_after) <= 2);

        let fee_position = env.pool.position(&FEE_HOLDER);
        assert!(fee_position.discounted_base_collateral() > 0);
    }

    #[test]
    fn test_fee_accrues_when_reinit_runs_every_minute() {
        let setup = || {
            let mut env = TestEnv::new();
            env.lend(LENDER, 10_000_000, 10_000_000);
            env.deposit_quote(BORROWER, 100_000);
            env.short(BORROWER, 1_500_000);
            env
        };

        let mut busy = setup();
        for _ in 0..24 * 60 {
            busy.advance(60);
            busy.reinit();
        }
        let mut idle = setup();
        idle.advance(24 * 60 * 60);
        idle.reinit();

        // 1% a year on 1.5M of debt is about 41 a day; each minute owes
        // well under one unit
        let idle_fee = idle.base_collateral(FEE_HOLDER);
        let busy_fee = busy.base_collateral(FEE_HOLDER);
        assert!((40..=42).contains(&idle_fee), "idle fee {}", idle_fee);
        assert!(busy_fee.abs_diff(idle_fee) <= 1, "busy fee {} vs {}", busy_fee, idle_fee);
        assert!(busy.pool.base_fee_carry < Q96);
        busy.assert_consistent();
    }

    #[test]
    fn test_fee_is_credited_when_ledger_is_full() {
        let mut env = TestEnv::new();
        env.lend(LENDER, 10_000, 10_000);
        env.deposit_quote(BORROWER, 100);
        env.short(BORROWER, 1_500);
        for i in 0..MAX_POSITIONS - 2 {
            let mut key = [200u8; 32];
            key[1] = i as u8;
            env.deposit_quote(Pubkey::new_from_array(key), 10);
        }
        assert_eq!(env.pool.user_position_count(), MAX_POSITIONS);
        assert_error(env.try_deposit_quote(LONGER, 10, 0), MarginPoolError::PoolFull);

        env.advance(30 * 24 * 60 * 60);
        env.reinit();
        env.withdraw_quote(LENDER, 10);
        assert!(env.base_collateral(FEE_HOLDER) > 0);
        env.assert_consistent();
    }

    #[test]
    fn test_interest_scales_with_system_leverage() {
        let run = |short_amount: u64| {
            let mut env = TestEnv::new();
            env.lend(LENDER, 100_000, 100_000);
            env.deposit_quote(BORROWER, 1_000);
            env.short(BORROWER, short_amount);
            env.advance(10 * 24 * 60 * 60);
            env.reinit();
            env.pool.base_debt_coeff
        };
        assert!(run(15_000) > run(5_000));
    }

    #[test]
    fn test_clock_going_back_is_rejected() {
        let mut env = TestEnv::new();
        env.advance(100);
        env.reinit();
        env.now -= 1;
        assert!(env.try_reinit().is_err());
    }
}
