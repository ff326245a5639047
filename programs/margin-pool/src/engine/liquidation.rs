// =============================================================================
// Liquidation and Deleverage
// =============================================================================
// Two ways an over-leveraged position leaves its owner:
//
// - `receive_position`: a third party with no leverage takes it over,
//   paying in quote and/or base. A lending receiver pays with its own
//   collateral as well. Interest is accrued first but the sweep is skipped
//   so the position is still there to be received.
//
// - margin call (from the reinit sweep): the pool sells the collateral for
//   the debt asset through the venue. If the pool does not physically hold
//   enough of the collateral asset to sell (it is lent to the other side),
//   that part is deleveraged instead: it is cancelled against the opposite
//   side's debt, and the matching share of the position's debt is taken out
//   of the opposite side's collateral through the deleverage coefficient.
//   Both assets' `collateral - debt` are unchanged by a deleverage.
//
// Whatever the swap returns above or below the remaining debt is spread over
// all collateral holders of the debt asset through the collateral factor.
// =============================================================================

use anchor_lang::prelude::*;

use crate::engine::operations::{apply_rate, to_u64};
use crate::engine::venue::{OpContext, Settlement, SwapDirection};
use crate::error::MarginPoolError;
use crate::events::{Deleveraged, PositionMarginCalled, PositionReceived};
use crate::math::{mul_div, Fp96};
use crate::state::{MarginPool, Position, PositionKind};

impl MarginPool {
    // =========================================================================
    // Receive Position
    // =========================================================================

    /// Take over `target`'s over-leveraged position, paying `quote_amount`
    /// quote and `base_amount` base into it.
    ///
    /// A caller holding a lend position folds its collateral into the
    /// payment and ends up with the received position instead.
    pub fn receive_position(
        &mut self,
        ctx: &mut OpContext,
        caller: Pubkey,
        target: Pubkey,
        quote_amount: u64,
        base_amount: u64,
    ) -> Result<Settlement> {
        self.require_not_emergency()?;
        require_keys_neq!(caller, self.fee_holder, MarginPoolError::FeeHolderCannotTrade);
        require!(
            !self.position(&caller).is_leveraged(),
            MarginPoolError::PositionInitialized
        );

        self.accrue(ctx.now, ctx.oracle)?;

        let position = self.position(&target);
        match position.kind() {
            PositionKind::Uninitialized => return err!(MarginPoolError::UninitializedPosition),
            PositionKind::Lend => return err!(MarginPoolError::NotLiquidatable),
            _ => {}
        }
        let liquidation_price = self.liquidation_price(ctx.oracle)?;
        require!(
            self.has_bad_leverage(&position, liquidation_price, self.leverage_threshold())?,
            MarginPoolError::NotLiquidatable
        );

        let lent = self.position(&caller);
        let offered_base = self
            .base_collateral_of(&lent)?
            .checked_add(base_amount as u128)
            .ok_or(MarginPoolError::MathOverflow)?;
        let offered_quote = self
            .quote_collateral_of(&lent)?
            .checked_add(quote_amount as u128)
            .ok_or(MarginPoolError::MathOverflow)?;

        let price = self.base_price(ctx.oracle)?;
        let updated = match position {
            Position::Short { .. } => self.repay_short(&position, offered_base, offered_quote)?,
            _ => self.repay_long(&position, offered_quote, offered_base)?,
        };
        if updated.is_leveraged() {
            require!(
                !self.has_bad_leverage(&updated, price, self.leverage_threshold())?,
                MarginPoolError::BadLeverage
            );
            self.require_min_debt(&updated, price)?;
        }

        self.write_position(caller, Position::Uninitialized)?;
        self.transfer_position(&target, caller)?;
        self.write_position(caller, updated)?;

        msg!("Position of {} received by {}", target, caller);
        emit!(PositionReceived {
            liquidator: caller,
            target,
            base_amount,
            quote_amount,
            kind: updated.kind(),
        });

        Ok(Settlement {
            base_in: base_amount,
            quote_in: quote_amount,
            ..Settlement::default()
        })
    }

    // =========================================================================
    // Margin Call
    // =========================================================================

    /// Close `owner`'s leveraged position on the pool's behalf.
    pub(crate) fn margin_call(&mut self, ctx: &mut OpContext, owner: Pubkey, price: Fp96) -> Result<()> {
        let position = self.position(&owner);
        match position {
            Position::Short { .. } => self.margin_call_short(ctx, owner, position, price),
            Position::Long { .. } => self.margin_call_long(ctx, owner, position, price),
            _ => err!(MarginPoolError::HeapCorrupted),
        }
    }

    fn margin_call_short(&mut self, ctx: &mut OpContext, owner: Pubkey, position: Position, price: Fp96) -> Result<()> {
        let collateral = self.quote_collateral_of(&position)?;
        let debt = self.base_debt_of(&position)?;
        let quote_free = self.quote_balance()?;

        self.write_position(owner, Position::Uninitialized)?;

        // quote the pool cannot sell because longs borrowed it
        let stuck = collateral.saturating_sub(quote_free);
        let mut debt_left = debt;
        if stuck > 0 {
            let debt_share = mul_div(debt, stuck, collateral)?;
            self.deleverage_longs(stuck, debt_share)?;
            debt_left -= debt_share;
        }

        let swap_in = collateral - stuck;
        let mut received = 0u128;
        if swap_in > 0 {
            let fair = price.recip_mul_amount(swap_in)?;
            let min_out = fair - apply_rate(fair, self.params.mc_slippage)?;
            received = ctx.router.swap_exact_input(
                SwapDirection::QuoteToBase,
                to_u64(swap_in)?,
                to_u64(min_out)?,
            )? as u128;
            require!(received >= min_out, MarginPoolError::SlippageExceeded);
        }

        if received >= debt_left {
            self.scale_base_collateral(received - debt_left, true)?;
        } else {
            self.scale_base_collateral(debt_left - received, false)?;
        }

        msg!("Short of {} margin-called", owner);
        emit!(PositionMarginCalled {
            owner,
            kind: PositionKind::Short,
            collateral,
            debt,
            swapped_in: swap_in,
            swapped_out: received,
        });
        Ok(())
    }

    fn margin_call_long(&mut self, ctx: &mut OpContext, owner: Pubkey, position: Position, price: Fp96) -> Result<()> {
        let collateral = self.base_collateral_of(&position)?;
        let debt = self.quote_debt_of(&position)?;
        let base_free = self.base_balance()?;

        self.write_position(owner, Position::Uninitialized)?;

        let stuck = collateral.saturating_sub(base_free);
        let mut debt_left = debt;
        if stuck > 0 {
            let debt_share = mul_div(debt, stuck, collateral)?;
            self.deleverage_shorts(stuck, debt_share)?;
            debt_left -= debt_share;
        }

        let swap_in = collateral - stuck;
        let mut received = 0u128;
        if swap_in > 0 {
            let fair = price.mul_amount(swap_in)?;
            let min_out = fair - apply_rate(fair, self.params.mc_slippage)?;
            received = ctx.router.swap_exact_input(
                SwapDirection::BaseToQuote,
                to_u64(swap_in)?,
                to_u64(min_out)?,
            )? as u128;
            require!(received >= min_out, MarginPoolError::SlippageExceeded);
        }

        if received >= debt_left {
            self.scale_quote_collateral(received - debt_left, true)?;
        } else {
            self.scale_quote_collateral(debt_left - received, false)?;
        }

        msg!("Long of {} margin-called", owner);
        emit!(PositionMarginCalled {
            owner,
            kind: PositionKind::Long,
            collateral,
            debt,
            swapped_in: swap_in,
            swapped_out: received,
        });
        Ok(())
    }

    // =========================================================================
    // Deleverage
    // =========================================================================

    /// Cancel `quote_amount` of a removed short's collateral against long
    /// debt, and take `base_amount` of its debt out of long collateral.
    pub(crate) fn deleverage_longs(&mut self, quote_amount: u128, base_amount: u128) -> Result<()> {
        let discounted_debt = self.discounted_quote_debt;
        require!(discounted_debt > 0, MarginPoolError::BadLeverage);

        let debt_cut = Fp96::from_ratio(quote_amount, discounted_debt)?;
        require!(debt_cut < self.quote_debt_coeff, MarginPoolError::BadLeverage);
        let haircut = Fp96::from_ratio(base_amount, discounted_debt)?;

        let new_delev = self.base_delev_coeff.add(haircut)?;
        require!(
            new_delev.mul_amount(discounted_debt)?
                <= self
                    .base_collateral_coeff
                    .mul_amount(self.discounted_base_collateral)?,
            MarginPoolError::BadLeverage
        );

        self.quote_debt_coeff = self.quote_debt_coeff.sub(debt_cut)?;
        self.base_delev_coeff = new_delev;

        msg!("Deleverage: longs absorb {} quote debt, {} base collateral", quote_amount, base_amount);
        emit!(Deleveraged {
            absorbed_by: PositionKind::Long,
            debt_reduction: quote_amount,
            collateral_haircut: base_amount,
        });
        Ok(())
    }

    /// Mirror of `deleverage_longs` for a removed long.
    pub(crate) fn deleverage_shorts(&mut self, base_amount: u128, quote_amount: u128) -> Result<()> {
        let discounted_debt = self.discounted_base_debt;
        require!(discounted_debt > 0, MarginPoolError::BadLeverage);

        let debt_cut = Fp96::from_ratio(base_amount, discounted_debt)?;
        require!(debt_cut < self.base_debt_coeff, MarginPoolError::BadLeverage);
        let haircut = Fp96::from_ratio(quote_amount, discounted_debt)?;

        let new_delev = self.quote_delev_coeff.add(haircut)?;
        require!(
            new_delev.mul_amount(discounted_debt)?
                <= self
                    .quote_collateral_coeff
                    .mul_amount(self.discounted_quote_collateral)?,
            MarginPoolError::BadLeverage
        );

        self.base_debt_coeff = self.base_debt_coeff.sub(debt_cut)?;
        self.quote_delev_coeff = new_delev;

        msg!("Deleverage: shorts absorb {} base debt, {} quote collateral", base_amount, quote_amount);
        emit!(Deleveraged {
            absorbed_by: PositionKind::Short,
            debt_reduction: base_amount,
            collateral_haircut: quote_amount,
        });
        Ok(())
    }

    // =========================================================================
    // Collateral Factors
    // =========================================================================

    /// Grow (`gain`) or shrink every base collateral holder by `amount` in
    /// total. A gain with no holders goes to the fee holder.
    pub(crate) fn scale_base_collateral(&mut self, amount: u128, gain: bool) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let total = self.real_base_collateral()?;
        if total == 0 {
            require!(gain, MarginPoolError::BadLeverage);
            let discounted = self.base_collateral_coeff.recip_mul_amount(amount)?;
            return self.credit_fee_holder(discounted, 0);
        }
        let factor = collateral_factor(amount, total, gain)?;
        self.base_collateral_coeff = self.base_collateral_coeff.mul(factor)?;
        self.base_delev_coeff = self.base_delev_coeff.mul(factor)?;
        Ok(())
    }

    pub(crate) fn scale_quote_collateral(&mut self, amount: u128, gain: bool) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let total = self.real_quote_collateral()?;
        if total == 0 {
            require!(gain, MarginPoolError::BadLeverage);
            let discounted = self.quote_collateral_coeff.recip_mul_amount(amount)?;
            return self.credit_fee_holder(0, discounted);
        }
        let factor = collateral_factor(amount, total, gain)?;
        self.quote_collateral_coeff = self.quote_collateral_coeff.mul(factor)?;
        self.quote_delev_coeff = self.quote_delev_coeff.mul(factor)?;
        Ok(())
    }
}

/// `1 ± amount / total`. A loss that would wipe out all collateral fails.
fn collateral_factor(amount: u128, total: u128, gain: bool) -> Result<Fp96> {
    let delta = Fp96::from_ratio(amount, total)?;
    if gain {
        Fp96::one().add(delta)
    } else {
        require!(delta < Fp96::one(), MarginPoolError::BadLeverage);
        Fp96::one().sub(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::*;

    const DAY: i64 = 24 * 60 * 60;

    /// Lender with 10000/10000 and a short of about 19.9x.
    fn env_with_tight_short() -> TestEnv {
        let mut env = TestEnv::new();
        env.lend(LENDER, 10_000, 10_000);
        env.deposit_quote(BORROWER, 100);
        env.short(BORROWER, 1_890);
        env
    }

    /// Accrue up to `env.now` so later calls see no elapsed time.
    fn accrue_now(env: &mut TestEnv) {
        env.run(|pool, ctx| pool.accrue(ctx.now, ctx.oracle)).unwrap();
    }

    /// Real base collateral, base debt and quote collateral of the pool.
    fn real_totals(env: &TestEnv) -> (u128, u128, u128) {
        (
            env.pool.real_base_collateral().unwrap(),
            env.pool.real_base_debt().unwrap(),
            env.pool.real_quote_collateral().unwrap(),
        )
    }

    #[test]
    fn test_receive_position_after_interest_pushes_short_over_limit() {
        let mut env = env_with_tight_short();
        env.advance(20 * DAY);
        accrue_now(&mut env);
        let (base_before, debt_before, quote_before) = real_totals(&env);
        assert!(debt_before > 1_890);

        let settlement = env.receive(LIQUIDATOR, BORROWER, 356, 7_700);
        assert_eq!(settlement.base_in, 7_700);
        assert_eq!(settlement.quote_in, 356);

        assert!(!env.pool.position(&BORROWER).is_initialized());
        let received = env.pool.position(&LIQUIDATOR);
        assert_eq!(received.kind(), PositionKind::Lend);
        assert_eq!(env.pool.discounted_base_debt, 0);
        assert!(env.pool.short_heap.is_empty());

        // 7700 base minus the grown debt, 1990 + 356 quote
        let base = env.base_collateral(LIQUIDATOR);
        assert!(base > 5_790 && base < 5_810, "base {}", base);
        assert!(env.quote_collateral(LIQUIDATOR).abs_diff(2_346) <= 1);

        // the base paid in clears the whole debt and the rest lands as
        // collateral; the quote paid in is added to quote collateral
        let (base_after, debt_after, quote_after) = real_totals(&env);
        assert_eq!(debt_after, 0);
        assert!((base_after - base_before).abs_diff(7_700 - debt_before) <= 2);
        assert!((quote_after - quote_before).abs_diff(356) <= 1);
        env.assert_consistent();
    }

    #[test]
    fn test_receive_partial_repay_moves_totals_by_amounts_paid() {
        let mut env = env_with_tight_short();
        env.advance(60 * DAY);
        accrue_now(&mut env);
        let (base_before, debt_before, quote_before) = real_totals(&env);

        env.receive(LIQUIDATOR, BORROWER, 200, 300);

        let received = env.pool.position(&LIQUIDATOR);
        assert_eq!(received.kind(), PositionKind::Short);
        assert_eq!(env.pool.short_heap.peek_root().unwrap().account, LIQUIDATOR);

        let (base_after, debt_after, quote_after) = real_totals(&env);
        assert!(base_after.abs_diff(base_before) <= 1);
        assert!((debt_before - debt_after).abs_diff(300) <= 1);
        assert!((quote_after - quote_before).abs_diff(200) <= 1);
        env.assert_consistent();
    }

    #[test]
    fn test_lender_receives_with_its_collateral() {
        let mut env = env_with_tight_short();
        env.deposit_base(LIQUIDATOR, 5_000);
        env.advance(20 * DAY);
        accrue_now(&mut env);
        let lent = env.base_collateral(LIQUIDATOR);
        let debt = env.pool.real_base_debt().unwrap();

        let settlement = env.receive(LIQUIDATOR, BORROWER, 356, 2_700);
        assert_eq!(settlement.base_in, 2_700);
        assert_eq!(settlement.quote_in, 356);

        let received = env.pool.position(&LIQUIDATOR);
        assert_eq!(received.kind(), PositionKind::Lend);
        assert!(!env.pool.position(&BORROWER).is_initialized());
        assert_eq!(env.pool.discounted_base_debt, 0);

        // the 5000 lent plus 2700 paid in, minus the debt taken over
        let base = env.base_collateral(LIQUIDATOR);
        assert!(base.abs_diff(lent + 2_700 - debt) <= 2, "base {}", base);
        assert!(env.quote_collateral(LIQUIDATOR).abs_diff(2_346) <= 1);
        env.assert_consistent();
    }

    #[test]
    fn test_receive_rejects_healthy_position() {
        let mut env = env_with_tight_short();
        assert_error(
            env.try_receive(LIQUIDATOR, BORROWER, 356, 7_700),
            MarginPoolError::NotLiquidatable,
        );
        assert_error(
            env.try_receive(LIQUIDATOR, LENDER, 0, 10),
            MarginPoolError::NotLiquidatable,
        );
    }

    #[test]
    fn test_receive_rejects_leveraged_receiver() {
        let mut env = env_with_tight_short();
        env.deposit_base(LONGER, 100);
        env.long(LONGER, 400);
        env.advance(20 * DAY);
        assert_error(
            env.try_receive(LONGER, BORROWER, 356, 7_700),
            MarginPoolError::PositionInitialized,
        );
        assert_eq!(env.pool.position(&LONGER).kind(), PositionKind::Long);
        assert_error(
            env.try_receive(FEE_HOLDER, BORROWER, 356, 7_700),
            MarginPoolError::FeeHolderCannotTrade,
        );
    }

    #[test]
    fn test_receive_partial_repay_must_be_healthy() {
        let mut env = env_with_tight_short();
        env.advance(60 * DAY);
        accrue_now(&mut env);

        // still above 20x after paying 5 of about 1914 base debt
        let position = env.pool.position(&BORROWER);
        let leverage = env.pool.position_leverage(&position, Fp96::one()).unwrap().unwrap();
        assert!(leverage > Fp96::from_integer(22), "leverage {:?}", leverage);

        assert_error(env.try_receive(LIQUIDATOR, BORROWER, 0, 5), MarginPoolError::BadLeverage);
        assert_eq!(env.pool.position(&BORROWER), position);
        assert!(!env.pool.position(&LIQUIDATOR).is_initialized());
    }

    #[test]
    fn test_margin_call_sells_collateral_and_spreads_loss() {
        let mut env = TestEnv::new();
        env.lend(LENDER, 10_000, 10_000);
        env.deposit_quote(BORROWER, 100);
        env.short(BORROWER, 1_800);

        env.set_price(106, 100);
        env.reinit();

        assert!(!env.pool.position(&BORROWER).is_initialized());
        assert!(env.pool.short_heap.is_empty());
        // 1900 quote bought 1792 base against 1800 debt
        assert!(env.base_collateral(LENDER).abs_diff(9_992) <= 1);
        assert!(env.quote_collateral(LENDER).abs_diff(10_000) <= 1);
        env.assert_consistent();
    }

    #[test]
    fn test_margin_call_gain_goes_to_lenders() {
        let mut env = TestEnv::new();
        env.lend(LENDER, 10_000, 10_000);
        env.deposit_quote(BORROWER, 100);
        env.short(BORROWER, 1_800);

        // 19x at the regular price, over the limit at the liquidation price
        env.oracle.liquidation_price = Fp96::from_ratio(1_004, 1_000).unwrap();
        env.reinit();

        assert!(!env.pool.position(&BORROWER).is_initialized());
        // the venue still fills at 1.0: 1900 base for 1800 debt
        assert!(env.base_collateral(LENDER).abs_diff(10_100) <= 1);
        env.assert_consistent();
    }

    #[test]
    fn test_deleverage_when_pool_holds_no_free_quote() {
        let mut env = TestEnv::new();
        env.lend(LENDER, 10_000, 500);
        env.deposit_quote(BORROWER, 100);
        env.short(BORROWER, 1_000);
        env.deposit_base(LONGER, 400);
        env.long(LONGER, 1_600);
        assert_eq!(env.pool.quote_balance().unwrap(), 0);

        env.set_price(120, 100);
        env.reinit();

        // the short's 1100 quote was all lent to the long: it is cancelled
        // against long debt and the short's 1000 base debt comes out of the
        // long's base collateral
        assert!(!env.pool.position(&BORROWER).is_initialized());
        assert!(env.base_collateral(LENDER).abs_diff(10_000) <= 1);
        assert!(env.quote_collateral(LENDER).abs_diff(500) <= 1);

        let long = env.pool.position(&LONGER);
        assert!(env.pool.base_collateral_of(&long).unwrap().abs_diff(1_000) <= 1);
        assert!(env.pool.quote_debt_of(&long).unwrap().abs_diff(500) <= 1);
        assert!(!env.pool.base_delev_coeff.is_zero());
        env.assert_consistent();
    }

    #[test]
    fn test_deleverage_needs_opposite_debt() {
        let mut env = TestEnv::new();
        env.lend(LENDER, 1_000, 1_000);
        assert_error(env.pool.deleverage_longs(100, 100), MarginPoolError::BadLeverage);
        assert_error(env.pool.deleverage_shorts(100, 100), MarginPoolError::BadLeverage);
    }

    #[test]
    fn test_collateral_loss_cannot_exceed_holdings() {
        let mut env = TestEnv::new();
        env.lend(LENDER, 1_000, 0);
        assert_error(env.pool.scale_base_collateral(1_000, false), MarginPoolError::BadLeverage);
        env.pool.scale_base_collateral(500, false).unwrap();
        assert!(env.base_collateral(LENDER).abs_diff(500) <= 1);
    }
}
