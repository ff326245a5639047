// =============================================================================
// Recovery, Emergency and Admin Transitions
// =============================================================================
// Recovery is a reversible admin switch: stricter margin-call threshold and
// no new leverage. Emergency is entered once, by `shut_down`, when one side's
// debt is worth more than the collateral backing it:
//
// - ShortEmergency: P * base debt > quote collateral. All of the pool's quote
//   is sold for base and base collateral holders split the base.
// - LongEmergency: quote debt > P * base collateral. All base is sold for
//   quote and quote collateral holders split the quote.
//
// `emergency_withdraw_coeff` is the payout per discounted collateral unit of
// the surviving asset, frozen at shutdown.
// =============================================================================

use anchor_lang::prelude::*;

use crate::engine::operations::{apply_rate, to_u64};
use crate::engine::venue::{OpContext, PriceOracle, Settlement, SwapDirection};
use crate::error::MarginPoolError;
use crate::events::{BalancesSynced, EmergencyWithdrawn, ModeChanged, ParametersUpdated};
use crate::math::Fp96;
use crate::state::{MarginPool, MarginPoolParams, PoolMode, Position};

impl MarginPool {
    /// Toggle recovery mode. Not available once the pool is shut down.
    pub fn set_recovery_mode(&mut self, enabled: bool) -> Result<()> {
        self.require_not_emergency()?;
        self.mode = if enabled {
            PoolMode::Recovery
        } else {
            PoolMode::Regular
        };
        emit!(ModeChanged {
            mode: self.mode,
            emergency_withdraw_coeff: 0,
        });
        Ok(())
    }

    /// Replace the parameters, accruing under the old ones first.
    pub fn set_parameters(&mut self, now: i64, oracle: &dyn PriceOracle, params: MarginPoolParams) -> Result<()> {
        params.validate()?;
        if !self.is_emergency() {
            self.accrue(now, oracle)?;
        }
        self.params = params;
        emit!(ParametersUpdated { params });
        Ok(())
    }

    /// Freeze the pool into the emergency mode matching the insolvent side.
    pub fn shut_down(&mut self, ctx: &mut OpContext) -> Result<()> {
        self.require_not_emergency()?;
        self.accrue(ctx.now, ctx.oracle)?;

        let price = self.base_price(ctx.oracle)?;
        let base_debt_value = price.mul_amount(self.real_base_debt()?)?;
        let base_collateral_value = price.mul_amount(self.real_base_collateral()?)?;

        if base_debt_value > self.real_quote_collateral()? {
            // sell all quote for base
            let quote_held = self.quote_balance()?;
            let mut received = 0u128;
            if quote_held > 0 {
                let fair = price.recip_mul_amount(quote_held)?;
                let min_out = fair - apply_rate(fair, self.params.mc_slippage)?;
                received = ctx.router.swap_exact_input(
                    SwapDirection::QuoteToBase,
                    to_u64(quote_held)?,
                    to_u64(min_out)?,
                )? as u128;
                require!(received >= min_out, MarginPoolError::SlippageExceeded);
            }
            let base_total = self
                .base_balance()?
                .checked_add(received)
                .ok_or(MarginPoolError::MathOverflow)?;
            self.emergency_withdraw_coeff = if self.discounted_base_collateral == 0 {
                Fp96::zero()
            } else {
                Fp96::from_ratio(base_total, self.discounted_base_collateral)?
            };
            self.mode = PoolMode::ShortEmergency;
        } else if self.real_quote_debt()? > base_collateral_value {
            let base_held = self.base_balance()?;
            let mut received = 0u128;
            if base_held > 0 {
                let fair = price.mul_amount(base_held)?;
                let min_out = fair - apply_rate(fair, self.params.mc_slippage)?;
                received = ctx.router.swap_exact_input(
                    SwapDirection::BaseToQuote,
                    to_u64(base_held)?,
                    to_u64(min_out)?,
                )? as u128;
                require!(received >= min_out, MarginPoolError::SlippageExceeded);
            }
            let quote_total = self
                .quote_balance()?
                .checked_add(received)
                .ok_or(MarginPoolError::MathOverflow)?;
            self.emergency_withdraw_coeff = if self.discounted_quote_collateral == 0 {
                Fp96::zero()
            } else {
                Fp96::from_ratio(quote_total, self.discounted_quote_collateral)?
            };
            self.mode = PoolMode::LongEmergency;
        } else {
            return err!(MarginPoolError::NotEmergency);
        }

        msg!("Pool shut down into {:?}", self.mode);
        emit!(ModeChanged {
            mode: self.mode,
            emergency_withdraw_coeff: self.emergency_withdraw_coeff.inner,
        });
        Ok(())
    }

    /// One-shot proportional payout after shutdown. The position is deleted.
    pub fn emergency_withdraw(&mut self, caller: Pubkey) -> Result<Settlement> {
        let position = self.position(&caller);
        require!(position.is_initialized(), MarginPoolError::UninitializedPosition);

        let settlement = match self.mode {
            PoolMode::ShortEmergency => {
                require!(
                    !matches!(position, Position::Short { .. }),
                    MarginPoolError::ShortEmergency
                );
                let amount = self
                    .emergency_withdraw_coeff
                    .mul_amount(position.discounted_base_collateral())?;
                Settlement {
                    base_out: to_u64(amount)?,
                    ..Settlement::default()
                }
            }
            PoolMode::LongEmergency => {
                require!(
                    !matches!(position, Position::Long { .. }),
                    MarginPoolError::LongEmergency
                );
                let amount = self
                    .emergency_withdraw_coeff
                    .mul_amount(position.discounted_quote_collateral())?;
                Settlement {
                    quote_out: to_u64(amount)?,
                    ..Settlement::default()
                }
            }
            _ => return err!(MarginPoolError::NotEmergency),
        };

        self.write_position(caller, Position::Uninitialized)?;

        emit!(EmergencyWithdrawn {
            owner: caller,
            base_amount: settlement.base_out,
            quote_amount: settlement.quote_out,
        });
        Ok(settlement)
    }

    /// Hand vault surplus above the threshold to collateral holders.
    ///
    /// `base_vault` and `quote_vault` are the actual token balances.
    pub fn sync_balances(&mut self, ctx: &mut OpContext, base_vault: u64, quote_vault: u64) -> Result<(u128, u128)> {
        self.require_not_emergency()?;
        self.reinit(ctx, None)?;

        let threshold = self.params.balance_sync_threshold as u128;

        let expected_base = self
            .base_balance()?
            .checked_add(threshold)
            .ok_or(MarginPoolError::MathOverflow)?;
        let base_surplus = (base_vault as u128).saturating_sub(expected_base);
        self.scale_base_collateral(base_surplus, true)?;

        let expected_quote = self
            .quote_balance()?
            .checked_add(threshold)
            .ok_or(MarginPoolError::MathOverflow)?;
        let quote_surplus = (quote_vault as u128).saturating_sub(expected_quote);
        self.scale_quote_collateral(quote_surplus, true)?;

        if base_surplus > 0 || quote_surplus > 0 {
            emit!(BalancesSynced {
                base_surplus,
                quote_surplus,
            });
        }
        Ok((base_surplus, quote_surplus))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::*;

    #[test]
    fn test_shut_down_needs_an_insolvent_side() {
        let mut env = TestEnv::new();
        env.lend(LENDER, 1_000, 1_000);
        env.deposit_quote(BORROWER, 100);
        env.short(BORROWER, 500);
        assert_error(env.try_shut_down(), MarginPoolError::NotEmergency);
        assert_eq!(env.pool.mode, PoolMode::Regular);
    }

    #[test]
    fn test_short_emergency_pays_base_collateral() {
        let mut env = TestEnv::new();
        env.lend(LENDER, 1_000, 0);
        env.deposit_quote(BORROWER, 100);
        env.short(BORROWER, 1_000);

        // 1000 base debt is now worth 2000 quote against 1100 collateral
        env.set_price(2, 1);
        env.try_shut_down().unwrap();
        assert_eq!(env.pool.mode, PoolMode::ShortEmergency);

        assert_error(env.try_deposit_quote(LENDER, 10, 0), MarginPoolError::EmergencyMode);
        assert_error(env.try_emergency_withdraw(BORROWER), MarginPoolError::ShortEmergency);

        let settlement = env.try_emergency_withdraw(LENDER).unwrap();
        assert!(settlement.base_out.abs_diff(550) <= 1);
        assert_eq!(settlement.quote_out, 0);
        assert!(!env.pool.position(&LENDER).is_initialized());
        assert_error(env.try_emergency_withdraw(LENDER), MarginPoolError::UninitializedPosition);
    }

    #[test]
    fn test_long_emergency_pays_quote_collateral() {
        let mut env = TestEnv::new();
        env.lend(LENDER, 0, 1_000);
        env.deposit_base(LONGER, 100);
        env.long(LONGER, 1_000);

        // 1100 base collateral is now worth 550 quote against 1000 debt
        env.set_price(1, 2);
        env.try_shut_down().unwrap();
        assert_eq!(env.pool.mode, PoolMode::LongEmergency);

        assert_error(env.try_emergency_withdraw(LONGER), MarginPoolError::LongEmergency);
        let settlement = env.try_emergency_withdraw(LENDER).unwrap();
        assert!(settlement.quote_out.abs_diff(550) <= 1);
        assert_eq!(settlement.base_out, 0);
    }

    #[test]
    fn test_emergency_withdraw_outside_emergency() {
        let mut env = TestEnv::new();
        env.lend(LENDER, 1_000, 0);
        assert_error(env.try_emergency_withdraw(LENDER), MarginPoolError::NotEmergency);
    }

    #[test]
    fn test_shut_down_only_once() {
        let mut env = TestEnv::new();
        env.lend(LENDER, 1_000, 0);
        env.deposit_quote(BORROWER, 100);
        env.short(BORROWER, 1_000);
        env.set_price(2, 1);
        env.try_shut_down().unwrap();

        assert_error(env.try_shut_down(), MarginPoolError::EmergencyMode);
        assert_error(env.pool.set_recovery_mode(true), MarginPoolError::EmergencyMode);
    }

    #[test]
    fn test_recovery_threshold_margin_calls_earlier() {
        let mut env = TestEnv::new();
        env.lend(LENDER, 10_000, 10_000);
        env.deposit_quote(BORROWER, 100);
        // 17x: fine under 20, over the recovery threshold of 15
        env.short(BORROWER, 1_600);

        env.pool.set_recovery_mode(true).unwrap();
        assert_eq!(env.pool.leverage_threshold(), env.pool.params.recovery_max_leverage);
        env.reinit();
        assert!(!env.pool.position(&BORROWER).is_initialized());
        env.assert_consistent();

        env.pool.set_recovery_mode(false).unwrap();
        assert_eq!(env.pool.mode, PoolMode::Regular);
    }

    #[test]
    fn test_set_parameters_validates() {
        let mut env = TestEnv::new();
        let now = env.now;
        let bad = MarginPoolParams {
            max_leverage: 1,
            ..test_params()
        };
        assert_error(
            env.pool.set_parameters(now, &env.oracle, bad),
            MarginPoolError::InvalidParameter,
        );

        let good = MarginPoolParams {
            interest_rate: 100_000,
            ..test_params()
        };
        env.pool.set_parameters(now, &env.oracle, good).unwrap();
        assert_eq!(env.pool.params.interest_rate, 100_000);
    }

    #[test]
    fn test_sync_distributes_surplus_above_threshold() {
        let mut env = TestEnv::with_params(MarginPoolParams {
            balance_sync_threshold: 100,
            ..test_params()
        });
        env.lend(LENDER, 1_000, 1_000);
        env.vault_base += 500;

        assert_eq!(env.try_sync().unwrap(), (400, 0));
        assert!(env.base_collateral(LENDER).abs_diff(1_400) <= 1);
        assert_eq!(env.quote_collateral(LENDER), 1_000);

        // the collateral factor floors, so at most one unit is left over
        let (base, quote) = env.try_sync().unwrap();
        assert!(base <= 1, "base surplus {}", base);
        assert_eq!(quote, 0);
        assert!(env.base_collateral(LENDER).abs_diff(1_400) <= 1);
        env.assert_consistent();
    }

    #[test]
    fn test_sync_keeps_surplus_below_threshold() {
        let mut env = TestEnv::with_params(MarginPoolParams {
            balance_sync_threshold: 1_000,
            ..test_params()
        });
        env.lend(LENDER, 1_000, 1_000);
        env.vault_quote += 500;

        assert_eq!(env.try_sync().unwrap(), (0, 0));
        assert_eq!(env.quote_collateral(LENDER), 1_000);
    }
}
