// =============================================================================
// Position Operations
// =============================================================================
// deposit / withdraw / short / long / close. Each call:
//
// 1. rejects emergency mode and runs reinit (returns early if the caller's
//    own position was margin-called by the sweep)
// 2. validates amounts, position kind, limits
// 3. swaps through the venue when leverage changes
// 4. writes the new position (aggregates and heaps follow)
//
// Token movements between caller and vaults are returned as a `Settlement`;
// swaps move tokens between the vaults and the venue directly.
//
// Flip rules: depositing the debt asset repays debt first; once the debt is
// gone the position is Lend, and an attached long/short amount then opens
// the other side from there.
// =============================================================================

use anchor_lang::prelude::*;

use crate::constants::WHOLE_ONE;
use crate::engine::venue::{OpContext, Settlement, SwapDirection};
use crate::error::MarginPoolError;
use crate::events::{PositionClosed, PositionOpened};
use crate::math::{mul_div, Fp96};
use crate::state::{MarginPool, Position, PositionKind};

pub(crate) fn to_u64(amount: u128) -> Result<u64> {
    u64::try_from(amount).map_err(|_| error!(MarginPoolError::MathOverflow))
}

/// `amount * rate / WHOLE_ONE`, floored.
pub(crate) fn apply_rate(amount: u128, rate: u32) -> Result<u128> {
    mul_div(amount, rate as u128, WHOLE_ONE as u128)
}

impl MarginPool {
    /// Shared prelude of user calls. `Some` means stop and return it.
    fn begin_user_call(&mut self, ctx: &mut OpContext, caller: &Pubkey) -> Result<Option<Settlement>> {
        self.require_not_emergency()?;
        let outcome = self.reinit(ctx, Some(caller))?;
        if outcome.caller_margin_called {
            msg!("Caller was margin-called, request skipped");
            return Ok(Some(Settlement::margin_called()));
        }
        Ok(None)
    }

    /// Preconditions for anything that adds leverage.
    fn require_can_lever(&self, caller: &Pubkey, base_amount: u64) -> Result<()> {
        require!(!self.is_recovery(), MarginPoolError::RecoveryMode);
        require_keys_neq!(*caller, self.fee_holder, MarginPoolError::FeeHolderCannotTrade);
        require!(
            base_amount >= self.params.position_min_amount,
            MarginPoolError::LessThanMinimalAmount
        );
        require!(!self.is_unsafe()?, MarginPoolError::PoolUnsafe);
        Ok(())
    }

    /// Remaining debt of a leveraged position, in base units, is above the floor.
    pub(crate) fn require_min_debt(&self, position: &Position, price: Fp96) -> Result<()> {
        let debt_in_base = match position {
            Position::Short { .. } => self.base_debt_of(position)?,
            Position::Long { .. } => price.recip_mul_amount(self.quote_debt_of(position)?)?,
            _ => return Ok(()),
        };
        require!(
            debt_in_base >= self.params.position_min_amount as u128,
            MarginPoolError::LessThanMinimalAmount
        );
        Ok(())
    }

    fn require_healthy(&self, position: &Position, price: Fp96) -> Result<()> {
        require!(
            !self.has_bad_leverage(position, price, self.leverage_threshold())?,
            MarginPoolError::BadLeverage
        );
        Ok(())
    }

    // =========================================================================
    // Repayment
    // =========================================================================

    /// Short after paying `base_amount` toward its debt and adding
    /// `quote_amount` collateral. Full repayment turns it into Lend with any
    /// excess base as collateral.
    pub(crate) fn repay_short(&self, position: &Position, base_amount: u128, quote_amount: u128) -> Result<Position> {
        let Position::Short {
            discounted_quote_collateral,
            discounted_base_debt,
            ..
        } = *position
        else {
            return err!(MarginPoolError::WrongPositionType);
        };

        let debt = self.base_debt_of(position)?;
        if base_amount >= debt {
            let quote = self
                .quote_collateral_of(position)?
                .checked_add(quote_amount)
                .ok_or(MarginPoolError::MathOverflow)?;
            return Ok(Position::lend(
                self.base_collateral_coeff.recip_mul_amount(base_amount - debt)?,
                self.quote_collateral_coeff.recip_mul_amount(quote)?,
            ));
        }

        let repaid = self
            .base_debt_coeff
            .recip_mul_amount(base_amount)?
            .min(discounted_base_debt);
        // the haircut carried by the repaid debt stays with the position
        let kept_haircut = self.quote_delev_coeff.mul_amount_up(repaid)?;
        let kept_haircut = self.quote_collateral_coeff.recip_mul_amount_up(kept_haircut)?;
        let added = self.quote_collateral_coeff.recip_mul_amount(quote_amount)?;

        Ok(Position::Short {
            discounted_quote_collateral: discounted_quote_collateral
                .checked_add(added)
                .ok_or(MarginPoolError::MathOverflow)?
                .saturating_sub(kept_haircut),
            discounted_base_debt: discounted_base_debt - repaid,
            heap_index: 0,
        })
    }

    /// Long after paying `quote_amount` toward its debt and adding
    /// `base_amount` collateral.
    pub(crate) fn repay_long(&self, position: &Position, quote_amount: u128, base_amount: u128) -> Result<Position> {
        let Position::Long {
            discounted_base_collateral,
            discounted_quote_debt,
            ..
        } = *position
        else {
            return err!(MarginPoolError::WrongPositionType);
        };

        let debt = self.quote_debt_of(position)?;
        if quote_amount >= debt {
            let base = self
                .base_collateral_of(position)?
                .checked_add(base_amount)
                .ok_or(MarginPoolError::MathOverflow)?;
            return Ok(Position::lend(
                self.base_collateral_coeff.recip_mul_amount(base)?,
                self.quote_collateral_coeff.recip_mul_amount(quote_amount - debt)?,
            ));
        }

        let repaid = self
            .quote_debt_coeff
            .recip_mul_amount(quote_amount)?
            .min(discounted_quote_debt);
        let kept_haircut = self.base_delev_coeff.mul_amount_up(repaid)?;
        let kept_haircut = self.base_collateral_coeff.recip_mul_amount_up(kept_haircut)?;
        let added = self.base_collateral_coeff.recip_mul_amount(base_amount)?;

        Ok(Position::Long {
            discounted_base_collateral: discounted_base_collateral
                .checked_add(added)
                .ok_or(MarginPoolError::MathOverflow)?
                .saturating_sub(kept_haircut),
            discounted_quote_debt: discounted_quote_debt - repaid,
            heap_index: 0,
        })
    }

    /// Short with `borrowed` real base added to its debt. New debt does not
    /// inherit haircuts from earlier deleverage events.
    fn short_with_new_debt(&self, discounted_quote: u128, discounted_debt: u128, borrowed: u128) -> Result<Position> {
        let debt = self.base_debt_coeff.recip_mul_amount_up(borrowed)?;
        let compensation = self
            .quote_collateral_coeff
            .recip_mul_amount(self.quote_delev_coeff.mul_amount(debt)?)?;
        Ok(Position::Short {
            discounted_quote_collateral: discounted_quote
                .checked_add(compensation)
                .ok_or(MarginPoolError::MathOverflow)?,
            discounted_base_debt: discounted_debt
                .checked_add(debt)
                .ok_or(MarginPoolError::MathOverflow)?,
            heap_index: 0,
        })
    }

    fn long_with_new_debt(&self, discounted_base: u128, discounted_debt: u128, borrowed: u128) -> Result<Position> {
        let debt = self.quote_debt_coeff.recip_mul_amount_up(borrowed)?;
        let compensation = self
            .base_collateral_coeff
            .recip_mul_amount(self.base_delev_coeff.mul_amount(debt)?)?;
        Ok(Position::Long {
            discounted_base_collateral: discounted_base
                .checked_add(compensation)
                .ok_or(MarginPoolError::MathOverflow)?,
            discounted_quote_debt: discounted_debt
                .checked_add(debt)
                .ok_or(MarginPoolError::MathOverflow)?,
            heap_index: 0,
        })
    }

    // =========================================================================
    // Deposits
    // =========================================================================

    /// Deposit base, optionally opening a long of `long_amount` base afterwards.
    pub fn deposit_base(
        &mut self,
        ctx: &mut OpContext,
        caller: Pubkey,
        amount: u64,
        long_amount: u64,
        limit_price: Fp96,
    ) -> Result<Settlement> {
        require!(amount > 0 || long_amount > 0, MarginPoolError::ZeroAmount);
        if let Some(done) = self.begin_user_call(ctx, &caller)? {
            return Ok(done);
        }
        let price = self.base_price(ctx.oracle)?;

        if amount > 0 {
            let amount = amount as u128;
            let new_balance = self
                .base_balance()?
                .checked_add(amount)
                .ok_or(MarginPoolError::MathOverflow)?;
            require!(
                price.mul_amount(new_balance)? <= self.params.quote_limit as u128,
                MarginPoolError::ExceedsLimit
            );

            let position = self.position(&caller);
            let added = self.base_collateral_coeff.recip_mul_amount(amount)?;
            let updated = match position {
                Position::Uninitialized | Position::Lend { .. } => Position::lend(
                    position
                        .discounted_base_collateral()
                        .checked_add(added)
                        .ok_or(MarginPoolError::MathOverflow)?,
                    position.discounted_quote_collateral(),
                ),
                Position::Long { .. } => self.repay_long(&position, 0, amount)?,
                Position::Short { .. } => {
                    let updated = self.repay_short(&position, amount, 0)?;
                    self.require_min_debt(&updated, price)?;
                    updated
                }
            };
            self.write_position(caller, updated)?;
        }

        if long_amount > 0 {
            self.open_long(ctx, caller, long_amount, limit_price, price)?;
        }

        Ok(Settlement {
            base_in: amount,
            ..Settlement::default()
        })
    }

    /// Deposit quote, optionally opening a short of `short_amount` base afterwards.
    pub fn deposit_quote(
        &mut self,
        ctx: &mut OpContext,
        caller: Pubkey,
        amount: u64,
        short_amount: u64,
        limit_price: Fp96,
    ) -> Result<Settlement> {
        require!(amount > 0 || short_amount > 0, MarginPoolError::ZeroAmount);
        if let Some(done) = self.begin_user_call(ctx, &caller)? {
            return Ok(done);
        }
        let price = self.base_price(ctx.oracle)?;

        if amount > 0 {
            let amount = amount as u128;
            let new_balance = self
                .quote_balance()?
                .checked_add(amount)
                .ok_or(MarginPoolError::MathOverflow)?;
            require!(
                new_balance <= self.params.quote_limit as u128,
                MarginPoolError::ExceedsLimit
            );

            let position = self.position(&caller);
            let added = self.quote_collateral_coeff.recip_mul_amount(amount)?;
            let updated = match position {
                Position::Uninitialized | Position::Lend { .. } => Position::lend(
                    position.discounted_base_collateral(),
                    position
                        .discounted_quote_collateral()
                        .checked_add(added)
                        .ok_or(MarginPoolError::MathOverflow)?,
                ),
                Position::Short { .. } => self.repay_short(&position, 0, amount)?,
                Position::Long { .. } => {
                    let updated = self.repay_long(&position, amount, 0)?;
                    self.require_min_debt(&updated, price)?;
                    updated
                }
            };
            self.write_position(caller, updated)?;
        }

        if short_amount > 0 {
            self.open_short(ctx, caller, short_amount, limit_price, price)?;
        }

        Ok(Settlement {
            quote_in: amount,
            ..Settlement::default()
        })
    }

    // =========================================================================
    // Withdrawals
    // =========================================================================

    /// Withdraw base collateral. Amounts above the position's collateral
    /// (u64::MAX included) withdraw everything.
    pub fn withdraw_base(&mut self, ctx: &mut OpContext, caller: Pubkey, amount: u64) -> Result<Settlement> {
        require!(amount > 0, MarginPoolError::ZeroAmount);
        if let Some(done) = self.begin_user_call(ctx, &caller)? {
            return Ok(done);
        }
        let price = self.base_price(ctx.oracle)?;

        let position = self.position(&caller);
        match position {
            Position::Uninitialized => return err!(MarginPoolError::UninitializedPosition),
            Position::Short { .. } => return err!(MarginPoolError::WrongPositionType),
            _ => {}
        }

        let real = self.base_collateral_of(&position)?;
        let withdrawn = (amount as u128).min(real);
        require!(withdrawn > 0, MarginPoolError::ZeroAmount);
        require!(
            withdrawn <= self.base_balance()?,
            MarginPoolError::InsufficientLiquidity
        );

        let held = position.discounted_base_collateral();
        let removed = if withdrawn == real && position.kind() == PositionKind::Lend {
            held
        } else {
            self.base_collateral_coeff
                .recip_mul_amount_up(withdrawn)?
                .min(held)
        };

        let updated = match position {
            Position::Lend {
                discounted_quote_collateral,
                ..
            } => {
                if held == removed && discounted_quote_collateral == 0 {
                    Position::Uninitialized
                } else {
                    Position::lend(held - removed, discounted_quote_collateral)
                }
            }
            Position::Long {
                discounted_quote_debt,
                ..
            } => {
                let updated = Position::Long {
                    discounted_base_collateral: held - removed,
                    discounted_quote_debt,
                    heap_index: 0,
                };
                self.require_healthy(&updated, price)?;
                updated
            }
            _ => return err!(MarginPoolError::WrongPositionType),
        };
        self.write_position(caller, updated)?;

        Ok(Settlement {
            base_out: to_u64(withdrawn)?,
            ..Settlement::default()
        })
    }

    /// Withdraw quote collateral.
    pub fn withdraw_quote(&mut self, ctx: &mut OpContext, caller: Pubkey, amount: u64) -> Result<Settlement> {
        require!(amount > 0, MarginPoolError::ZeroAmount);
        if let Some(done) = self.begin_user_call(ctx, &caller)? {
            return Ok(done);
        }
        let price = self.base_price(ctx.oracle)?;

        let position = self.position(&caller);
        match position {
            Position::Uninitialized => return err!(MarginPoolError::UninitializedPosition),
            Position::Long { .. } => return err!(MarginPoolError::WrongPositionType),
            _ => {}
        }

        let real = self.quote_collateral_of(&position)?;
        let withdrawn = (amount as u128).min(real);
        require!(withdrawn > 0, MarginPoolError::ZeroAmount);
        require!(
            withdrawn <= self.quote_balance()?,
            MarginPoolError::InsufficientLiquidity
        );

        let held = position.discounted_quote_collateral();
        let removed = if withdrawn == real && position.kind() == PositionKind::Lend {
            held
        } else {
            self.quote_collateral_coeff
                .recip_mul_amount_up(withdrawn)?
                .min(held)
        };

        let updated = match position {
            Position::Lend {
                discounted_base_collateral,
                ..
            } => {
                if held == removed && discounted_base_collateral == 0 {
                    Position::Uninitialized
                } else {
                    Position::lend(discounted_base_collateral, held - removed)
                }
            }
            Position::Short {
                discounted_base_debt,
                ..
            } => {
                let updated = Position::Short {
                    discounted_quote_collateral: held - removed,
                    discounted_base_debt,
                    heap_index: 0,
                };
                self.require_healthy(&updated, price)?;
                updated
            }
            _ => return err!(MarginPoolError::WrongPositionType),
        };
        self.write_position(caller, updated)?;

        Ok(Settlement {
            quote_out: to_u64(withdrawn)?,
            ..Settlement::default()
        })
    }

    // =========================================================================
    // Leverage
    // =========================================================================

    /// Sell `base_amount` base for quote, borrowing whatever base the
    /// position does not already hold. `limit_price` is the lowest accepted
    /// quote per base (zero disables the bound).
    pub fn short(&mut self, ctx: &mut OpContext, caller: Pubkey, base_amount: u64, limit_price: Fp96) -> Result<Settlement> {
        require!(base_amount > 0, MarginPoolError::ZeroAmount);
        if let Some(done) = self.begin_user_call(ctx, &caller)? {
            return Ok(done);
        }
        let price = self.base_price(ctx.oracle)?;
        self.open_short(ctx, caller, base_amount, limit_price, price)?;
        Ok(Settlement::default())
    }

    /// Buy `base_amount` base with quote, borrowing whatever quote the
    /// position does not already hold. `limit_price` is the highest accepted
    /// quote per base (zero disables the bound).
    pub fn long(&mut self, ctx: &mut OpContext, caller: Pubkey, base_amount: u64, limit_price: Fp96) -> Result<Settlement> {
        require!(base_amount > 0, MarginPoolError::ZeroAmount);
        if let Some(done) = self.begin_user_call(ctx, &caller)? {
            return Ok(done);
        }
        let price = self.base_price(ctx.oracle)?;
        self.open_long(ctx, caller, base_amount, limit_price, price)?;
        Ok(Settlement::default())
    }

    fn open_short(
        &mut self,
        ctx: &mut OpContext,
        caller: Pubkey,
        base_amount: u64,
        limit_price: Fp96,
        price: Fp96,
    ) -> Result<()> {
        self.require_can_lever(&caller, base_amount)?;

        let position = self.position(&caller);
        let amount = base_amount as u128;
        let own_base = match position {
            Position::Uninitialized => return err!(MarginPoolError::UninitializedPosition),
            Position::Long { .. } => return err!(MarginPoolError::WrongPositionType),
            Position::Lend { .. } => self.base_collateral_of(&position)?.min(amount),
            Position::Short { .. } => 0,
        };
        require!(
            amount <= self.base_balance()?,
            MarginPoolError::InsufficientLiquidity
        );
        let borrowed = amount - own_base;

        // =====================================================================
        // Swap base -> quote
        // =====================================================================

        let min_out = if limit_price.is_zero() {
            0
        } else {
            to_u64(limit_price.mul_amount(amount)?)?
        };
        let quote_out = ctx
            .router
            .swap_exact_input(SwapDirection::BaseToQuote, base_amount, min_out)?;
        require!(quote_out >= min_out, MarginPoolError::SlippageExceeded);

        let fee = apply_rate(quote_out as u128, self.params.swap_fee)?;
        let net_quote = quote_out as u128 - fee;
        let added_quote = self.quote_collateral_coeff.recip_mul_amount(net_quote)?;

        // =====================================================================
        // New Position
        // =====================================================================

        let updated = match position {
            Position::Lend {
                discounted_base_collateral,
                discounted_quote_collateral,
            } => {
                let quote = discounted_quote_collateral
                    .checked_add(added_quote)
                    .ok_or(MarginPoolError::MathOverflow)?;
                if borrowed == 0 {
                    let sold = self.base_collateral_coeff.recip_mul_amount_up(own_base)?;
                    Position::lend(discounted_base_collateral.saturating_sub(sold), quote)
                } else {
                    self.short_with_new_debt(quote, 0, borrowed)?
                }
            }
            Position::Short {
                discounted_quote_collateral,
                discounted_base_debt,
                ..
            } => {
                let quote = discounted_quote_collateral
                    .checked_add(added_quote)
                    .ok_or(MarginPoolError::MathOverflow)?;
                self.short_with_new_debt(quote, discounted_base_debt, borrowed)?
            }
            _ => return err!(MarginPoolError::WrongPositionType),
        };

        if updated.is_leveraged() {
            self.require_healthy(&updated, price)?;
        }
        self.write_position(caller, updated)?;
        self.credit_fee_holder(0, self.quote_collateral_coeff.recip_mul_amount(fee)?)?;

        msg!("Short opened: {} base sold for {} quote", base_amount, quote_out);
        emit!(PositionOpened {
            owner: caller,
            kind: updated.kind(),
            base_amount,
            quote_amount: quote_out,
            fee: to_u64(fee)?,
        });
        Ok(())
    }

    fn open_long(
        &mut self,
        ctx: &mut OpContext,
        caller: Pubkey,
        base_amount: u64,
        limit_price: Fp96,
        price: Fp96,
    ) -> Result<()> {
        self.require_can_lever(&caller, base_amount)?;

        let position = self.position(&caller);
        match position {
            Position::Uninitialized => return err!(MarginPoolError::UninitializedPosition),
            Position::Short { .. } => return err!(MarginPoolError::WrongPositionType),
            _ => {}
        }
        let amount = base_amount as u128;

        // =====================================================================
        // Swap quote -> base
        // =====================================================================

        let available = self.quote_balance()?;
        let max_in = if limit_price.is_zero() {
            available
        } else {
            limit_price.mul_amount_up(amount)?
        };
        let quote_in = ctx.router.swap_exact_output(
            SwapDirection::QuoteToBase,
            to_u64(max_in.min(u64::MAX as u128))?,
            base_amount,
        )? as u128;
        require!(quote_in <= max_in, MarginPoolError::SlippageExceeded);
        require!(quote_in <= available, MarginPoolError::InsufficientLiquidity);

        let fee = apply_rate(quote_in, self.params.swap_fee)?;
        let cost = quote_in
            .checked_add(fee)
            .ok_or(MarginPoolError::MathOverflow)?;
        let own_quote = match position {
            Position::Lend { .. } => self.quote_collateral_of(&position)?.min(cost),
            _ => 0,
        };
        let borrowed = cost - own_quote;
        let added_base = self.base_collateral_coeff.recip_mul_amount(amount)?;

        // =====================================================================
        // New Position
        // =====================================================================

        let updated = match position {
            Position::Lend {
                discounted_base_collateral,
                discounted_quote_collateral,
            } => {
                let base = discounted_base_collateral
                    .checked_add(added_base)
                    .ok_or(MarginPoolError::MathOverflow)?;
                if borrowed == 0 {
                    let spent = self.quote_collateral_coeff.recip_mul_amount_up(own_quote)?;
                    Position::lend(base, discounted_quote_collateral.saturating_sub(spent))
                } else {
                    self.long_with_new_debt(base, 0, borrowed)?
                }
            }
            Position::Long {
                discounted_base_collateral,
                discounted_quote_debt,
                ..
            } => {
                let base = discounted_base_collateral
                    .checked_add(added_base)
                    .ok_or(MarginPoolError::MathOverflow)?;
                self.long_with_new_debt(base, discounted_quote_debt, borrowed)?
            }
            _ => return err!(MarginPoolError::WrongPositionType),
        };

        if updated.is_leveraged() {
            self.require_healthy(&updated, price)?;
        }
        self.write_position(caller, updated)?;
        self.credit_fee_holder(0, self.quote_collateral_coeff.recip_mul_amount(fee)?)?;

        msg!("Long opened: {} base bought for {} quote", base_amount, quote_in);
        emit!(PositionOpened {
            owner: caller,
            kind: updated.kind(),
            base_amount,
            quote_amount: to_u64(quote_in)?,
            fee: to_u64(fee)?,
        });
        Ok(())
    }

    // =========================================================================
    // Close
    // =========================================================================

    /// Repay all debt out of collateral through the venue, leaving a Lend.
    ///
    /// For shorts `limit_price` is the highest quote per base paid; for longs
    /// the lowest quote per base accepted. Zero disables the bound.
    pub fn close_position(&mut self, ctx: &mut OpContext, caller: Pubkey, limit_price: Fp96) -> Result<Settlement> {
        if let Some(done) = self.begin_user_call(ctx, &caller)? {
            return Ok(done);
        }

        let position = self.position(&caller);
        let swap_fee = self.params.swap_fee;
        let fee_scale = (WHOLE_ONE as u128) + swap_fee as u128;

        match position {
            Position::Uninitialized => err!(MarginPoolError::UninitializedPosition),
            Position::Lend { .. } => err!(MarginPoolError::WrongPositionType),

            Position::Short { .. } => {
                let debt = self.base_debt_of(&position)?;
                let collateral = self.quote_collateral_of(&position)?;
                let spendable = mul_div(collateral, WHOLE_ONE as u128, fee_scale)?.min(self.quote_balance()?);
                let max_in = if limit_price.is_zero() {
                    spendable
                } else {
                    limit_price.mul_amount_up(debt)?.min(spendable)
                };

                let quote_in = ctx.router.swap_exact_output(
                    SwapDirection::QuoteToBase,
                    to_u64(max_in)?,
                    to_u64(debt)?,
                )? as u128;
                require!(quote_in <= max_in, MarginPoolError::SlippageExceeded);

                let fee = apply_rate(quote_in, swap_fee)?;
                let cost = quote_in
                    .checked_add(fee)
                    .ok_or(MarginPoolError::MathOverflow)?;
                require!(cost <= collateral, MarginPoolError::BadLeverage);

                let left = self
                    .quote_collateral_coeff
                    .recip_mul_amount(collateral - cost)?;
                let updated = if left == 0 {
                    Position::Uninitialized
                } else {
                    Position::lend(0, left)
                };
                self.write_position(caller, updated)?;
                self.credit_fee_holder(0, self.quote_collateral_coeff.recip_mul_amount(fee)?)?;

                emit!(PositionClosed {
                    owner: caller,
                    kind: PositionKind::Short,
                    base_amount: to_u64(debt)?,
                    quote_amount: to_u64(quote_in)?,
                    fee: to_u64(fee)?,
                });
                Ok(Settlement::default())
            }

            Position::Long { .. } => {
                let debt = self.quote_debt_of(&position)?;
                let collateral = self.base_collateral_of(&position)?;
                let spendable = mul_div(collateral, WHOLE_ONE as u128, fee_scale)?.min(self.base_balance()?);
                let max_in = if limit_price.is_zero() {
                    spendable
                } else {
                    limit_price.recip_mul_amount_up(debt)?.min(spendable)
                };

                let base_in = ctx.router.swap_exact_output(
                    SwapDirection::BaseToQuote,
                    to_u64(max_in)?,
                    to_u64(debt)?,
                )? as u128;
                require!(base_in <= max_in, MarginPoolError::SlippageExceeded);

                let fee = apply_rate(base_in, swap_fee)?;
                let cost = base_in
                    .checked_add(fee)
                    .ok_or(MarginPoolError::MathOverflow)?;
                require!(cost <= collateral, MarginPoolError::BadLeverage);

                let left = self
                    .base_collateral_coeff
                    .recip_mul_amount(collateral - cost)?;
                let updated = if left == 0 {
                    Position::Uninitialized
                } else {
                    Position::lend(left, 0)
                };
                self.write_position(caller, updated)?;
                self.credit_fee_holder(self.base_collateral_coeff.recip_mul_amount(fee)?, 0)?;

                emit!(PositionClosed {
                    owner: caller,
                    kind: PositionKind::Long,
                    base_amount: to_u64(base_in)?,
                    quote_amount: to_u64(debt)?,
                    fee: to_u64(fee)?,
                });
                Ok(Settlement::default())
            }
        }
    }
}
