// =============================================================================
// Margin Pool State Account
// =============================================================================
// The pool account holds the whole durable state of one base/quote pool:
// coefficients, discounted aggregates, the position ledger and both heaps.
// It is a PDA derived from ["pool", base_mint, quote_mint] and grows with
// `realloc` as positions are added.
//
// Real amount formulas (b, q = discounted collateral; bd, qd = discounted debt):
// - base collateral of Lend/Long:  base_collateral_coeff * b - base_delev_coeff * qd
// - quote collateral of Lend/Short: quote_collateral_coeff * q - quote_delev_coeff * bd
// - base debt:  base_debt_coeff * bd  (rounded up)
// - quote debt: quote_debt_coeff * qd (rounded up)
//
// All position writes go through `write_position`, which keeps the four
// aggregates and the heaps consistent with the ledger.
// =============================================================================

use anchor_lang::prelude::*;

use crate::constants::MAX_POSITIONS;
use crate::error::MarginPoolError;
use crate::math::Fp96;
use crate::state::heap::{HeapNode, MaxHeap};
use crate::state::params::MarginPoolParams;
use crate::state::position::{Position, PositionEntry, PositionKind, PositionLedger};

/// Pool lifecycle.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq, InitSpace)]
pub enum PoolMode {
    #[default]
    Regular,
    /// Stricter margin-call threshold, no new leverage
    Recovery,
    /// Shorts could not cover their base debt; only emergency withdrawals
    ShortEmergency,
    /// Longs could not cover their quote debt; only emergency withdrawals
    LongEmergency,
}

/// Addresses fixed at pool creation.
#[derive(Clone, Copy, Debug, Default)]
pub struct PoolKeys {
    pub admin: Pubkey,
    pub fee_holder: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub price_feed: Pubkey,
    pub swap_program: Pubkey,
}

#[account]
#[derive(InitSpace, Debug)]
pub struct MarginPool {
    // =========================================================================
    // Authority & Identification
    // =========================================================================

    /// Can change parameters, toggle recovery and shut the pool down
    pub admin: Pubkey,

    /// Owner of the technical position that collects fees
    pub fee_holder: Pubkey,

    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,

    /// Pool-owned token accounts holding the two assets
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,

    /// TWAP feed account read for prices
    pub price_feed: Pubkey,

    /// Program invoked for swaps
    pub swap_program: Pubkey,

    // =========================================================================
    // Configuration
    // =========================================================================

    pub params: MarginPoolParams,
    pub mode: PoolMode,

    // =========================================================================
    // Coefficients (Q96)
    // =========================================================================

    pub base_collateral_coeff: Fp96,
    pub base_debt_coeff: Fp96,
    pub quote_collateral_coeff: Fp96,
    pub quote_debt_coeff: Fp96,

    /// Haircut per discounted quote debt unit on long base collateral
    pub base_delev_coeff: Fp96,

    /// Haircut per discounted base debt unit on short quote collateral
    pub quote_delev_coeff: Fp96,

    // =========================================================================
    // Discounted Aggregates
    // =========================================================================

    pub discounted_base_collateral: u128,
    pub discounted_base_debt: u128,
    pub discounted_quote_collateral: u128,
    pub discounted_quote_debt: u128,

    // =========================================================================
    // System State
    // =========================================================================

    /// Pool-wide short leverage from the last reinit
    pub short_leverage: Fp96,

    /// Pool-wide long leverage from the last reinit
    pub long_leverage: Fp96,

    /// Real payout per discounted collateral unit, frozen at shutdown
    pub emergency_withdraw_coeff: Fp96,

    /// Protocol fee owed to the fee holder below one discounted base unit,
    /// as a Q96 fraction carried into the next accrual
    pub base_fee_carry: u128,

    /// Same for quote
    pub quote_fee_carry: u128,

    pub last_reinit_timestamp: i64,

    // =========================================================================
    // PDA Bumps
    // =========================================================================

    pub bump: u8,
    pub base_vault_bump: u8,
    pub quote_vault_bump: u8,

    // =========================================================================
    // Positions
    // =========================================================================

    pub ledger: PositionLedger,
    pub short_heap: MaxHeap,
    pub long_heap: MaxHeap,
}

impl MarginPool {
    /// Bytes added per position: its ledger row plus at most one heap node.
    pub const SPACE_PER_POSITION: usize = PositionEntry::INIT_SPACE + HeapNode::INIT_SPACE;

    /// Account size (discriminator included) for `positions` positions.
    pub fn space_for(positions: usize) -> usize {
        8 + Self::INIT_SPACE + positions * Self::SPACE_PER_POSITION
    }

    /// Fresh pool: unit coefficients, zero deleverage, leverage one.
    ///
    /// The fee holder's empty lend row exists from the start so fee credits
    /// never need a free slot.
    pub fn new(keys: PoolKeys, params: MarginPoolParams, now: i64) -> Self {
        Self {
            admin: keys.admin,
            fee_holder: keys.fee_holder,
            base_mint: keys.base_mint,
            quote_mint: keys.quote_mint,
            base_vault: keys.base_vault,
            quote_vault: keys.quote_vault,
            price_feed: keys.price_feed,
            swap_program: keys.swap_program,
            params,
            mode: PoolMode::Regular,
            base_collateral_coeff: Fp96::one(),
            base_debt_coeff: Fp96::one(),
            quote_collateral_coeff: Fp96::one(),
            quote_debt_coeff: Fp96::one(),
            base_delev_coeff: Fp96::zero(),
            quote_delev_coeff: Fp96::zero(),
            discounted_base_collateral: 0,
            discounted_base_debt: 0,
            discounted_quote_collateral: 0,
            discounted_quote_debt: 0,
            short_leverage: Fp96::one(),
            long_leverage: Fp96::one(),
            emergency_withdraw_coeff: Fp96::zero(),
            base_fee_carry: 0,
            quote_fee_carry: 0,
            last_reinit_timestamp: now,
            bump: 0,
            base_vault_bump: 0,
            quote_vault_bump: 0,
            ledger: PositionLedger::with_entry(keys.fee_holder, Position::lend(0, 0)),
            short_heap: MaxHeap::default(),
            long_heap: MaxHeap::default(),
        }
    }

    pub fn is_emergency(&self) -> bool {
        matches!(self.mode, PoolMode::ShortEmergency | PoolMode::LongEmergency)
    }

    pub fn is_recovery(&self) -> bool {
        self.mode == PoolMode::Recovery
    }

    /// Reject calls that are frozen once the pool is shut down.
    pub fn require_not_emergency(&self) -> Result<()> {
        require!(!self.is_emergency(), MarginPoolError::EmergencyMode);
        Ok(())
    }

    /// Margin-call threshold for the current mode.
    pub fn leverage_threshold(&self) -> u8 {
        self.params.leverage_threshold(self.is_recovery())
    }

    pub fn position(&self, owner: &Pubkey) -> Position {
        self.ledger.get(owner)
    }

    // =========================================================================
    // Real Amounts
    // =========================================================================

    pub fn base_collateral_of(&self, position: &Position) -> Result<u128> {
        let gross = self
            .base_collateral_coeff
            .mul_amount(position.discounted_base_collateral())?;
        let haircut = self
            .base_delev_coeff
            .mul_amount_up(position.discounted_quote_debt())?;
        Ok(gross.saturating_sub(haircut))
    }

    pub fn quote_collateral_of(&self, position: &Position) -> Result<u128> {
        let gross = self
            .quote_collateral_coeff
            .mul_amount(position.discounted_quote_collateral())?;
        let haircut = self
            .quote_delev_coeff
            .mul_amount_up(position.discounted_base_debt())?;
        Ok(gross.saturating_sub(haircut))
    }

    pub fn base_debt_of(&self, position: &Position) -> Result<u128> {
        self.base_debt_coeff
            .mul_amount_up(position.discounted_base_debt())
    }

    pub fn quote_debt_of(&self, position: &Position) -> Result<u128> {
        self.quote_debt_coeff
            .mul_amount_up(position.discounted_quote_debt())
    }

    /// Total real base collateral across all positions.
    pub fn real_base_collateral(&self) -> Result<u128> {
        let gross = self
            .base_collateral_coeff
            .mul_amount(self.discounted_base_collateral)?;
        let haircut = self.base_delev_coeff.mul_amount(self.discounted_quote_debt)?;
        Ok(gross.saturating_sub(haircut))
    }

    /// Total real quote collateral across all positions.
    pub fn real_quote_collateral(&self) -> Result<u128> {
        let gross = self
            .quote_collateral_coeff
            .mul_amount(self.discounted_quote_collateral)?;
        let haircut = self.quote_delev_coeff.mul_amount(self.discounted_base_debt)?;
        Ok(gross.saturating_sub(haircut))
    }

    pub fn real_base_debt(&self) -> Result<u128> {
        self.base_debt_coeff.mul_amount(self.discounted_base_debt)
    }

    pub fn real_quote_debt(&self) -> Result<u128> {
        self.quote_debt_coeff.mul_amount(self.discounted_quote_debt)
    }

    /// Base the pool should physically hold: collateral not lent out.
    pub fn base_balance(&self) -> Result<u128> {
        Ok(self
            .real_base_collateral()?
            .saturating_sub(self.real_base_debt()?))
    }

    /// Quote the pool should physically hold.
    pub fn quote_balance(&self) -> Result<u128> {
        Ok(self
            .real_quote_collateral()?
            .saturating_sub(self.real_quote_debt()?))
    }

    /// Debt exceeds collateral on either asset.
    pub fn is_unsafe(&self) -> Result<bool> {
        Ok(self.real_base_debt()? > self.real_base_collateral()?
            || self.real_quote_debt()? > self.real_quote_collateral()?)
    }

    // =========================================================================
    // Leverage
    // =========================================================================

    /// Collateral and debt of a leveraged position, both in quote units.
    fn collateral_and_debt_in_quote(&self, position: &Position, price: Fp96) -> Result<Option<(u128, u128)>> {
        Ok(match position {
            Position::Short { .. } => Some((
                self.quote_collateral_of(position)?,
                price.mul_amount_up(self.base_debt_of(position)?)?,
            )),
            Position::Long { .. } => Some((
                price.mul_amount(self.base_collateral_of(position)?)?,
                self.quote_debt_of(position)?,
            )),
            _ => None,
        })
    }

    /// `collateral / (collateral - debt)`, saturating for insolvent positions.
    /// `None` for positions without debt.
    pub fn position_leverage(&self, position: &Position, price: Fp96) -> Result<Option<Fp96>> {
        let Some((collateral, debt)) = self.collateral_and_debt_in_quote(position, price)? else {
            return Ok(None);
        };
        if collateral <= debt {
            return Ok(Some(Fp96::from_inner(u128::MAX)));
        }
        Ok(Some(Fp96::from_ratio_saturating(collateral, collateral - debt)))
    }

    /// Leverage strictly above `max_leverage`, tested as `L * debt > (L - 1) * collateral`.
    pub fn has_bad_leverage(&self, position: &Position, price: Fp96, max_leverage: u8) -> Result<bool> {
        let Some((collateral, debt)) = self.collateral_and_debt_in_quote(position, price)? else {
            return Ok(false);
        };
        let leverage = max_leverage as u128;
        let lhs = debt
            .checked_mul(leverage)
            .ok_or(MarginPoolError::MathOverflow)?;
        let rhs = collateral
            .checked_mul(leverage.saturating_sub(1))
            .ok_or(MarginPoolError::MathOverflow)?;
        Ok(lhs > rhs)
    }

    /// Pool-wide (short, long) leverage, clamped to `[1, max_leverage]`.
    pub fn compute_system_leverage(&self, price: Fp96) -> Result<(Fp96, Fp96)> {
        let max = self.params.max_leverage;
        let short = clamped_leverage(
            self.real_quote_collateral()?,
            price.mul_amount(self.real_base_debt()?)?,
            max,
        )?;
        let long = clamped_leverage(
            price.mul_amount(self.real_base_collateral()?)?,
            self.real_quote_debt()?,
            max,
        )?;
        Ok((short, long))
    }

    // =========================================================================
    // Position Writes
    // =========================================================================

    fn add_to_aggregates(&mut self, position: &Position) -> Result<()> {
        self.discounted_base_collateral = self
            .discounted_base_collateral
            .checked_add(position.discounted_base_collateral())
            .ok_or(MarginPoolError::MathOverflow)?;
        self.discounted_quote_collateral = self
            .discounted_quote_collateral
            .checked_add(position.discounted_quote_collateral())
            .ok_or(MarginPoolError::MathOverflow)?;
        self.discounted_base_debt = self
            .discounted_base_debt
            .checked_add(position.discounted_base_debt())
            .ok_or(MarginPoolError::MathOverflow)?;
        self.discounted_quote_debt = self
            .discounted_quote_debt
            .checked_add(position.discounted_quote_debt())
            .ok_or(MarginPoolError::MathOverflow)?;
        Ok(())
    }

    fn remove_from_aggregates(&mut self, position: &Position) -> Result<()> {
        self.discounted_base_collateral = self
            .discounted_base_collateral
            .checked_sub(position.discounted_base_collateral())
            .ok_or(MarginPoolError::MathUnderflow)?;
        self.discounted_quote_collateral = self
            .discounted_quote_collateral
            .checked_sub(position.discounted_quote_collateral())
            .ok_or(MarginPoolError::MathUnderflow)?;
        self.discounted_base_debt = self
            .discounted_base_debt
            .checked_sub(position.discounted_base_debt())
            .ok_or(MarginPoolError::MathUnderflow)?;
        self.discounted_quote_debt = self
            .discounted_quote_debt
            .checked_sub(position.discounted_quote_debt())
            .ok_or(MarginPoolError::MathUnderflow)?;
        Ok(())
    }

    /// Replace an owner's position, moving aggregates and heap entries with it.
    ///
    /// The stored heap index of `position` is ignored; the heap decides it.
    ///
    /// The fee holder's row is never deleted; clearing it leaves an empty lend.
    pub fn write_position(&mut self, owner: Pubkey, position: Position) -> Result<()> {
        let mut position = position;
        let is_fee_holder = owner == self.fee_holder;
        if is_fee_holder && !position.is_initialized() {
            position = Position::lend(0, 0);
        }

        let previous = self.ledger.get(&owner);
        require!(
            Position::transition_allowed(previous.kind(), position.kind()),
            MarginPoolError::WrongPositionType
        );
        if !previous.is_initialized() && position.is_initialized() && !is_fee_holder {
            require!(
                self.user_position_count() < MAX_POSITIONS,
                MarginPoolError::PoolFull
            );
        }

        self.remove_from_aggregates(&previous)?;
        self.add_to_aggregates(&position)?;

        let same_side = previous.is_leveraged() && previous.kind() == position.kind();

        if same_side {
            let slot = self.heap_slot(&owner, &previous)?;
            position.set_heap_index(previous.heap_index());
            self.ledger.upsert(owner, position)?;
            let key = position.sort_key().ok_or(MarginPoolError::HeapCorrupted)?;
            let heap = match position.kind() {
                PositionKind::Short => &mut self.short_heap,
                _ => &mut self.long_heap,
            };
            heap.update_at(slot, key, &mut self.ledger)?;
            return Ok(());
        }

        if previous.is_leveraged() {
            let slot = self.heap_slot(&owner, &previous)?;
            let heap = match previous.kind() {
                PositionKind::Short => &mut self.short_heap,
                _ => &mut self.long_heap,
            };
            heap.remove_at(slot, &mut self.ledger)?;
        }

        position.set_heap_index(0);
        self.ledger.upsert(owner, position)?;

        if let Some(key) = position.sort_key() {
            let heap = match position.kind() {
                PositionKind::Short => &mut self.short_heap,
                _ => &mut self.long_heap,
            };
            heap.insert(HeapNode { key, account: owner }, &mut self.ledger);
        }
        Ok(())
    }

    /// Ledger rows that count against `MAX_POSITIONS`: all but the fee holder's.
    pub fn user_position_count(&self) -> usize {
        let fee_rows = usize::from(self.ledger.get(&self.fee_holder).is_initialized());
        self.ledger.len().saturating_sub(fee_rows)
    }

    /// Hand a leveraged or lend position to an account that has none.
    pub fn transfer_position(&mut self, from: &Pubkey, to: Pubkey) -> Result<()> {
        let position = self.ledger.get(from);
        let slot = if position.is_leveraged() {
            Some(self.heap_slot(from, &position)?)
        } else {
            None
        };
        self.ledger.transfer(from, to)?;
        if let Some(slot) = slot {
            let heap = match position.kind() {
                PositionKind::Short => &mut self.short_heap,
                _ => &mut self.long_heap,
            };
            heap.update_account_at(slot, to, &mut self.ledger)?;
        }
        Ok(())
    }

    /// 0-based heap slot of a leveraged position, verified against the heap.
    fn heap_slot(&self, owner: &Pubkey, position: &Position) -> Result<usize> {
        let slot = (position.heap_index() as usize)
            .checked_sub(1)
            .ok_or(MarginPoolError::HeapCorrupted)?;
        let heap = match position.kind() {
            PositionKind::Short => &self.short_heap,
            PositionKind::Long => &self.long_heap,
            _ => return err!(MarginPoolError::HeapCorrupted),
        };
        let node = heap.node_at(slot).ok_or(MarginPoolError::HeapCorrupted)?;
        require_keys_eq!(node.account, *owner, MarginPoolError::HeapCorrupted);
        Ok(slot)
    }

    /// Add discounted collateral to the fee holder's lend position.
    pub fn credit_fee_holder(&mut self, discounted_base: u128, discounted_quote: u128) -> Result<()> {
        if discounted_base == 0 && discounted_quote == 0 {
            return Ok(());
        }
        let fee_holder = self.fee_holder;
        let position = self.ledger.get(&fee_holder);
        require!(!position.is_leveraged(), MarginPoolError::FeeHolderCannotTrade);

        let base = position
            .discounted_base_collateral()
            .checked_add(discounted_base)
            .ok_or(MarginPoolError::MathOverflow)?;
        let quote = position
            .discounted_quote_collateral()
            .checked_add(discounted_quote)
            .ok_or(MarginPoolError::MathOverflow)?;
        self.write_position(fee_holder, Position::lend(base, quote))
    }

    // =========================================================================
    // Consistency Checks
    // =========================================================================

    /// Aggregates equal the sums over all ledger rows.
    pub fn check_aggregates(&self) -> Result<()> {
        let mut sums = [0u128; 4];
        for entry in self.ledger.iter() {
            let p = &entry.position;
            let fields = [
                p.discounted_base_collateral(),
                p.discounted_quote_collateral(),
                p.discounted_base_debt(),
                p.discounted_quote_debt(),
            ];
            for (sum, field) in sums.iter_mut().zip(fields) {
                *sum = sum.checked_add(field).ok_or(MarginPoolError::MathOverflow)?;
            }
        }
        let expected = [
            self.discounted_base_collateral,
            self.discounted_quote_collateral,
            self.discounted_base_debt,
            self.discounted_quote_debt,
        ];
        require!(sums == expected, MarginPoolError::AggregateMismatch);
        Ok(())
    }

    /// Every heap node points at a position of its side whose back-reference
    /// and recomputed key match, and every leveraged position is in a heap.
    pub fn check_heaps(&self) -> Result<()> {
        for (heap, kind) in [
            (&self.short_heap, PositionKind::Short),
            (&self.long_heap, PositionKind::Long),
        ] {
            for (i, node) in heap.iter().enumerate() {
                let position = self.ledger.get(&node.account);
                require!(position.kind() == kind, MarginPoolError::HeapCorrupted);
                require!(
                    position.heap_index() as usize == i + 1,
                    MarginPoolError::HeapCorrupted
                );
                require!(
                    position.sort_key() == Some(node.key),
                    MarginPoolError::HeapCorrupted
                );
            }
            let count = self
                .ledger
                .iter()
                .filter(|entry| entry.position.kind() == kind)
                .count();
            require!(count == heap.len(), MarginPoolError::HeapCorrupted);
        }
        Ok(())
    }
}

/// `collateral / (collateral - debt)` clamped to `[1, max_leverage]`.
fn clamped_leverage(collateral: u128, debt: u128, max_leverage: u8) -> Result<Fp96> {
    let max = Fp96::from_integer(max_leverage as u64);
    if debt == 0 {
        return Ok(Fp96::one());
    }
    if collateral <= debt {
        return Ok(max);
    }
    let equity = collateral - debt;
    // collateral > max * equity means the ratio is above the clamp
    let capped = equity
        .checked_mul(max_leverage as u128)
        .map_or(false, |limit| collateral > limit);
    if capped {
        return Ok(max);
    }
    Fp96::from_ratio(collateral, equity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> MarginPool {
        let keys = PoolKeys {
            fee_holder: Pubkey::new_from_array([7; 32]),
            ..PoolKeys::default()
        };
        MarginPool::new(keys, MarginPoolParams::default(), 0)
    }

    fn owner(n: u8) -> Pubkey {
        Pubkey::new_from_array([n; 32])
    }

    #[test]
    fn test_new_pool_starts_neutral() {
        let pool = pool();
        assert_eq!(pool.base_collateral_coeff, Fp96::one());
        assert_eq!(pool.quote_debt_coeff, Fp96::one());
        assert!(pool.base_delev_coeff.is_zero());
        assert_eq!(pool.mode, PoolMode::Regular);
        assert_eq!(pool.short_leverage, Fp96::one());
    }

    #[test]
    fn test_space_grows_per_position() {
        let empty = MarginPool::space_for(0);
        assert_eq!(MarginPool::space_for(3) - empty, 3 * MarginPool::SPACE_PER_POSITION);
    }

    #[test]
    fn test_write_position_tracks_aggregates_and_heap() {
        let mut pool = pool();
        pool.write_position(owner(1), Position::lend(0, 100)).unwrap();
        pool.write_position(
            owner(1),
            Position::Short {
                discounted_quote_collateral: 150,
                discounted_base_debt: 40,
                heap_index: 0,
            },
        )
        .unwrap();

        assert_eq!(pool.discounted_quote_collateral, 150);
        assert_eq!(pool.discounted_base_debt, 40);
        assert_eq!(pool.position(&owner(1)).heap_index(), 1);
        pool.check_aggregates().unwrap();
        pool.check_heaps().unwrap();

        pool.write_position(owner(1), Position::lend(0, 120)).unwrap();
        assert!(pool.short_heap.is_empty());
        assert_eq!(pool.discounted_base_debt, 0);
        pool.check_heaps().unwrap();

        pool.write_position(owner(1), Position::Uninitialized).unwrap();
        assert_eq!(pool.ledger.len(), 1);
        assert_eq!(pool.user_position_count(), 0);
        assert_eq!(pool.discounted_quote_collateral, 0);
    }

    #[test]
    fn test_transfer_position_relabels_heap_slot() {
        let mut pool = pool();
        pool.write_position(owner(1), Position::lend(10, 0)).unwrap();
        pool.write_position(
            owner(1),
            Position::Long {
                discounted_base_collateral: 30,
                discounted_quote_debt: 20,
                heap_index: 0,
            },
        )
        .unwrap();

        pool.transfer_position(&owner(1), owner(2)).unwrap();
        assert_eq!(pool.long_heap.peek_root().unwrap().account, owner(2));
        assert_eq!(pool.position(&owner(2)).heap_index(), 1);
        pool.check_heaps().unwrap();
        pool.check_aggregates().unwrap();
    }

    #[test]
    fn test_bad_leverage_threshold() {
        let mut pool = pool();
        pool.write_position(owner(1), Position::lend(0, 100)).unwrap();
        // 100 quote collateral against 90 base debt at price 1 -> leverage 10
        let short = Position::Short {
            discounted_quote_collateral: 100,
            discounted_base_debt: 90,
            heap_index: 0,
        };
        let price = Fp96::one();
        assert!(!pool.has_bad_leverage(&short, price, 10).unwrap());
        assert!(pool.has_bad_leverage(&short, price, 9).unwrap());
        assert_eq!(
            pool.position_leverage(&short, price).unwrap(),
            Some(Fp96::from_integer(10))
        );
    }

    #[test]
    fn test_system_leverage_is_clamped() {
        let mut pool = pool();
        pool.discounted_quote_collateral = 1_000;
        pool.discounted_base_debt = 999;
        let (short, long) = pool.compute_system_leverage(Fp96::one()).unwrap();
        assert_eq!(short, Fp96::from_integer(pool.params.max_leverage as u64));
        assert_eq!(long, Fp96::one());

        pool.discounted_base_debt = 500;
        let (short, _) = pool.compute_system_leverage(Fp96::one()).unwrap();
        assert_eq!(short, Fp96::from_integer(2));
    }

    #[test]
    fn test_fee_holder_row_exists_from_creation() {
        let mut pool = pool();
        let fee_holder = pool.fee_holder;
        assert_eq!(pool.position(&fee_holder), Position::lend(0, 0));
        assert_eq!(pool.user_position_count(), 0);

        pool.write_position(fee_holder, Position::Uninitialized).unwrap();
        assert_eq!(pool.position(&fee_holder), Position::lend(0, 0));
        assert_eq!(pool.ledger.len(), 1);
    }

    #[test]
    fn test_capacity_counts_only_user_rows() {
        let mut pool = pool();
        for i in 0..MAX_POSITIONS {
            let mut key = [200u8; 32];
            key[1] = i as u8;
            pool.write_position(Pubkey::new_from_array(key), Position::lend(1, 0))
                .unwrap();
        }
        assert_eq!(pool.user_position_count(), MAX_POSITIONS);
        assert_eq!(pool.ledger.len(), MAX_POSITIONS + 1);

        let result = pool.write_position(owner(1), Position::lend(1, 0));
        assert!(result.is_err());

        // existing rows, the fee holder's included, still update
        pool.credit_fee_holder(4, 2).unwrap();
        let mut key = [200u8; 32];
        key[1] = 3;
        pool.write_position(Pubkey::new_from_array(key), Position::lend(9, 0))
            .unwrap();
        pool.check_aggregates().unwrap();
    }

    #[test]
    fn test_fee_holder_credit_accumulates() {
        let mut pool = pool();
        pool.credit_fee_holder(5, 0).unwrap();
        pool.credit_fee_holder(0, 3).unwrap();
        assert_eq!(pool.position(&pool.fee_holder.clone()), Position::lend(5, 3));
        pool.check_aggregates().unwrap();
    }
}
