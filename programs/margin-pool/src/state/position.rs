// =============================================================================
// Positions and the Position Ledger
// =============================================================================
// A position is one account's claim against the pool. The kind decides which
// coefficient each stored amount is discounted by, so the amounts live inside
// the variant instead of in a shared pair of ambiguous fields.
//
// Discounted amounts are real amounts divided by the matching coefficient at
// the time they were recorded. Multiplying by the current coefficient gives
// the real amount today.
//
// The ledger stores only initialized positions, sorted by owner, and is the
// heap back-reference sink: every heap slot move lands in `heap_index`.
// =============================================================================

use anchor_lang::prelude::*;

use crate::error::MarginPoolError;
use crate::math::Fp96;
use crate::state::heap::HeapIndexSink;

/// A single account's position.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq, InitSpace)]
pub enum Position {
    #[default]
    Uninitialized,

    /// Collateral only, in either or both assets
    Lend {
        discounted_base_collateral: u128,
        discounted_quote_collateral: u128,
    },

    /// Quote collateral against borrowed base
    Short {
        discounted_quote_collateral: u128,
        discounted_base_debt: u128,
        /// 1-based slot in the short heap
        heap_index: u32,
    },

    /// Base collateral against borrowed quote
    Long {
        discounted_base_collateral: u128,
        discounted_quote_debt: u128,
        /// 1-based slot in the long heap
        heap_index: u32,
    },
}

/// Position kind without the amounts, used in events and checks.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PositionKind {
    Uninitialized,
    Lend,
    Short,
    Long,
}

impl Position {
    pub fn kind(&self) -> PositionKind {
        match self {
            Position::Uninitialized => PositionKind::Uninitialized,
            Position::Lend { .. } => PositionKind::Lend,
            Position::Short { .. } => PositionKind::Short,
            Position::Long { .. } => PositionKind::Long,
        }
    }

    pub fn is_initialized(&self) -> bool {
        !matches!(self, Position::Uninitialized)
    }

    pub fn is_leveraged(&self) -> bool {
        matches!(self, Position::Short { .. } | Position::Long { .. })
    }

    /// A new lend position from discounted collateral amounts.
    pub fn lend(discounted_base_collateral: u128, discounted_quote_collateral: u128) -> Self {
        Position::Lend {
            discounted_base_collateral,
            discounted_quote_collateral,
        }
    }

    /// 1-based heap slot, 0 for positions outside the heaps.
    pub fn heap_index(&self) -> u32 {
        match self {
            Position::Short { heap_index, .. } | Position::Long { heap_index, .. } => *heap_index,
            _ => 0,
        }
    }

    pub fn set_heap_index(&mut self, index: u32) {
        if let Position::Short { heap_index, .. } | Position::Long { heap_index, .. } = self {
            *heap_index = index;
        }
    }

    pub fn discounted_base_collateral(&self) -> u128 {
        match self {
            Position::Lend { discounted_base_collateral, .. }
            | Position::Long { discounted_base_collateral, .. } => *discounted_base_collateral,
            _ => 0,
        }
    }

    pub fn discounted_quote_collateral(&self) -> u128 {
        match self {
            Position::Lend { discounted_quote_collateral, .. }
            | Position::Short { discounted_quote_collateral, .. } => *discounted_quote_collateral,
            _ => 0,
        }
    }

    pub fn discounted_base_debt(&self) -> u128 {
        match self {
            Position::Short { discounted_base_debt, .. } => *discounted_base_debt,
            _ => 0,
        }
    }

    pub fn discounted_quote_debt(&self) -> u128 {
        match self {
            Position::Long { discounted_quote_debt, .. } => *discounted_quote_debt,
            _ => 0,
        }
    }

    /// Heap ordering key: discounted debt over discounted collateral.
    ///
    /// Real leverage on one side is a monotone function of this ratio for a
    /// fixed set of coefficients and price, so the key never needs refreshing
    /// when only coefficients or the price move.
    pub fn sort_key(&self) -> Option<u128> {
        match self {
            Position::Short {
                discounted_quote_collateral,
                discounted_base_debt,
                ..
            } => Some(Fp96::from_ratio_saturating(*discounted_base_debt, *discounted_quote_collateral).inner),
            Position::Long {
                discounted_base_collateral,
                discounted_quote_debt,
                ..
            } => Some(Fp96::from_ratio_saturating(*discounted_quote_debt, *discounted_base_collateral).inner),
            _ => None,
        }
    }

    /// Whether a position may go straight from `from` to `to` in one write.
    ///
    /// Leveraged positions only change side by passing through Lend, and a
    /// fresh account always starts lending.
    pub fn transition_allowed(from: PositionKind, to: PositionKind) -> bool {
        use PositionKind::*;
        match (from, to) {
            (Uninitialized, Uninitialized | Lend) => true,
            (Lend, _) => true,
            (Short, Short | Lend | Uninitialized) => true,
            (Long, Long | Lend | Uninitialized) => true,
            _ => false,
        }
    }
}

/// One ledger row.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq, InitSpace)]
pub struct PositionEntry {
    pub owner: Pubkey,
    pub position: Position,
}

/// All initialized positions of a pool, sorted by owner.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct PositionLedger {
    entries: Vec<PositionEntry>,
}

impl Space for PositionLedger {
    // empty vec prefix, rows are sized per position by the pool
    const INIT_SPACE: usize = 4;
}

impl PositionLedger {
    /// A ledger holding a single row.
    pub fn with_entry(owner: Pubkey, position: Position) -> Self {
        Self {
            entries: vec![PositionEntry { owner, position }],
        }
    }

    fn search(&self, owner: &Pubkey) -> std::result::Result<usize, usize> {
        self.entries.binary_search_by(|entry| entry.owner.cmp(owner))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PositionEntry> {
        self.entries.iter()
    }

    /// The owner's position, `Uninitialized` when absent.
    pub fn get(&self, owner: &Pubkey) -> Position {
        match self.search(owner) {
            Ok(i) => self.entries[i].position,
            Err(_) => Position::Uninitialized,
        }
    }

    pub fn get_mut(&mut self, owner: &Pubkey) -> Option<&mut Position> {
        match self.search(owner) {
            Ok(i) => Some(&mut self.entries[i].position),
            Err(_) => None,
        }
    }

    /// Write a position, enforcing legal kind transitions.
    ///
    /// Writing `Uninitialized` deletes the row.
    pub fn upsert(&mut self, owner: Pubkey, position: Position) -> Result<()> {
        match self.search(&owner) {
            Ok(i) => {
                let current = self.entries[i].position.kind();
                require!(
                    Position::transition_allowed(current, position.kind()),
                    MarginPoolError::WrongPositionType
                );
                if position.is_initialized() {
                    self.entries[i].position = position;
                } else {
                    self.entries.remove(i);
                }
            }
            Err(i) => {
                if !position.is_initialized() {
                    return Ok(());
                }
                require!(
                    Position::transition_allowed(PositionKind::Uninitialized, position.kind()),
                    MarginPoolError::WrongPositionType
                );
                self.entries.insert(i, PositionEntry { owner, position });
            }
        }
        Ok(())
    }

    /// Delete the owner's row, returning what it held.
    pub fn remove(&mut self, owner: &Pubkey) -> Position {
        match self.search(owner) {
            Ok(i) => self.entries.remove(i).position,
            Err(_) => Position::Uninitialized,
        }
    }

    /// Move a position to an owner that has none. Used when a liquidator
    /// receives a leveraged position, which skips the Lend-first rule.
    pub fn transfer(&mut self, from: &Pubkey, to: Pubkey) -> Result<()> {
        require!(
            !self.get(&to).is_initialized(),
            MarginPoolError::PositionInitialized
        );
        let position = self.remove(from);
        require!(position.is_initialized(), MarginPoolError::UninitializedPosition);
        let i = match self.search(&to) {
            Ok(i) | Err(i) => i,
        };
        self.entries.insert(i, PositionEntry { owner: to, position });
        Ok(())
    }
}

impl HeapIndexSink for PositionLedger {
    fn set_heap_index(&mut self, account: &Pubkey, index: u32) {
        if let Some(position) = self.get_mut(account) {
            position.set_heap_index(index);
        }
    }
}
