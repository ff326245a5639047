// =============================================================================
// Events
// =============================================================================
// Emitted with `emit!` for every state transition so indexers can rebuild
// position history without replaying the engine. Coefficients are raw Q96.
// =============================================================================

use anchor_lang::prelude::*;

use crate::state::{MarginPoolParams, PoolMode, PositionKind};

#[event]
pub struct PoolInitialized {
    pub pool: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub admin: Pubkey,
    pub fee_holder: Pubkey,
}

#[event]
pub struct InterestAccrued {
    pub elapsed_seconds: u64,
    pub base_collateral_coeff: u128,
    pub base_debt_coeff: u128,
    pub quote_collateral_coeff: u128,
    pub quote_debt_coeff: u128,
    pub fee_discounted_base: u128,
    pub fee_discounted_quote: u128,
}

#[event]
pub struct Deposited {
    pub owner: Pubkey,
    pub base_amount: u64,
    pub quote_amount: u64,
    pub kind: PositionKind,
}

#[event]
pub struct Withdrawn {
    pub owner: Pubkey,
    pub base_amount: u64,
    pub quote_amount: u64,
    pub kind: PositionKind,
}

#[event]
pub struct PositionOpened {
    pub owner: Pubkey,
    pub kind: PositionKind,
    /// Base sold (short) or bought (long)
    pub base_amount: u64,
    /// Quote received (short) or paid (long)
    pub quote_amount: u64,
    /// Swap fee credited to the fee holder
    pub fee: u64,
}

#[event]
pub struct PositionClosed {
    pub owner: Pubkey,
    pub kind: PositionKind,
    pub base_amount: u64,
    pub quote_amount: u64,
    pub fee: u64,
}

#[event]
pub struct PositionMarginCalled {
    pub owner: Pubkey,
    pub kind: PositionKind,
    /// Real collateral at the time of the call
    pub collateral: u128,
    /// Real debt at the time of the call
    pub debt: u128,
    /// Collateral sold through the swap venue
    pub swapped_in: u128,
    /// Debt asset received from the swap
    pub swapped_out: u128,
}

#[event]
pub struct Deleveraged {
    /// Side whose debt and collateral absorbed the position
    pub absorbed_by: PositionKind,
    /// Real debt removed from that side
    pub debt_reduction: u128,
    /// Real collateral removed from that side
    pub collateral_haircut: u128,
}

#[event]
pub struct PositionReceived {
    pub liquidator: Pubkey,
    pub target: Pubkey,
    pub base_amount: u64,
    pub quote_amount: u64,
    pub kind: PositionKind,
}

#[event]
pub struct ModeChanged {
    pub mode: PoolMode,
    pub emergency_withdraw_coeff: u128,
}

#[event]
pub struct EmergencyWithdrawn {
    pub owner: Pubkey,
    pub base_amount: u64,
    pub quote_amount: u64,
}

#[event]
pub struct ParametersUpdated {
    pub params: MarginPoolParams,
}

#[event]
pub struct BalancesSynced {
    pub base_surplus: u128,
    pub quote_surplus: u128,
}

#[event]
pub struct AdminTransferred {
    pub old_admin: Pubkey,
    pub new_admin: Pubkey,
}
