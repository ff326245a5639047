// =============================================================================
// Margin Pool Error Codes
// =============================================================================
// Every way a pool call can be rejected. Groups follow the failure taxonomy:
// caller mistakes, economic rejections, mode/state rejections, and fatal
// conditions that point at a defect rather than a recoverable situation.
// =============================================================================

use anchor_lang::prelude::*;

/// All errors the margin pool program can return.
///
/// Anchor numbers them from 6000 in declaration order, so new variants go at
/// the end of their group's block only when the client is redeployed too.
#[error_code]
pub enum MarginPoolError {
    // =========================================================================
    // Validation Errors (caller mistake, nothing mutated)
    // =========================================================================

    /// Amount must be greater than zero
    #[msg("Amount must be greater than zero")]
    ZeroAmount,

    /// The deposit would push the pool above its configured quote limit
    #[msg("Amount exceeds the pool limit")]
    ExceedsLimit,

    /// The requested operation does not apply to the caller's position kind
    #[msg("Wrong position type for this operation")]
    WrongPositionType,

    /// The caller (or target) has no position in the pool
    #[msg("Position is not initialized")]
    UninitializedPosition,

    /// The caller already has a position (liquidators must start empty)
    #[msg("Position is already initialized")]
    PositionInitialized,

    /// Leveraged amount or remaining debt is below the position minimum
    #[msg("Amount is below the minimal position amount")]
    LessThanMinimalAmount,

    /// A parameter is outside its hard bound
    #[msg("Invalid pool parameter")]
    InvalidParameter,

    /// The pool account cannot hold another position
    #[msg("Position ledger is full")]
    PoolFull,

    /// The fee holder position only ever lends
    #[msg("Fee holder cannot open leveraged positions")]
    FeeHolderCannotTrade,

    /// A price of zero (or one that does not fit Q96) was supplied
    #[msg("Invalid price")]
    InvalidPrice,

    // =========================================================================
    // Economic Errors (retry with other parameters or after price moves)
    // =========================================================================

    /// The realized swap price is worse than the caller's limit
    #[msg("Slippage tolerance exceeded")]
    SlippageExceeded,

    /// The position would exceed the maximum leverage
    #[msg("Position leverage is too high")]
    BadLeverage,

    /// The target position is healthy
    #[msg("Position is not liquidatable")]
    NotLiquidatable,

    /// The pool does not hold enough of the asset to lend
    #[msg("Not enough liquidity in the pool")]
    InsufficientLiquidity,

    /// Pool-wide debt exceeds collateral on one side, leverage cannot grow
    #[msg("Pool collateral does not cover debt")]
    PoolUnsafe,

    /// Shutdown requested while collateral still covers debt on both sides
    #[msg("Pool is not eligible for emergency shutdown")]
    NotEmergency,

    // =========================================================================
    // State / Mode Errors
    // =========================================================================

    /// The pool is in ShortEmergency or LongEmergency mode
    #[msg("Pool is in emergency mode")]
    EmergencyMode,

    /// New leverage is blocked while the pool is in recovery mode
    #[msg("Pool is in recovery mode")]
    RecoveryMode,

    /// Short positions cannot withdraw during a short emergency
    #[msg("Short positions are frozen in short emergency")]
    ShortEmergency,

    /// Long positions cannot withdraw during a long emergency
    #[msg("Long positions are frozen in long emergency")]
    LongEmergency,

    // =========================================================================
    // Authorization Errors
    // =========================================================================

    /// Only the pool admin can call this function
    #[msg("Only admin can perform this action")]
    AdminOnly,

    /// Zero or otherwise unusable address
    #[msg("Invalid address")]
    InvalidAddress,

    // =========================================================================
    // Math Errors (fatal: configuration or implementation defect)
    // =========================================================================

    /// A calculation exceeded the fixed-point capacity
    #[msg("Math overflow - calculation exceeded maximum value")]
    MathOverflow,

    /// A subtraction would go negative
    #[msg("Math underflow - result would be negative")]
    MathUnderflow,

    /// Division by zero
    #[msg("Division by zero")]
    DivisionByZero,

    /// Taylor expansion requested for a base with x >= 1
    #[msg("Taylor series base out of range")]
    InvalidTaylorBase,

    /// Clock moved backwards relative to the last reinit
    #[msg("Timestamp is earlier than last reinit")]
    InvalidTimestamp,

    /// Heap slot and ledger back-reference disagree
    #[msg("Heap corrupted - back-reference mismatch")]
    HeapCorrupted,

    /// Pool aggregates differ from the sum over positions
    #[msg("Aggregate totals do not match positions")]
    AggregateMismatch,

    // =========================================================================
    // Account / Collaborator Errors
    // =========================================================================

    /// Token account mint does not match the pool's asset
    #[msg("Invalid token mint")]
    InvalidMint,

    /// Token account owner doesn't match expected owner
    #[msg("Invalid token account owner")]
    InvalidTokenAccountOwner,

    /// Price feed account does not match the pool's configured feed
    #[msg("Invalid price feed account")]
    InvalidPriceFeed,

    /// Price feed has too few observations for the lookback window
    #[msg("Price feed has no observations covering the window")]
    StalePrice,

    /// Swap program account does not match the pool's configured venue
    #[msg("Invalid swap program")]
    InvalidSwapProgram,

    /// The swap venue CPI returned an error
    #[msg("Swap venue call failed")]
    SwapFailed,
}
