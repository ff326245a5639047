// =============================================================================
// Margin Pool Constants
// =============================================================================
// Seeds, fixed-point scales, parameter bounds and parameter defaults. Pool
// parameters themselves live on-chain in `MarginPoolParams`; everything here
// is compiled in and shared by every pool the program manages.
// =============================================================================

// =============================================================================
// PDA SEEDS
// =============================================================================

/// Seed for the pool account PDA
/// Full seed: ["pool", base_mint_pubkey, quote_mint_pubkey]
pub const POOL_SEED: &[u8] = b"pool";

/// Seed for the vault holding the base asset
/// Full seed: ["base_vault", pool_pubkey]
pub const BASE_VAULT_SEED: &[u8] = b"base_vault";

/// Seed for the vault holding the quote asset
/// Full seed: ["quote_vault", pool_pubkey]
pub const QUOTE_VAULT_SEED: &[u8] = b"quote_vault";

// =============================================================================
// SCALES
// =============================================================================

/// Fixed-point one for rate parameters (interest, fees, slippage)
/// 54_000 = 5.4%
pub const WHOLE_ONE: u32 = 1_000_000;

/// Seconds in a year of 365.25 days, the denominator for per-second rates
pub const SECONDS_IN_YEAR: u64 = 31_557_600;

// =============================================================================
// CAPACITY
// =============================================================================

/// Maximum number of user positions one pool account can hold. The fee
/// holder's row is created with the pool and does not count.
/// The whole ledger is deserialized on every call, so this is bounded by the
/// program heap rather than by account size.
pub const MAX_POSITIONS: usize = 128;

// =============================================================================
// PARAMETER BOUNDS (enforced by set_parameters and initialize_pool)
// =============================================================================

/// Leverage thresholds must be at least 2x to leave room for any position
pub const MIN_LEVERAGE_BOUND: u8 = 2;

/// Highest configurable leverage threshold
pub const MAX_LEVERAGE_BOUND: u8 = 100;

/// Interest rate can be at most 100% a year
pub const MAX_INTEREST_RATE: u32 = WHOLE_ONE;

/// Protocol fee can be at most 100% a year
pub const MAX_FEE: u32 = WHOLE_ONE;

/// Swap fee can be at most 10% of the swapped amount
pub const MAX_SWAP_FEE: u32 = WHOLE_ONE / 10;

/// Margin call slippage must leave some output, so strictly below one
pub const MAX_MC_SLIPPAGE: u32 = WHOLE_ONE / 2;

// =============================================================================
// PARAMETER DEFAULTS
// =============================================================================

pub const DEFAULT_MAX_LEVERAGE: u8 = 20;
pub const DEFAULT_RECOVERY_MAX_LEVERAGE: u8 = 15;
pub const DEFAULT_PRICE_SECONDS_AGO: u16 = 900;
pub const DEFAULT_PRICE_SECONDS_AGO_MC: u16 = 60;
pub const DEFAULT_INTEREST_RATE: u32 = 54_000;
pub const DEFAULT_FEE: u32 = 10_000;
pub const DEFAULT_SWAP_FEE: u32 = 1_000;
pub const DEFAULT_MC_SLIPPAGE: u32 = 50_000;
pub const DEFAULT_POSITION_MIN_AMOUNT: u64 = 1_000;
pub const DEFAULT_QUOTE_LIMIT: u64 = u64::MAX;
pub const DEFAULT_BALANCE_SYNC_THRESHOLD: u64 = 0;
