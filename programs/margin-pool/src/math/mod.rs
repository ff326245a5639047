// =============================================================================
// Math Module
// =============================================================================
// Q96 binary fixed point used by every coefficient, price and leverage value.
// =============================================================================

pub mod fp96;

pub use fp96::*;
