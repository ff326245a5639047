// =============================================================================
// State Module
// =============================================================================
// The pool account and the types stored inside it.
// =============================================================================

pub mod heap;
pub mod params;
pub mod pool;
pub mod position;

pub use heap::*;
pub use params::*;
pub use pool::*;
pub use position::*;
