// =============================================================================
// Adapters Module
// =============================================================================
// On-chain implementations of the engine's collaborator traits.
// =============================================================================

pub mod price_feed;
pub mod swap;

pub use price_feed::*;
pub use swap::*;
