// =============================================================================
// Instructions Module
// =============================================================================
// Account validation and token settlement around the engine. Each handler
// loads the collaborators, runs one `MarginPool` call and moves tokens.
// =============================================================================

// Shared account plumbing
pub mod user_operation;
pub mod venue_accounts;

// Pool setup
pub mod initialize_pool;

// Position operations
pub mod deposit;
pub mod receive_position;
pub mod trade;
pub mod withdraw;

// Upkeep
pub mod maintenance;

// Admin operations
pub mod admin;

// The #[derive(Accounts)] macro generates helper types that need to be at crate root
pub use admin::*;
pub use deposit::*;
pub use initialize_pool::*;
pub use maintenance::*;
pub use receive_position::*;
pub use trade::*;
pub use user_operation::*;
pub use venue_accounts::*;
pub use withdraw::*;
