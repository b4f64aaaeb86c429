pub mod backend;
pub mod config;
pub mod core;
pub mod errors;
pub mod handlers;
pub mod init;
pub mod room;
pub mod routes;
pub mod session;
pub mod state;
pub mod telephony;

// Re-export commonly used items for convenience
pub use config::BridgeConfig;
pub use core::*;
pub use errors::{BridgeError, BridgeResult};
pub use session::{CallSession, CallSummary};
pub use state::AppState;
