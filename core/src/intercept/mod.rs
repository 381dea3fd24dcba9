//! Interception CLI integration.
//!
//! Everything that depends on the interception CLI's command surface and text
//! output lives here; the orchestrator only sees structured records.

pub mod daemon;
pub mod fallback;
pub mod parser;
pub mod supervisor;

pub use daemon::{daemon_selector, parse_status, TelepresenceDaemon};
pub use fallback::try_in_order;
pub use parser::parse_interceptions;
pub use supervisor::ProcessSupervisor;
