//! Application Services
//!
//! Services that orchestrate domain logic over the ports.
//!
//! - [`registry`]: the session registry — live session table, topic
//!   interest, tick fan-out
//! - [`session`]: one live session and its writer/reader tasks

pub mod registry;
pub mod session;

pub use registry::SessionRegistry;
pub use session::{Session, SessionTiming};
