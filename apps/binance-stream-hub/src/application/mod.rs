//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the session registry service and the port
//! interfaces that define how the domain interacts with external
//! systems.

/// Port interfaces for external systems (bus, notifier, connections).
pub mod ports;

/// Session registry and per-session task services.
pub mod services;
