//! Configuration
//!
//! Settings types for the stream hub, loaded from environment variables
//! with defaults matching the long-standing constants.

pub mod settings;

pub use settings::{
    BusSettings, FeedSettings, HubConfig, NotifierSettings, ProfileSettings, ServerSettings,
    SessionSettings,
};
