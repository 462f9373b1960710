//! Conversation cache and cross-realm request bridge behind a thread sidebar
//! for X/Twitter.
//!
//! The page realm ([`interceptor`]) watches GraphQL traffic and replays
//! authenticated calls; the content realm ([`client`], [`store`],
//! [`snapshot`]) caches what it learns and derives the conversation view.
//! Both talk over the [`bridge`].

pub mod bridge;
pub mod client;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod poll;
pub mod session;
pub mod snapshot;
pub mod status_url;
pub mod store;

pub use config::Config;
pub use error::{BridgeError, ConfigError, ReplayError, UploadError, ValidationError};
pub use session::Session;
pub use snapshot::{build_snapshot, SidebarController, Snapshot, SnapshotStatus};
pub use store::TweetStore;
