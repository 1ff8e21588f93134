//! skybridge adapters crate
//!
//! This crate contains infrastructure adapters implementing the domain ports:
//! - `x_api`: X (Twitter) API read adapter
//! - `bluesky`: Bluesky (atproto) publishing adapter
//! - `state_file`: File-backed bookmark store

pub mod bluesky;
pub mod state_file;
pub mod x_api;

pub use bluesky::BlueskyPublisher;
pub use state_file::FileBookmarkStore;
pub use x_api::XPostSource;
