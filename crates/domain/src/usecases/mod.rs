//! Application use cases / business logic

pub mod poll;

pub use poll::{PollConfig, PollLoop};
