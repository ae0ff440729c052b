//! Asana task adapter for asana2calendar.
//!
//! Every task of one project is exposed as an event. Task gids are the
//! native ids.

mod adapter;
pub mod client;
pub mod task;

pub use adapter::AsanaAdapter;

/// Registry kind for this adapter.
pub const KIND: &str = "asana";
