//! SQLite repositories

pub mod api_key;
pub mod poller_state;
