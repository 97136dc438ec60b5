/// Software Development Kit (SDK) for Sector Store.
///
/// Picks embedded or remote mode from the environment and provides the TCP
/// client for the latter.
pub mod client;
/// Automatic mode discovery and store initialization.
pub mod discovery;

pub use client::Client;
pub use discovery::new;
