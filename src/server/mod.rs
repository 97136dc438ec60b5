/// TCP server implementation for the Sector Store daemon.
///
/// This module provides the [`Router`] which handles incoming TCP connections
/// and dispatches line commands (`PUT`, `GET`, `UPDATE`, `DEL`, `SEARCH`,
/// `ADD_MEMBER`, `REMOVE_MEMBER`) to a [`crate::SectorStore`].
pub mod router;

pub use router::Router;
