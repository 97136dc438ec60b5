//! The local replica of the document log.
//!
//! [`MemStore`] implements [`crate::DocumentStore`] in memory and snapshots to
//! disk through [`Persistence`]. Peer replication is left to whatever log
//! provider replaces it. The lifecycle it has to follow: [`open`] loads the
//! documents, callers subscribe, [`MemStore::mark_ready`] announces
//! [`StoreEvent::Load`] and [`StoreEvent::Ready`], then every write streams a
//! [`StoreEvent::Write`].
pub mod memstore;
pub mod persistence;

use std::path::Path;
use std::sync::Arc;

use log::info;

pub use memstore::MemStore;
pub use persistence::Persistence;

use crate::{Operation, Result};

/// Lifecycle and replication events published by a store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// The store is open and reachable under `address`.
    Ready { address: String },
    /// Existing documents were loaded.
    Load { count: usize },
    /// A write was applied locally.
    Write { op: Operation },
}

/// Opens the replica `name` from `data_dir`.
///
/// The store is returned before it is announced, so listeners can
/// [`MemStore::subscribe`] first and then call [`MemStore::mark_ready`].
pub fn open<P: AsRef<Path>>(data_dir: P, name: &str) -> Result<Arc<MemStore>> {
    let persistence = Arc::new(Persistence::new(data_dir)?);
    let initial_data = persistence.load(name)?;
    let store = Arc::new(MemStore::new(name, initial_data, Some(persistence)));
    info!("Opened store {} with {} documents", store.address(), store.len());
    Ok(store)
}
