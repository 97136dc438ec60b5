use std::env;
use std::sync::Arc;

use log::{info, warn};

use crate::engine;
use crate::ops::Sector;
use crate::sdk::Client;
use crate::{Result, SectorStore};

/// Store name used when `SECTOR_STORE_NAME` is unset.
pub const DEFAULT_STORE_NAME: &str = "sectordb";

/// Initializes a [`SectorStore`] based on the environment.
///
/// 1. If `SECTOR_STORE_ADDR` is set and a daemon answers there, the store runs
///    in **Remote Mode** over [`Client`].
/// 2. Otherwise the replica named by `SECTOR_STORE_NAME` is opened from
///    `data_dir` and wrapped in an embedded [`Sector`].
///
/// # Examples
///
/// ```no_run
/// use sector_store::sdk;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let store = sdk::new("./data").await?;
///     Ok(())
/// }
/// ```
pub async fn new(data_dir: &str) -> Result<Arc<dyn SectorStore>> {
    if let Ok(addr) = env::var("SECTOR_STORE_ADDR") {
        if !addr.is_empty() {
            match Client::connect(&addr).await {
                Ok(client) => {
                    info!("Using remote store at {}", addr);
                    return Ok(Arc::new(client));
                }
                Err(e) => warn!("Could not reach {}: {}. Falling back to embedded mode.", addr, e),
            }
        }
    }

    let name = env::var("SECTOR_STORE_NAME")
        .ok()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_STORE_NAME.to_string());
    let store = engine::open(data_dir, &name)?;
    store.mark_ready();
    Ok(Arc::new(Sector::new(store)))
}
