use std::env;
use std::sync::Arc;

use clap::Parser;
use log::{debug, error, info};
use sector_store::engine::{self, StoreEvent};
use sector_store::ops::Sector;
use sector_store::sdk::discovery::DEFAULT_STORE_NAME;
use sector_store::server::Router;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long)]
    data_dir: Option<String>,

    #[arg(short, long)]
    port: Option<String>,

    /// Name of the replica to open.
    #[arg(short = 'n', long)]
    store_name: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();
    let args = Args::parse();

    let data_dir = args.data_dir
        .or_else(|| env::var("SECTOR_DATA_DIR").ok())
        .unwrap_or_else(|| "data".to_string());

    let port = args.port
        .or_else(|| env::var("SECTOR_PORT").ok())
        .unwrap_or_else(|| "7001".to_string());

    let store_name = args.store_name
        .or_else(|| env::var("SECTOR_STORE_NAME").ok())
        .unwrap_or_else(|| DEFAULT_STORE_NAME.to_string());

    info!("Starting Sector Store daemon...");
    let store = engine::open(&data_dir, &store_name)?;

    let mut events = store.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(StoreEvent::Write { op }) => debug!("Got event {:?} {:?}", op.op, op.key),
                Ok(event) => info!("Got event {:?}", event),
                Err(RecvError::Lagged(n)) => debug!("Event listener skipped {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    store.mark_ready();

    let router = Router::new(Arc::new(Sector::new(store.clone())));
    info!("Engine started. Loaded {} documents from {}", store.len(), store.address());

    tokio::select! {
        res = router.listen(&port) => {
            if let Err(e) = res {
                error!("TCP Server failed: {}", e);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received. Finalizing disk writes...");
            store.wait().await;
            info!("Persistence complete. Exiting.");
        }
    }

    Ok(())
}
