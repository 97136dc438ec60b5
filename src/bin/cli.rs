use clap::{Parser, Subcommand};
use sector_store::model::{Entity, EntityKind, EntityUpdate};
use sector_store::ops::Filter;
use sector_store::sdk;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "data")]
    data_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Prints the entity stored under an id.
    Get { id: Uuid },
    /// Adds an entity given as JSON.
    Put { kind: EntityKind, json: String },
    /// Merges the fields in JSON onto a stored entity.
    Update { kind: EntityKind, id: Uuid, json: String },
    /// Removes an entity and everything depending on it.
    Del { id: Uuid },
    /// Lists entities of a kind matching a JSON filter.
    Search {
        kind: EntityKind,
        #[arg(default_value = "{}")]
        filter: String,
    },
    AddMember { group: Uuid, account: Uuid },
    RemoveMember { group: Uuid, account: Uuid },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();
    let cli = Cli::parse();
    let store = sdk::new(&cli.data_dir).await?;

    match cli.command {
        Commands::Get { id } => {
            let entity = store.get(id).await?;
            println!("{}", serde_json::to_string_pretty(&entity)?);
        }
        Commands::Put { kind, json } => {
            let entity = Entity::from_value(kind, serde_json::from_str(&json)?)?;
            let created = store.add(entity).await?;
            println!("{}", serde_json::to_string_pretty(&created)?);
        }
        Commands::Update { kind, id, json } => {
            let update = EntityUpdate::from_value(kind, serde_json::from_str(&json)?)?;
            let updated = store.update(id, update).await?;
            println!("{}", serde_json::to_string_pretty(&updated)?);
        }
        Commands::Del { id } => {
            store.remove(id).await?;
            println!("OK");
        }
        Commands::Search { kind, filter } => {
            let filter: Filter = serde_json::from_str(&filter)?;
            let found = store.search(kind, &filter).await?;
            println!("{}", serde_json::to_string_pretty(&found)?);
        }
        Commands::AddMember { group, account } => {
            let group = store.add_member(group, account).await?;
            println!("{}", serde_json::to_string_pretty(&group)?);
        }
        Commands::RemoveMember { group, account } => {
            let group = store.remove_member(group, account).await?;
            println!("{}", serde_json::to_string_pretty(&group)?);
        }
    }

    Ok(())
}
