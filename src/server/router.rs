use std::sync::Arc;

use log::{error, info};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::model::{Entity, EntityKind, EntityUpdate};
use crate::ops::Filter;
use crate::{Error, Result, SectorStore};

const MAX_CONNECTIONS: usize = 100;

pub struct Router {
    store: Arc<dyn SectorStore>,
    semaphore: Arc<Semaphore>,
}

impl Router {
    pub fn new(store: Arc<dyn SectorStore>) -> Self {
        Self {
            store,
            semaphore: Arc::new(Semaphore::new(MAX_CONNECTIONS)),
        }
    }

    pub async fn listen(&self, port: &str) -> Result<()> {
        let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
        info!("Sector Store listening on port {}", port);

        loop {
            let (socket, _) = listener.accept().await?;
            let store = self.store.clone();
            let sem = self.semaphore.clone();

            tokio::spawn(async move {
                let _permit = match sem.try_acquire() {
                    Ok(p) => p,
                    Err(_) => {
                        error!("Server busy: too many concurrent connections. Rejecting...");
                        let mut socket = socket;
                        let _ = socket.shutdown().await;
                        return;
                    }
                };

                if let Err(e) = handle_connection(socket, store).await {
                    error!("Connection error: {}", e);
                }
            });
        }
    }
}

fn ok_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(format!("OK {}", serde_json::to_string(value)?))
}

fn err_line(e: &Error) -> String {
    format!("ERR {} {}", e.kind().as_str(), e.to_string().replace('\n', " "))
}

fn parse_id(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::NotFound(format!("{} ({})", s, e)))
}

fn parse_kind(s: &str) -> Result<EntityKind> {
    s.parse()
}

fn split_arg(rest: &str) -> (&str, &str) {
    match rest.split_once(' ') {
        Some((head, tail)) => (head, tail.trim()),
        None => (rest, ""),
    }
}

/// Runs one command line against the store and renders the response line.
async fn dispatch(store: &dyn SectorStore, command: &str, args: &str) -> Result<String> {
    match command {
        "PUT" => {
            let (kind, json) = split_arg(args);
            let entity = Entity::from_value(parse_kind(kind)?, serde_json::from_str(json)?)?;
            ok_json(&store.add(entity).await?)
        }
        "GET" => {
            let (first, second) = split_arg(args);
            if second.is_empty() {
                return ok_json(&store.get(parse_id(first)?).await?);
            }
            let kind = parse_kind(first)?;
            let entity = store.get(parse_id(second)?).await?;
            if entity.kind() != kind {
                return Err(Error::WrongType { expected: kind, found: entity.kind() });
            }
            ok_json(&entity)
        }
        "UPDATE" => {
            let (kind, rest) = split_arg(args);
            let (id, json) = split_arg(rest);
            let update = EntityUpdate::from_value(parse_kind(kind)?, serde_json::from_str(json)?)?;
            ok_json(&store.update(parse_id(id)?, update).await?)
        }
        "DEL" => {
            store.remove(parse_id(args)?).await?;
            Ok("OK".to_string())
        }
        "SEARCH" => {
            let (kind, json) = split_arg(args);
            let filter: Filter =
                if json.is_empty() { Filter::default() } else { serde_json::from_str(json)? };
            ok_json(&store.search(parse_kind(kind)?, &filter).await?)
        }
        "ADD_MEMBER" | "REMOVE_MEMBER" => {
            let (group, account) = split_arg(args);
            let (group, account) = (parse_id(group)?, parse_id(account)?);
            let updated = if command == "ADD_MEMBER" {
                store.add_member(group, account).await?
            } else {
                store.remove_member(group, account).await?
            };
            ok_json(&updated)
        }
        "PING" => Ok("PONG".to_string()),
        _ => Ok("ERR unknown command".to_string()),
    }
}

pub async fn handle_connection(mut socket: TcpStream, store: Arc<dyn SectorStore>) -> Result<()> {
    let (reader, mut writer) = socket.split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break;
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (command, args) = split_arg(line);
        let command = command.to_uppercase();
        if command == "QUIT" {
            break;
        }
        let needs_args = matches!(
            command.as_str(),
            "PUT" | "GET" | "UPDATE" | "DEL" | "SEARCH" | "ADD_MEMBER" | "REMOVE_MEMBER"
        );
        if needs_args && args.is_empty() {
            writer.write_all(b"ERR missing arguments\n").await?;
            continue;
        }

        let response = match dispatch(store.as_ref(), &command, args).await {
            Ok(resp) => resp,
            Err(e) => err_line(&e),
        };

        writer.write_all(format!("{}\n", response).as_bytes()).await?;
    }
    Ok(())
}
