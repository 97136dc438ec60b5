use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::model::{Entity, EntityKind, EntityUpdate, Group, Record};
use crate::ops::Filter;
use crate::{EntityReader, EntityWriter, Error, ErrorKind, Membership, Result};

/// Remote [`crate::SectorStore`] speaking the daemon's line protocol.
pub struct Client {
    addr: String,
    inner: Mutex<Option<ClientInner>>,
}

struct ClientInner {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

/// Turns an `ERR <kind> <message>` payload back into an error.
fn remote_error(payload: &str) -> Error {
    let (kind, message) = match payload.split_once(' ') {
        Some((head, tail)) => match ErrorKind::parse(head) {
            Some(kind) => (kind, tail.to_string()),
            None => (ErrorKind::Store, payload.to_string()),
        },
        None => (ErrorKind::Store, payload.to_string()),
    };
    Error::Remote { kind, message }
}

impl Client {
    pub async fn connect(addr: &str) -> Result<Self> {
        let inner = Client::connect_inner(addr).await?;
        Ok(Self {
            addr: addr.to_string(),
            inner: Mutex::new(Some(inner)),
        })
    }

    async fn send_and_receive(&self, cmd: String) -> Result<String> {
        let mut inner_guard = self.inner.lock().await;

        // Retry logic
        for i in 0..3 {
            if inner_guard.is_none() {
                match Client::connect_inner(&self.addr).await {
                    Ok(inner) => *inner_guard = Some(inner),
                    Err(e) => {
                        if i == 2 {
                            return Err(e);
                        }
                        tokio::time::sleep(std::time::Duration::from_millis((i + 1) * 200)).await;
                        continue;
                    }
                }
            }

            let Some(inner) = inner_guard.as_mut() else { continue };

            if inner.writer.write_all(format!("{}\n", cmd).as_bytes()).await.is_err() {
                *inner_guard = None;
                continue;
            }

            let mut resp = String::new();
            match inner.reader.read_line(&mut resp).await {
                Ok(0) | Err(_) => {
                    *inner_guard = None;
                    continue;
                }
                Ok(_) => {
                    let resp = resp.trim();
                    if let Some(payload) = resp.strip_prefix("ERR ") {
                        return Err(remote_error(payload));
                    }
                    return Ok(resp.to_string());
                }
            }
        }

        Err(Error::Internal("failed after 3 attempts".to_string()))
    }

    async fn connect_inner(addr: &str) -> Result<ClientInner> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        Ok(ClientInner {
            reader: BufReader::new(reader),
            writer,
        })
    }

    async fn request<T: DeserializeOwned>(&self, cmd: String) -> Result<T> {
        let resp = self.send_and_receive(cmd).await?;
        let json_data = resp
            .strip_prefix("OK ")
            .ok_or_else(|| Error::Internal("Invalid response".to_string()))?;
        Ok(serde_json::from_str(json_data)?)
    }

    pub async fn ping(&self) -> Result<()> {
        match self.send_and_receive("PING".to_string()).await?.as_str() {
            "PONG" => Ok(()),
            other => Err(Error::Internal(format!("unexpected reply to PING: {}", other))),
        }
    }

    /// Fetches an entity of kind `T`.
    pub async fn get_as<T: Record>(&self, id: Uuid) -> Result<T> {
        self.request(format!("GET {} {}", T::KIND, id)).await
    }

    pub async fn search_as<T: Record>(&self, filter: &Filter) -> Result<Vec<T>> {
        self.request(format!("SEARCH {} {}", T::KIND, serde_json::to_string(filter)?)).await
    }

    pub async fn add_generic<T: Record>(&self, record: &T) -> Result<T> {
        self.request(put_command(T::KIND, record)?).await
    }
}

fn put_command<T: Serialize>(kind: EntityKind, value: &T) -> Result<String> {
    Ok(format!("PUT {} {}", kind, serde_json::to_string(value)?))
}

#[async_trait]
impl EntityReader for Client {
    async fn get(&self, id: Uuid) -> Result<Entity> {
        self.request(format!("GET {}", id)).await
    }

    async fn search(&self, kind: EntityKind, filter: &Filter) -> Result<Vec<Entity>> {
        let values: Vec<serde_json::Value> =
            self.request(format!("SEARCH {} {}", kind, serde_json::to_string(filter)?)).await?;
        values.into_iter().map(|v| Entity::from_value(kind, v)).collect()
    }
}

#[async_trait]
impl EntityWriter for Client {
    async fn add(&self, entity: Entity) -> Result<Entity> {
        let kind = entity.kind();
        let value: serde_json::Value = self.request(put_command(kind, &entity)?).await?;
        Entity::from_value(kind, value)
    }

    async fn update(&self, id: Uuid, update: EntityUpdate) -> Result<Entity> {
        let kind = update.kind();
        let value: serde_json::Value = self
            .request(format!("UPDATE {} {} {}", kind, id, serde_json::to_string(&update)?))
            .await?;
        Entity::from_value(kind, value)
    }

    async fn remove(&self, id: Uuid) -> Result<()> {
        self.send_and_receive(format!("DEL {}", id)).await?;
        Ok(())
    }
}

#[async_trait]
impl Membership for Client {
    async fn add_member(&self, group_id: Uuid, account_id: Uuid) -> Result<Group> {
        self.request(format!("ADD_MEMBER {} {}", group_id, account_id)).await
    }

    async fn remove_member(&self, group_id: Uuid, account_id: Uuid) -> Result<Group> {
        self.request(format!("REMOVE_MEMBER {} {}", group_id, account_id)).await
    }
}
