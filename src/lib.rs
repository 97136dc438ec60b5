//! Sector Store is a peer-replicated document store for a chat-like domain.
//!
//! Accounts, groups, channels and messages are persisted as untyped JSON
//! documents in a replicated, id-keyed document log. This crate is the layer
//! on top of that log: it turns documents back into typed entities, keeps
//! references between entities consistent and answers filtered searches.
//!
//! ## Core Components
//! - [`model`]: Typed entities, the document codec and the type detector.
//! - [`ops`]: Search engine and the add/update/remove operations.
//! - [`engine`]: The local replica implementing [`DocumentStore`] (in-memory with persistence).
//! - [`sdk`]: Client libraries for both embedded and remote (TCP) modes.
//! - [`server`]: TCP daemon implementation.

pub mod engine;
pub mod model;
pub mod ops;
pub mod sdk;
pub mod server;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::model::{Entity, EntityKind, EntityUpdate, Group};
use crate::ops::search::Filter;

/// An untyped, string-keyed record as persisted by the document log.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Name of the field every document is keyed by.
pub const ID_FIELD: &str = "id";

/// Errors returned by the Sector Store.
#[derive(Error, Debug)]
pub enum Error {
    /// No document matches the id.
    #[error("item for id {0} not found")]
    NotFound(String),
    /// More than one document matches the id.
    #[error("too many items for id {0} found")]
    Ambiguous(String),
    /// An item with this id is already stored.
    #[error("item with id {0} already exists")]
    AlreadyExists(String),
    /// A referenced entity does not resolve to the expected count.
    #[error("dependency error: {0}")]
    Dependency(String),
    /// A document does not fit the schema it was decoded into.
    #[error("cannot decode {kind}: {source}")]
    Decode {
        kind: EntityKind,
        #[source]
        source: serde_json::Error,
    },
    /// A document does not match any known schema.
    #[error("unknown item type")]
    UnknownType,
    /// A document matched a different schema than the one requested.
    #[error("expected {expected} but found {found}")]
    WrongType { expected: EntityKind, found: EntityKind },
    /// An error reported by a remote store.
    #[error("{message}")]
    Remote { kind: ErrorKind, message: String },
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
    /// An I/O error occurred during persistence or network communication.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Error during JSON serialization or deserialization.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A specialized Result type for Sector Store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of [`Error`], stable across the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Ambiguous,
    AlreadyExists,
    Dependency,
    Decode,
    UnknownType,
    Store,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Ambiguous => "ambiguous",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::Dependency => "dependency",
            ErrorKind::Decode => "decode",
            ErrorKind::UnknownType => "unknown_type",
            ErrorKind::Store => "store",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "not_found" => ErrorKind::NotFound,
            "ambiguous" => ErrorKind::Ambiguous,
            "already_exists" => ErrorKind::AlreadyExists,
            "dependency" => ErrorKind::Dependency,
            "decode" => ErrorKind::Decode,
            "unknown_type" => ErrorKind::UnknownType,
            "store" => ErrorKind::Store,
            _ => return None,
        })
    }

    /// HTTP status code a request layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::AlreadyExists => 409,
            ErrorKind::Dependency | ErrorKind::UnknownType => 422,
            ErrorKind::Decode => 400,
            ErrorKind::Ambiguous | ErrorKind::Store => 500,
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Ambiguous(_) => ErrorKind::Ambiguous,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::Dependency(_) => ErrorKind::Dependency,
            Error::Decode { .. } => ErrorKind::Decode,
            Error::UnknownType | Error::WrongType { .. } => ErrorKind::UnknownType,
            Error::Remote { kind, .. } => *kind,
            Error::Serialization(_) => ErrorKind::Decode,
            Error::Internal(_) | Error::Io(_) => ErrorKind::Store,
        }
    }
}

/// The kind of write a store acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OpKind {
    Put,
    PutAll,
    Del,
}

/// Acknowledgement of a write to the document log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub op: OpKind,
    pub key: Option<String>,
    /// JSON text of the written value; empty for deletes.
    pub value: String,
}

impl Operation {
    /// Decodes the acknowledged value back into a document.
    pub fn document(&self) -> Result<Document> {
        Ok(serde_json::from_str(&self.value)?)
    }
}

/// The narrow interface required from the replicated document log.
///
/// Documents are keyed by their `id` field. Implementations decide how writes
/// are replicated; callers treat every method as an opaque, possibly slow call.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Upserts a document by its `id` field.
    async fn put(&self, doc: Document) -> Result<Operation>;
    /// Upserts many documents at once.
    async fn put_all(&self, docs: Vec<Document>) -> Result<Operation>;
    /// Returns every document stored under `id`.
    async fn get(&self, id: &str) -> Result<Vec<Document>>;
    /// Deletes the document stored under `id`.
    async fn delete(&self, id: &str) -> Result<Operation>;
    /// Returns every document the predicate accepts, in store iteration order.
    async fn query(
        &self,
        predicate: &(dyn for<'a> Fn(&'a Document) -> bool + Send + Sync),
    ) -> Result<Vec<Document>>;
}

/// Read access to typed entities.
#[async_trait]
pub trait EntityReader: Send + Sync {
    /// Fetches the entity stored under `id`, whatever its kind.
    async fn get(&self, id: Uuid) -> Result<Entity>;
    /// Returns every entity of `kind` matching `filter`.
    async fn search(&self, kind: EntityKind, filter: &Filter) -> Result<Vec<Entity>>;
}

/// Integrity-checked mutations.
#[async_trait]
pub trait EntityWriter: Send + Sync {
    /// Creates an entity after checking its id is free and its references resolve.
    async fn add(&self, entity: Entity) -> Result<Entity>;
    /// Merges the present fields of `update` onto the stored entity.
    async fn update(&self, id: Uuid, update: EntityUpdate) -> Result<Entity>;
    /// Deletes an entity together with everything that depends on it.
    async fn remove(&self, id: Uuid) -> Result<()>;
}

/// Group membership management.
#[async_trait]
pub trait Membership: Send + Sync {
    /// Adds an account to a group's members.
    async fn add_member(&self, group_id: Uuid, account_id: Uuid) -> Result<Group>;
    /// Removes an account from a group's members.
    async fn remove_member(&self, group_id: Uuid, account_id: Uuid) -> Result<Group>;
}

/// The primary interface for interacting with the Sector Store.
///
/// Implemented by the embedded [`ops::Sector`] and the remote [`sdk::Client`].
pub trait SectorStore: EntityReader + EntityWriter + Membership {}

impl<T: EntityReader + EntityWriter + Membership> SectorStore for T {}
