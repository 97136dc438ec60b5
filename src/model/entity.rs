//! The four entity kinds of the chat domain and their sparse update forms.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::{Document, Error, Result};

/// The schemas a document can be decoded into, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Account,
    Group,
    Channel,
    Message,
}

impl EntityKind {
    /// Declaration order; the type detector breaks ties with it.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Account,
        EntityKind::Group,
        EntityKind::Channel,
        EntityKind::Message,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Account => "account",
            EntityKind::Group => "group",
            EntityKind::Channel => "channel",
            EntityKind::Message => "message",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "account" => Ok(EntityKind::Account),
            "group" => Ok(EntityKind::Group),
            "channel" => Ok(EntityKind::Channel),
            "message" => Ok(EntityKind::Message),
            _ => Err(Error::UnknownType),
        }
    }
}

/// A borrowed view of one entity field, used by search predicates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldRef<'a> {
    Id(Uuid),
    Ids(&'a [Uuid]),
    Text(&'a str),
    Flag(bool),
    Time(DateTime<Utc>),
}

/// Behaviour shared by every entity struct.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> Uuid;

    fn created_at(&self) -> Option<DateTime<Utc>>;

    fn set_created_at(&mut self, at: DateTime<Utc>);

    /// Number of fields holding a non-default value.
    fn populated_fields(&self) -> usize;

    /// Looks up a field by its storage name. Absent optional fields and
    /// fields the schema does not have both return `None`.
    fn field(&self, key: &str) -> Option<FieldRef<'_>>;

    fn into_entity(self) -> Entity;

    fn from_entity(entity: Entity) -> Option<Self>;
}

fn count(flags: &[bool]) -> usize {
    flags.iter().filter(|f| **f).count()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Account {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub username: String,
    pub profile_pic: String,
    /// PEM-encoded public key used for challenge-response login.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,
}

impl Record for Account {
    const KIND: EntityKind = EntityKind::Account;

    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn set_created_at(&mut self, at: DateTime<Utc>) {
        self.created_at = Some(at);
    }

    fn populated_fields(&self) -> usize {
        count(&[
            !self.id.is_nil(),
            self.created_at.is_some(),
            !self.username.is_empty(),
            !self.profile_pic.is_empty(),
            self.pubkey.is_some(),
        ])
    }

    fn field(&self, key: &str) -> Option<FieldRef<'_>> {
        match key {
            "id" => Some(FieldRef::Id(self.id)),
            "created_at" => self.created_at.map(FieldRef::Time),
            "username" => Some(FieldRef::Text(&self.username)),
            "profile_pic" => Some(FieldRef::Text(&self.profile_pic)),
            "pubkey" => self.pubkey.as_deref().map(FieldRef::Text),
            _ => None,
        }
    }

    fn into_entity(self) -> Entity {
        Entity::Account(self)
    }

    fn from_entity(entity: Entity) -> Option<Self> {
        match entity {
            Entity::Account(a) => Some(a),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Group {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub name: String,
    pub description: String,
    pub members: Vec<Uuid>,
}

impl Record for Group {
    const KIND: EntityKind = EntityKind::Group;

    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn set_created_at(&mut self, at: DateTime<Utc>) {
        self.created_at = Some(at);
    }

    fn populated_fields(&self) -> usize {
        count(&[
            !self.id.is_nil(),
            self.created_at.is_some(),
            !self.name.is_empty(),
            !self.description.is_empty(),
            !self.members.is_empty(),
        ])
    }

    fn field(&self, key: &str) -> Option<FieldRef<'_>> {
        match key {
            "id" => Some(FieldRef::Id(self.id)),
            "created_at" => self.created_at.map(FieldRef::Time),
            "name" => Some(FieldRef::Text(&self.name)),
            "description" => Some(FieldRef::Text(&self.description)),
            "members" => Some(FieldRef::Ids(&self.members)),
            _ => None,
        }
    }

    fn into_entity(self) -> Entity {
        Entity::Group(self)
    }

    fn from_entity(entity: Entity) -> Option<Self> {
        match entity {
            Entity::Group(g) => Some(g),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Channel {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The owning group.
    pub group: Uuid,
}

impl Record for Channel {
    const KIND: EntityKind = EntityKind::Channel;

    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn set_created_at(&mut self, at: DateTime<Utc>) {
        self.created_at = Some(at);
    }

    fn populated_fields(&self) -> usize {
        count(&[
            !self.id.is_nil(),
            self.created_at.is_some(),
            !self.name.is_empty(),
            self.description.is_some(),
            !self.group.is_nil(),
        ])
    }

    fn field(&self, key: &str) -> Option<FieldRef<'_>> {
        match key {
            "id" => Some(FieldRef::Id(self.id)),
            "created_at" => self.created_at.map(FieldRef::Time),
            "name" => Some(FieldRef::Text(&self.name)),
            "description" => self.description.as_deref().map(FieldRef::Text),
            "group" => Some(FieldRef::Id(self.group)),
            _ => None,
        }
    }

    fn into_entity(self) -> Entity {
        Entity::Channel(self)
    }

    fn from_entity(entity: Entity) -> Option<Self> {
        match entity {
            Entity::Channel(c) => Some(c),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Message {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub author: Uuid,
    pub body: String,
    pub channel: Uuid,
    pub pinned: bool,
}

impl Record for Message {
    const KIND: EntityKind = EntityKind::Message;

    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn set_created_at(&mut self, at: DateTime<Utc>) {
        self.created_at = Some(at);
    }

    fn populated_fields(&self) -> usize {
        count(&[
            !self.id.is_nil(),
            self.created_at.is_some(),
            !self.author.is_nil(),
            !self.body.is_empty(),
            !self.channel.is_nil(),
            self.pinned,
        ])
    }

    fn field(&self, key: &str) -> Option<FieldRef<'_>> {
        match key {
            "id" => Some(FieldRef::Id(self.id)),
            "created_at" => self.created_at.map(FieldRef::Time),
            "author" => Some(FieldRef::Id(self.author)),
            "body" => Some(FieldRef::Text(&self.body)),
            "channel" => Some(FieldRef::Id(self.channel)),
            "pinned" => Some(FieldRef::Flag(self.pinned)),
            _ => None,
        }
    }

    fn into_entity(self) -> Entity {
        Entity::Message(self)
    }

    fn from_entity(entity: Entity) -> Option<Self> {
        match entity {
            Entity::Message(m) => Some(m),
            _ => None,
        }
    }
}

/// Any one of the four entity kinds.
///
/// Serializes with a `type` tag. Deserializing goes through the type
/// detector, so untagged documents are accepted as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Entity {
    Account(Account),
    Group(Group),
    Channel(Channel),
    Message(Message),
}

macro_rules! each_entity {
    ($entity:expr, $inner:ident => $body:expr) => {
        match $entity {
            Entity::Account($inner) => $body,
            Entity::Group($inner) => $body,
            Entity::Channel($inner) => $body,
            Entity::Message($inner) => $body,
        }
    };
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Account(_) => EntityKind::Account,
            Entity::Group(_) => EntityKind::Group,
            Entity::Channel(_) => EntityKind::Channel,
            Entity::Message(_) => EntityKind::Message,
        }
    }

    pub fn id(&self) -> Uuid {
        each_entity!(self, e => e.id())
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        each_entity!(self, e => e.created_at())
    }

    pub fn set_created_at(&mut self, at: DateTime<Utc>) {
        each_entity!(self, e => e.set_created_at(at))
    }

    pub fn populated_fields(&self) -> usize {
        each_entity!(self, e => e.populated_fields())
    }

    pub fn field(&self, key: &str) -> Option<FieldRef<'_>> {
        each_entity!(self, e => e.field(key))
    }

    /// Parses a JSON value as the given kind.
    pub fn from_value(kind: EntityKind, value: serde_json::Value) -> Result<Self> {
        let entity = match kind {
            EntityKind::Account => Entity::Account(serde_json::from_value(value)?),
            EntityKind::Group => Entity::Group(serde_json::from_value(value)?),
            EntityKind::Channel => Entity::Channel(serde_json::from_value(value)?),
            EntityKind::Message => Entity::Message(serde_json::from_value(value)?),
        };
        Ok(entity)
    }
}

impl<'de> Deserialize<'de> for Entity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let doc = Document::deserialize(deserializer)?;
        crate::model::detect(&doc).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AccountUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GroupUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChannelUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MessageUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
}

/// A sparse update for one entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EntityUpdate {
    Account(AccountUpdate),
    Group(GroupUpdate),
    Channel(ChannelUpdate),
    Message(MessageUpdate),
}

impl EntityUpdate {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityUpdate::Account(_) => EntityKind::Account,
            EntityUpdate::Group(_) => EntityKind::Group,
            EntityUpdate::Channel(_) => EntityKind::Channel,
            EntityUpdate::Message(_) => EntityKind::Message,
        }
    }

    /// Parses a JSON value as an update for the given kind.
    pub fn from_value(kind: EntityKind, value: serde_json::Value) -> Result<Self> {
        let update = match kind {
            EntityKind::Account => EntityUpdate::Account(serde_json::from_value(value)?),
            EntityKind::Group => EntityUpdate::Group(serde_json::from_value(value)?),
            EntityKind::Channel => EntityUpdate::Channel(serde_json::from_value(value)?),
            EntityKind::Message => EntityUpdate::Message(serde_json::from_value(value)?),
        };
        Ok(update)
    }
}
