use serde_json::Value;

use crate::model::entity::{Entity, EntityKind, EntityUpdate, Record};
use crate::{Document, Error, Result};

/// Name of the discriminator written into every encoded document.
pub const TYPE_FIELD: &str = "type";

fn to_document<T: serde::Serialize>(value: &T) -> Result<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::Internal(format!("expected a JSON object, got {}", other))),
    }
}

/// Serializes a record into the document shape the store persists.
pub fn encode<T: Record>(record: &T) -> Result<Document> {
    let mut doc = to_document(record)?;
    doc.insert(TYPE_FIELD.to_string(), Value::String(T::KIND.as_str().to_string()));
    Ok(doc)
}

pub fn encode_entity(entity: &Entity) -> Result<Document> {
    match entity {
        Entity::Account(a) => encode(a),
        Entity::Group(g) => encode(g),
        Entity::Channel(c) => encode(c),
        Entity::Message(m) => encode(m),
    }
}

/// Serializes only the fields an update carries.
pub fn encode_update(update: &EntityUpdate) -> Result<Document> {
    to_document(update)
}

/// Decodes a document into a record.
///
/// Missing fields take their default value and unknown fields are ignored,
/// but any field with the wrong JSON type fails the whole decode.
pub fn decode<T: Record>(doc: &Document) -> Result<T> {
    serde_json::from_value(Value::Object(doc.clone()))
        .map_err(|source| Error::Decode { kind: T::KIND, source })
}

pub fn decode_kind(doc: &Document, kind: EntityKind) -> Result<Entity> {
    Ok(match kind {
        EntityKind::Account => Entity::Account(decode(doc)?),
        EntityKind::Group => Entity::Group(decode(doc)?),
        EntityKind::Channel => Entity::Channel(decode(doc)?),
        EntityKind::Message => Entity::Message(decode(doc)?),
    })
}
