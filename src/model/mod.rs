/// Typed entities and their mapping to and from untyped documents.
///
/// Documents in the log carry no reliable schema, so every read goes through
/// [`detect`] or [`codec::decode`] before the rest of the crate sees it.
pub mod codec;
pub mod detect;
pub mod entity;

pub use codec::{decode, decode_kind, encode, encode_entity, encode_update};
pub use detect::{detect, detect_kind};
pub use entity::{
    Account, AccountUpdate, Channel, ChannelUpdate, Entity, EntityKind, EntityUpdate, FieldRef,
    Group, GroupUpdate, Message, MessageUpdate, Record,
};
