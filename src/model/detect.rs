//! Best-fit type detection for untagged documents.
//!
//! The log has no schema column. Documents written by this crate carry a
//! `type` tag, which wins when present. Anything else is decoded against every
//! schema in [`EntityKind::ALL`] order and the decode with the most populated
//! fields is taken; the first schema wins a tie. Documents whose shapes overlap
//! heavily (a group with no description or members looks exactly like a
//! channel with no description or group) can be misclassified.

use log::debug;

use crate::model::codec::{decode_kind, TYPE_FIELD};
use crate::model::entity::{Entity, EntityKind};
use crate::{Document, Error, Result};

fn tagged_kind(doc: &Document) -> Option<EntityKind> {
    doc.get(TYPE_FIELD)?.as_str()?.parse().ok()
}

/// Decodes a document as whichever entity kind fits it best.
pub fn detect(doc: &Document) -> Result<Entity> {
    if let Some(kind) = tagged_kind(doc) {
        return decode_kind(doc, kind);
    }

    let mut best: Option<(usize, Entity)> = None;
    for kind in EntityKind::ALL {
        let candidate = match decode_kind(doc, kind) {
            Ok(e) => e,
            Err(e) => {
                debug!("document does not fit {}: {}", kind, e);
                continue;
            }
        };
        let populated = candidate.populated_fields();
        if populated == 0 {
            continue;
        }
        if best.as_ref().map_or(true, |(n, _)| populated > *n) {
            best = Some((populated, candidate));
        }
    }

    best.map(|(_, entity)| entity).ok_or(Error::UnknownType)
}

pub fn detect_kind(doc: &Document) -> Result<EntityKind> {
    detect(doc).map(|e| e.kind())
}
