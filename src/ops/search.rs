//! Filtered search over the whole document set.
//!
//! Predicates are chosen by field name, not by value type:
//!
//! | key                          | predicate                                   |
//! |------------------------------|---------------------------------------------|
//! | `id` `group` `author` `channel` | entry value is one of the filter values  |
//! | `members`                    | every filter value is in the entry list     |
//! | `username` `name` `body`     | fuzzy subsequence match                     |
//! | `pinned`                     | equality                                    |
//! | `from` / `until`             | `created_at` is not before / not after      |
//!
//! A predicate is skipped when the filter leaves it unset or the entry has no
//! such field. An entry passes when every remaining predicate passes.

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{decode_kind, detect, Entity, EntityKind, FieldRef, Record};
use crate::{DocumentStore, Result};

/// A sparse search filter. Unset fields place no constraint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Vec<Uuid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<Vec<Uuid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<Vec<Uuid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<Vec<Uuid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<Uuid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
enum Predicate<'a> {
    Contains(&'a [Uuid]),
    ContainsAll(&'a [Uuid]),
    Fuzzy(&'a str),
    Exact(bool),
    NotBefore(DateTime<Utc>),
    NotAfter(DateTime<Utc>),
}

impl Predicate<'_> {
    fn test(&self, entry: FieldRef<'_>) -> bool {
        match (*self, entry) {
            (Predicate::Contains(want), FieldRef::Id(id)) => want.contains(&id),
            (Predicate::ContainsAll(want), FieldRef::Ids(have)) => {
                want.iter().all(|id| have.contains(id))
            }
            (Predicate::Fuzzy(want), FieldRef::Text(have)) => fuzzy_match(want, have),
            (Predicate::Exact(want), FieldRef::Flag(have)) => want == have,
            (Predicate::NotBefore(from), FieldRef::Time(at)) => at >= from,
            (Predicate::NotAfter(until), FieldRef::Time(at)) => at <= until,
            _ => false,
        }
    }
}

impl Filter {
    pub fn ids(ids: impl IntoIterator<Item = Uuid>) -> Self {
        Self { id: Some(ids.into_iter().collect()), ..Default::default() }
    }

    /// Active predicates paired with the entry field each one reads.
    fn predicates(&self) -> Vec<(&'static str, Predicate<'_>)> {
        let mut out = Vec::new();
        let contains = [
            ("id", &self.id),
            ("group", &self.group),
            ("author", &self.author),
            ("channel", &self.channel),
        ];
        for (key, values) in contains {
            if let Some(values) = values {
                out.push((key, Predicate::Contains(values)));
            }
        }
        if let Some(members) = &self.members {
            out.push(("members", Predicate::ContainsAll(members)));
        }
        let texts = [("username", &self.username), ("name", &self.name), ("body", &self.body)];
        for (key, text) in texts {
            if let Some(text) = text {
                out.push((key, Predicate::Fuzzy(text)));
            }
        }
        if let Some(pinned) = self.pinned {
            out.push(("pinned", Predicate::Exact(pinned)));
        }
        if let Some(from) = self.from {
            out.push(("created_at", Predicate::NotBefore(from)));
        }
        if let Some(until) = self.until {
            out.push(("created_at", Predicate::NotAfter(until)));
        }
        out
    }

    /// Reports whether an entity passes every active predicate.
    pub fn matches(&self, entity: &Entity) -> bool {
        self.predicates().into_iter().all(|(key, predicate)| match entity.field(key) {
            Some(value) => predicate.test(value),
            None => true,
        })
    }
}

/// Reports whether every character of `source` appears in `target`, in order.
pub fn fuzzy_match(source: &str, target: &str) -> bool {
    let mut rest = target.chars();
    source.chars().all(|wanted| rest.any(|c| c == wanted))
}

/// Scans the store for entities of `kind` that pass `filter`.
///
/// Documents that cannot be classified or decoded are skipped.
pub async fn search(
    store: &dyn DocumentStore,
    kind: EntityKind,
    filter: &Filter,
) -> Result<Vec<Entity>> {
    let docs = store
        .query(&|doc| match detect(doc) {
            Ok(entity) => entity.kind() == kind && filter.matches(&entity),
            Err(_) => false,
        })
        .await?;

    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        match decode_kind(&doc, kind) {
            Ok(entity) => out.push(entity),
            Err(e) => warn!("Skipping unreadable {} document: {}", kind, e),
        }
    }
    Ok(out)
}

pub async fn search_as<T: Record>(store: &dyn DocumentStore, filter: &Filter) -> Result<Vec<T>> {
    Ok(search(store, T::KIND, filter).await?.into_iter().filter_map(T::from_entity).collect())
}
