use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use serde_json::Value;
use uuid::Uuid;

use crate::model::codec::TYPE_FIELD;
use crate::model::{
    self, Channel, Entity, EntityKind, EntityUpdate, Group, GroupUpdate, Message, Record,
};
use crate::ops::locks::IdLocks;
use crate::ops::search::{self, Filter};
use crate::{
    Document, DocumentStore, EntityReader, EntityWriter, Error, Membership, Operation, Result,
};

/// The embedded Sector Store: typed, integrity-checked access to a [`DocumentStore`].
///
/// Every mutation is a sequence of independent store calls. Cascades are not
/// rolled back: when a step fails, the steps before it stay committed and the
/// error is returned as is.
pub struct Sector {
    store: Arc<dyn DocumentStore>,
    locks: IdLocks,
}

fn into_record<T: Record>(entity: Entity) -> Result<T> {
    let found = entity.kind();
    T::from_entity(entity).ok_or(Error::WrongType { expected: T::KIND, found })
}

fn members_update(members: Vec<Uuid>) -> EntityUpdate {
    EntityUpdate::Group(GroupUpdate { members: Some(members), ..Default::default() })
}

impl Sector {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store, locks: IdLocks::new() }
    }

    /// Fetches the single document stored under `id`.
    async fn fetch(&self, id: Uuid) -> Result<Document> {
        let key = id.to_string();
        let mut matches = self.store.get(&key).await?;
        match matches.len() {
            0 => Err(Error::NotFound(key)),
            1 => Ok(matches.remove(0)),
            _ => Err(Error::Ambiguous(key)),
        }
    }

    async fn persist(&self, doc: Document) -> Result<Document> {
        self.store.put(doc).await?.document()
    }

    async fn require_one(&self, kind: EntityKind, id: Uuid, role: &str) -> Result<()> {
        let found = search::search(self.store.as_ref(), kind, &Filter::ids([id])).await?;
        if found.len() != 1 {
            return Err(Error::Dependency(format!(
                "cannot find {} {} ({} matches)",
                role,
                id,
                found.len()
            )));
        }
        Ok(())
    }

    async fn check_dependencies(&self, entity: &Entity) -> Result<()> {
        match entity {
            Entity::Account(_) | Entity::Group(_) => Ok(()),
            Entity::Channel(channel) => {
                self.require_one(EntityKind::Group, channel.group, "group associated with channel")
                    .await
            }
            Entity::Message(message) => {
                let role = "channel associated with message";
                self.require_one(EntityKind::Channel, message.channel, role).await?;
                let role = "author associated with message";
                self.require_one(EntityKind::Account, message.author, role).await
            }
        }
    }

    /// Every member must resolve to its own account; duplicates fail too.
    async fn check_members(&self, members: &[Uuid]) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        let filter = Filter::ids(members.iter().copied());
        let found = search::search(self.store.as_ref(), EntityKind::Account, &filter).await?;
        if found.len() != members.len() {
            return Err(Error::Dependency(format!(
                "only {} of {} group members resolve to accounts",
                found.len(),
                members.len()
            )));
        }
        Ok(())
    }

    /// Update without taking the id lock; callers hold it.
    async fn apply_update(&self, id: Uuid, update: &EntityUpdate) -> Result<Entity> {
        let mut doc = self.fetch(id).await?;
        let kind = update.kind();
        let found = model::detect_kind(&doc)?;
        if found != kind {
            return Err(Error::WrongType { expected: kind, found });
        }

        for (key, value) in model::encode_update(update)? {
            doc.insert(key, value);
        }
        doc.insert(TYPE_FIELD.to_string(), Value::String(kind.as_str().to_string()));

        if let EntityUpdate::Group(GroupUpdate { members: Some(members), .. }) = update {
            self.check_members(members).await?;
        }

        let stored = self.persist(doc).await?;
        model::decode_kind(&stored, kind)
    }

    async fn delete_doc(&self, kind: EntityKind, id: Uuid) -> Result<()> {
        debug!("Cascade: deleting {} {}", kind, id);
        self.store.delete(&id.to_string()).await?;
        Ok(())
    }

    async fn delete_messages(&self, channels: Vec<Uuid>) -> Result<()> {
        let filter = Filter { channel: Some(channels), ..Default::default() };
        let messages: Vec<Message> = search::search_as(self.store.as_ref(), &filter).await?;
        for message in messages {
            self.delete_doc(EntityKind::Message, message.id).await?;
        }
        Ok(())
    }

    async fn cascade(&self, entity: &Entity) -> Result<()> {
        match entity {
            Entity::Account(account) => {
                let filter = Filter { members: Some(vec![account.id]), ..Default::default() };
                let groups: Vec<Group> = search::search_as(self.store.as_ref(), &filter).await?;
                for group in groups {
                    let _guard = self.locks.lock(group.id).await;
                    // Re-read under the lock so concurrent member changes are kept.
                    let current: Group = self.get_as(group.id).await?;
                    let members =
                        current.members.into_iter().filter(|m| *m != account.id).collect();
                    debug!("Cascade: removing account {} from group {}", account.id, group.id);
                    self.apply_update(group.id, &members_update(members)).await?;
                }
            }
            Entity::Group(group) => {
                let filter = Filter { group: Some(vec![group.id]), ..Default::default() };
                let channels: Vec<Channel> = search::search_as(self.store.as_ref(), &filter).await?;
                let mut channel_ids = Vec::with_capacity(channels.len());
                for channel in channels {
                    self.delete_doc(EntityKind::Channel, channel.id).await?;
                    channel_ids.push(channel.id);
                }
                if !channel_ids.is_empty() {
                    self.delete_messages(channel_ids).await?;
                }
            }
            Entity::Channel(channel) => self.delete_messages(vec![channel.id]).await?,
            Entity::Message(_) => {}
        }
        Ok(())
    }

    /// Fetches an entity and checks it is of kind `T`.
    pub async fn get_as<T: Record>(&self, id: Uuid) -> Result<T> {
        into_record(self.get(id).await?)
    }

    pub async fn search_as<T: Record>(&self, filter: &Filter) -> Result<Vec<T>> {
        search::search_as(self.store.as_ref(), filter).await
    }

    /// Writes entities in one batch without any integrity checks.
    pub async fn seed(&self, entities: &[Entity]) -> Result<Operation> {
        let docs = entities.iter().map(model::encode_entity).collect::<Result<Vec<_>>>()?;
        info!("Seeding {} documents", docs.len());
        self.store.put_all(docs).await
    }
}

#[async_trait]
impl EntityReader for Sector {
    async fn get(&self, id: Uuid) -> Result<Entity> {
        let doc = self.fetch(id).await?;
        model::detect(&doc)
    }

    async fn search(&self, kind: EntityKind, filter: &Filter) -> Result<Vec<Entity>> {
        search::search(self.store.as_ref(), kind, filter).await
    }
}

#[async_trait]
impl EntityWriter for Sector {
    async fn add(&self, mut entity: Entity) -> Result<Entity> {
        let id = entity.id();
        let _guard = self.locks.lock(id).await;

        if !self.store.get(&id.to_string()).await?.is_empty() {
            return Err(Error::AlreadyExists(id.to_string()));
        }
        self.check_dependencies(&entity).await?;

        if entity.created_at().is_none() {
            entity.set_created_at(Utc::now());
        }
        debug!("Adding {} {}", entity.kind(), id);
        let stored = self.persist(model::encode_entity(&entity)?).await?;
        model::decode_kind(&stored, entity.kind())
    }

    async fn update(&self, id: Uuid, update: EntityUpdate) -> Result<Entity> {
        let _guard = self.locks.lock(id).await;
        debug!("Updating {} {}", update.kind(), id);
        self.apply_update(id, &update).await
    }

    async fn remove(&self, id: Uuid) -> Result<()> {
        let _guard = self.locks.lock(id).await;
        let doc = self.fetch(id).await?;
        let entity = model::detect(&doc)?;

        debug!("Removing {} {}", entity.kind(), id);
        self.cascade(&entity).await?;
        self.store.delete(&id.to_string()).await?;
        Ok(())
    }
}

#[async_trait]
impl Membership for Sector {
    async fn add_member(&self, group_id: Uuid, account_id: Uuid) -> Result<Group> {
        let _guard = self.locks.lock(group_id).await;
        let group: Group = self.get_as(group_id).await?;
        self.require_one(EntityKind::Account, account_id, "account to add to group").await?;

        if group.members.contains(&account_id) {
            return Ok(group);
        }
        let mut members = group.members;
        members.push(account_id);
        debug!("Adding member {} to group {}", account_id, group_id);
        into_record(self.apply_update(group_id, &members_update(members)).await?)
    }

    async fn remove_member(&self, group_id: Uuid, account_id: Uuid) -> Result<Group> {
        let _guard = self.locks.lock(group_id).await;
        let group: Group = self.get_as(group_id).await?;

        if !group.members.contains(&account_id) {
            return Err(Error::NotFound(account_id.to_string()));
        }
        let members = group.members.into_iter().filter(|m| *m != account_id).collect();
        debug!("Removing member {} from group {}", account_id, group_id);
        into_record(self.apply_update(group_id, &members_update(members)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemStore;
    use crate::model::{Account, AccountUpdate, ChannelUpdate};

    /// Delays every read, widening the gap between an existence check and the write.
    struct SlowReads(MemStore);

    #[async_trait]
    impl DocumentStore for SlowReads {
        async fn put(&self, doc: Document) -> Result<Operation> {
            self.0.put(doc).await
        }

        async fn put_all(&self, docs: Vec<Document>) -> Result<Operation> {
            self.0.put_all(docs).await
        }

        async fn get(&self, id: &str) -> Result<Vec<Document>> {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            self.0.get(id).await
        }

        async fn delete(&self, id: &str) -> Result<Operation> {
            self.0.delete(id).await
        }

        async fn query(
            &self,
            predicate: &(dyn for<'a> Fn(&'a Document) -> bool + Send + Sync),
        ) -> Result<Vec<Document>> {
            self.0.query(predicate).await
        }
    }

    fn sector() -> Sector {
        Sector::new(Arc::new(MemStore::new("test", Vec::new(), None)))
    }

    fn account(name: &str) -> Account {
        Account { id: Uuid::new_v4(), username: name.to_string(), ..Default::default() }
    }

    #[tokio::test]
    async fn test_add_defaults_created_at() {
        let sector = sector();
        let created = sector.add(Entity::Account(account("Maverick"))).await.unwrap();
        assert!(created.created_at().is_some());

        let fetched: Account = sector.get_as(created.id()).await.unwrap();
        assert_eq!(fetched.created_at, created.created_at());
    }

    #[tokio::test]
    async fn test_concurrent_adds_of_one_id_are_serialized() {
        let store = Arc::new(SlowReads(MemStore::new("test", Vec::new(), None)));
        let sector = Sector::new(store.clone());
        let first = account("Maverick");
        let second = Account { username: "Goose".to_string(), ..first.clone() };

        let (a, b) = tokio::join!(
            sector.add(Entity::Account(first.clone())),
            sector.add(Entity::Account(second))
        );

        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results.iter().filter(|r| matches!(r, Err(Error::AlreadyExists(_)))).count(),
            1
        );
        assert_eq!(store.get(&first.id.to_string()).await.unwrap().len(), 1);
        assert!(sector.locks.is_empty());
    }

    #[tokio::test]
    async fn test_update_of_wrong_kind_is_rejected() {
        let sector = sector();
        let a = account("Maverick");
        sector.add(Entity::Account(a.clone())).await.unwrap();

        let res = sector
            .update(
                a.id,
                EntityUpdate::Channel(ChannelUpdate {
                    name: Some("x".to_string()),
                    ..Default::default()
                }),
            )
            .await;
        assert!(matches!(
            res,
            Err(Error::WrongType { expected: EntityKind::Channel, found: EntityKind::Account })
        ));

        let res = sector.get_as::<Group>(a.id).await;
        assert!(matches!(res, Err(Error::WrongType { .. })));
    }

    #[tokio::test]
    async fn test_update_missing_id() {
        let sector = sector();
        let res = sector
            .update(Uuid::new_v4(), EntityUpdate::Account(AccountUpdate::default()))
            .await;
        assert!(matches!(res, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_member_add_is_idempotent_and_remove_checks_membership() {
        let sector = sector();
        let a = account("John Doe");
        let g =
            Group { id: Uuid::new_v4(), name: "Test Group 3".to_string(), ..Default::default() };
        sector.add(Entity::Account(a.clone())).await.unwrap();
        sector.add(Entity::Group(g.clone())).await.unwrap();

        let once = sector.add_member(g.id, a.id).await.unwrap();
        let twice = sector.add_member(g.id, a.id).await.unwrap();
        assert_eq!(once.members, vec![a.id]);
        assert_eq!(twice.members, vec![a.id]);

        let res = sector.add_member(g.id, Uuid::new_v4()).await;
        assert!(matches!(res, Err(Error::Dependency(_))));

        let removed = sector.remove_member(g.id, a.id).await.unwrap();
        assert!(removed.members.is_empty());
        let res = sector.remove_member(g.id, a.id).await;
        assert!(matches!(res, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_seed_bypasses_checks() {
        let sector = sector();
        let dangling = Channel {
            id: Uuid::new_v4(),
            name: "Orphan".to_string(),
            group: Uuid::new_v4(),
            ..Default::default()
        };
        sector.seed(&[Entity::Channel(dangling.clone())]).await.unwrap();
        let fetched: Channel = sector.get_as(dangling.id).await.unwrap();
        assert_eq!(fetched, dangling);
    }
}
