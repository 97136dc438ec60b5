use async_trait::async_trait;
use chrono::{Duration, Utc};
use sector_store::engine::MemStore;
use sector_store::model::{
    Account, AccountUpdate, Channel, Entity, EntityKind, EntityUpdate, Group, GroupUpdate, Message,
};
use sector_store::ops::{Filter, Sector};
use sector_store::{Document, DocumentStore, EntityReader, EntityWriter, Error, Operation, Result};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

struct Fixture {
    sector: Sector,
    store: Arc<MemStore>,
    accounts: Vec<Account>,
    groups: Vec<Group>,
    channels: Vec<Channel>,
    messages: Vec<Message>,
}

fn account(name: &str, at: chrono::DateTime<Utc>) -> Account {
    Account {
        id: Uuid::new_v4(),
        created_at: Some(at),
        username: name.to_string(),
        ..Default::default()
    }
}

fn rename(username: &str) -> EntityUpdate {
    EntityUpdate::Account(AccountUpdate {
        username: Some(username.to_string()),
        ..Default::default()
    })
}

fn group(name: &str, description: &str) -> Group {
    Group {
        id: Uuid::new_v4(),
        created_at: Some(Utc::now()),
        name: name.to_string(),
        description: description.to_string(),
        members: Vec::new(),
    }
}

fn channel(name: &str, group: Uuid) -> Channel {
    Channel {
        id: Uuid::new_v4(),
        created_at: Some(Utc::now()),
        name: name.to_string(),
        description: Some(format!("{} talk", name)),
        group,
    }
}

fn message(author: Uuid, channel: Uuid, body: &str, pinned: bool) -> Message {
    Message {
        id: Uuid::new_v4(),
        created_at: Some(Utc::now()),
        author,
        body: body.to_string(),
        channel,
        pinned,
    }
}

async fn fixture() -> Fixture {
    let now = Utc::now();
    let then = now - Duration::days(7);

    let accounts = vec![
        account("John Doe", now),
        account("Jack Doe", then),
        account("Maverick", now),
        account("w311un1!k3", then),
        account("woefullyconsideringlove", then),
    ];
    let groups = vec![
        group("Test Group 1", "A group for unit testing."),
        group("Test Group 2", "Another unit testing group."),
        group("Advanced Test Group 1", "For advanced testing."),
    ];
    let channels = vec![
        channel("General", groups[0].id),
        channel("Random", groups[1].id),
        channel("Announcements", groups[2].id),
    ];
    let messages = vec![
        message(accounts[0].id, channels[0].id, "Hello everyone!", false),
        message(accounts[1].id, channels[0].id, "Hey John, how's it going?", false),
        message(accounts[2].id, channels[1].id, "Anyone up for a game?", false),
        message(accounts[0].id, channels[2].id, "Important update!", true),
    ];

    let store = Arc::new(MemStore::new("test", Vec::new(), None));
    let sector = Sector::new(store.clone());

    let mut entities: Vec<Entity> = Vec::new();
    entities.extend(accounts.iter().cloned().map(Entity::Account));
    entities.extend(groups.iter().cloned().map(Entity::Group));
    entities.extend(channels.iter().cloned().map(Entity::Channel));
    entities.extend(messages.iter().cloned().map(Entity::Message));
    sector.seed(&entities).await.unwrap();

    Fixture { sector, store, accounts, groups, channels, messages }
}

#[tokio::test]
async fn test_add_then_get_round_trip() {
    let f = fixture().await;
    let created = f
        .sector
        .add(Entity::Account(Account {
            id: Uuid::new_v4(),
            username: "CreateAccount".to_string(),
            profile_pic: "pic.png".to_string(),
            pubkey: Some("-----BEGIN PUBLIC KEY-----".to_string()),
            ..Default::default()
        }))
        .await
        .unwrap();

    let fetched = f.sector.get(created.id()).await.unwrap();
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn test_add_existing_id_is_rejected() {
    let f = fixture().await;
    let dup = Account { username: "Someone Else".to_string(), ..f.accounts[2].clone() };

    let res = f.sector.add(Entity::Account(dup)).await;
    assert!(matches!(res, Err(Error::AlreadyExists(_))));

    let kept: Account = f.sector.get_as(f.accounts[2].id).await.unwrap();
    assert_eq!(kept.username, "Maverick");
}

#[tokio::test]
async fn test_channel_requires_its_group() {
    let f = fixture().await;

    let orphan = channel("Tech", Uuid::new_v4());
    let res = f.sector.add(Entity::Channel(orphan.clone())).await;
    assert!(matches!(res, Err(Error::Dependency(_))));
    assert!(matches!(f.sector.get(orphan.id).await, Err(Error::NotFound(_))));

    let ok = channel("Tech", f.groups[1].id);
    f.sector.add(Entity::Channel(ok.clone())).await.unwrap();
    let fetched: Channel = f.sector.get_as(ok.id).await.unwrap();
    assert_eq!(fetched.group, f.groups[1].id);
}

#[tokio::test]
async fn test_message_requires_channel_and_author() {
    let f = fixture().await;

    let res = f
        .sector
        .add(Entity::Message(message(Uuid::new_v4(), f.channels[0].id, "who am I", false)))
        .await;
    assert!(matches!(res, Err(Error::Dependency(_))));

    let res = f
        .sector
        .add(Entity::Message(message(f.accounts[0].id, Uuid::new_v4(), "where am I", false)))
        .await;
    assert!(matches!(res, Err(Error::Dependency(_))));

    f.sector
        .add(Entity::Message(message(f.accounts[0].id, f.channels[0].id, "here", false)))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_remove_account_cleans_group_members() {
    let f = fixture().await;
    let a = f.accounts[0].id;
    let b = f.accounts[1].id;
    f.sector
        .update(
            f.groups[0].id,
            EntityUpdate::Group(GroupUpdate { members: Some(vec![a, b]), ..Default::default() }),
        )
        .await
        .unwrap();

    f.sector.remove(a).await.unwrap();

    let g: Group = f.sector.get_as(f.groups[0].id).await.unwrap();
    assert_eq!(g.members, vec![b]);
    assert!(matches!(f.sector.remove(a).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_remove_group_cascades_to_channels_and_messages() {
    let f = fixture().await;

    f.sector.remove(f.groups[0].id).await.unwrap();

    assert!(matches!(f.sector.get(f.channels[0].id).await, Err(Error::NotFound(_))));
    assert!(matches!(f.sector.get(f.messages[0].id).await, Err(Error::NotFound(_))));
    assert!(matches!(f.sector.get(f.messages[1].id).await, Err(Error::NotFound(_))));

    // Other groups are untouched.
    assert!(f.sector.get(f.channels[1].id).await.is_ok());
    assert!(f.sector.get(f.messages[2].id).await.is_ok());
}

#[tokio::test]
async fn test_remove_channel_cascades_to_messages() {
    let f = fixture().await;

    f.sector.remove(f.channels[2].id).await.unwrap();

    assert!(matches!(f.sector.get(f.messages[3].id).await, Err(Error::NotFound(_))));
    assert!(f.sector.get(f.groups[2].id).await.is_ok());
}

#[tokio::test]
async fn test_search_messages_by_author() {
    let f = fixture().await;
    let filter = Filter { author: Some(vec![f.accounts[0].id]), ..Default::default() };

    let found = f.sector.search(EntityKind::Message, &filter).await.unwrap();
    let mut ids: Vec<Uuid> = found.iter().map(Entity::id).collect();
    ids.sort();
    let mut expected = vec![f.messages[0].id, f.messages[3].id];
    expected.sort();
    assert_eq!(ids, expected);

    let pinned: Vec<Message> = f
        .sector
        .search_as(&Filter { pinned: Some(true), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(pinned.len(), 1);
    assert_eq!(pinned[0].body, "Important update!");
}

#[tokio::test]
async fn test_fuzzy_search_by_username_and_name() {
    let f = fixture().await;

    let filter = Filter { username: Some("Doe".to_string()), ..Default::default() };
    let found = f.sector.search(EntityKind::Account, &filter).await.unwrap();
    assert_eq!(found.len(), 2);

    let groups: Vec<Group> = f
        .sector
        .search_as(&Filter { name: Some("Advanced".to_string()), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(groups.len(), 1);

    let all = f.sector.search(EntityKind::Account, &Filter::default()).await.unwrap();
    assert_eq!(all.len(), f.accounts.len());
}

#[tokio::test]
async fn test_search_time_range_is_inclusive() {
    let store = Arc::new(MemStore::new("test", Vec::new(), None));
    let sector = Sector::new(store);
    let t = Utc::now();

    let old = account("old", t - Duration::days(10));
    let mid = account("mid", t - Duration::days(7));
    let new = account("new", t - Duration::days(1));
    sector
        .seed(&[Entity::Account(old.clone()), Entity::Account(mid.clone()), Entity::Account(new)])
        .await
        .unwrap();

    let filter = Filter {
        from: Some(t - Duration::days(10)),
        until: Some(t - Duration::days(5)),
        ..Default::default()
    };
    let found: Vec<Account> = sector.search_as(&filter).await.unwrap();
    assert_eq!(found, vec![old, mid]);
}

#[tokio::test]
async fn test_update_keeps_absent_fields() {
    let f = fixture().await;
    let mut a = account("Original", Utc::now());
    a.profile_pic = "https://example.com/me.png".to_string();
    a.pubkey = Some("KEY".to_string());
    f.sector.add(Entity::Account(a.clone())).await.unwrap();

    let updated = f.sector.update(a.id, rename("X")).await.unwrap();

    let Entity::Account(updated) = updated else { panic!("expected an account") };
    assert_eq!(updated.username, "X");
    assert_eq!(updated.profile_pic, a.profile_pic);
    assert_eq!(updated.pubkey, a.pubkey);
    assert_eq!(updated.created_at, a.created_at);
}

#[tokio::test]
async fn test_members_must_all_resolve() {
    let f = fixture().await;
    let g = f.groups[1].id;

    let res = f
        .sector
        .update(
            g,
            EntityUpdate::Group(GroupUpdate {
                members: Some(vec![f.accounts[0].id, Uuid::new_v4()]),
                ..Default::default()
            }),
        )
        .await;
    assert!(matches!(res, Err(Error::Dependency(_))));

    let res = f
        .sector
        .update(
            g,
            EntityUpdate::Group(GroupUpdate {
                members: Some(vec![f.accounts[0].id, f.accounts[0].id]),
                ..Default::default()
            }),
        )
        .await;
    assert!(matches!(res, Err(Error::Dependency(_))));

    let unchanged: Group = f.sector.get_as(g).await.unwrap();
    assert!(unchanged.members.is_empty());
}

#[tokio::test]
async fn test_search_skips_undecodable_documents() {
    let f = fixture().await;
    let broken = [
        json!({"id": "broken-1", "type": "account", "username": 42}),
        json!({"id": "broken-2", "colour": "blue"}),
    ];
    for doc in broken {
        f.store.put(doc.as_object().cloned().unwrap()).await.unwrap();
    }

    let found = f.sector.search(EntityKind::Account, &Filter::default()).await.unwrap();
    assert_eq!(found.len(), f.accounts.len());
}

#[tokio::test]
async fn test_untagged_documents_are_detected() {
    let store = Arc::new(MemStore::new("test", Vec::new(), None));
    let sector = Sector::new(store.clone());
    let group_id = Uuid::new_v4();
    let channel_id = Uuid::new_v4();
    let docs: Vec<Document> = [
        json!({"id": group_id, "name": "Test Group 1", "description": "A group", "members": []}),
        json!({"id": channel_id, "name": "General", "description": "talk", "group": group_id}),
    ]
    .into_iter()
    .filter_map(|v| v.as_object().cloned())
    .collect();
    store.put_all(docs).await.unwrap();

    assert_eq!(sector.get(group_id).await.unwrap().kind(), EntityKind::Group);
    assert_eq!(sector.get(channel_id).await.unwrap().kind(), EntityKind::Channel);

    let channels: Vec<Channel> = sector
        .search_as(&Filter { group: Some(vec![group_id]), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(channels.len(), 1);
}

/// Answers every `get` with the stored document twice.
struct DuplicatingStore(MemStore);

#[async_trait]
impl DocumentStore for DuplicatingStore {
    async fn put(&self, doc: Document) -> Result<Operation> {
        self.0.put(doc).await
    }

    async fn put_all(&self, docs: Vec<Document>) -> Result<Operation> {
        self.0.put_all(docs).await
    }

    async fn get(&self, id: &str) -> Result<Vec<Document>> {
        let mut docs = self.0.get(id).await?;
        docs.extend(docs.clone());
        Ok(docs)
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

#[tokio::test]
async fn test_duplicate_ids_are_ambiguous() {
    let sector = Sector::new(Arc::new(DuplicatingStore(MemStore::new("test", Vec::new(), None))));
    let a = account("Twin", Utc::now());
    sector.seed(&[Entity::Account(a.clone())]).await.unwrap();

    assert!(matches!(sector.get(a.id).await, Err(Error::Ambiguous(_))));
    assert!(matches!(sector.update(a.id, rename("X")).await, Err(Error::Ambiguous(_))));
    assert!(matches!(sector.remove(a.id).await, Err(Error::Ambiguous(_))));
}

/// Refuses to delete one document.
struct StuckDelete {
    inner: MemStore,
    stuck: String,
}

#[async_trait]
impl DocumentStore for StuckDelete {
    async fn put(&self, doc: Document) -> Result<Operation> {
        self.inner.put(doc).await
    }

    async fn put_all(&self, docs: Vec<Document>) -> Result<Operation> {
        self.inner.put_all(docs).await
    }

    async fn get(&self, id: &str) -> Result<Vec<Document>> {
        self.inner.get(id).await
    }

    async fn delete(&self, id: &str) -> Result<Operation> {
        if id == self.stuck {
            return Err(Error::Internal(format!("cannot delete {}", id)));
        }
        self.inner.delete(id).await
    }

    async fn query(
        &self,
        predicate: &(dyn for<'a> Fn(&'a Document) -> bool + Send + Sync),
    ) -> Result<Vec<Document>> {
        self.inner.query(predicate).await
    }
}

#[tokio::test]
async fn test_failed_cascade_step_keeps_earlier_steps() {
    let author = account("John Doe", Utc::now());
    let g = group("Test Group 1", "A group for unit testing.");
    let c = channel("General", g.id);
    let m = message(author.id, c.id, "Hello everyone!", false);

    let store =
        StuckDelete { inner: MemStore::new("test", Vec::new(), None), stuck: m.id.to_string() };
    let sector = Sector::new(Arc::new(store));
    sector
        .seed(&[
            Entity::Account(author),
            Entity::Group(g.clone()),
            Entity::Channel(c.clone()),
            Entity::Message(m.clone()),
        ])
        .await
        .unwrap();

    let res = sector.remove(g.id).await;
    assert!(matches!(res, Err(Error::Internal(_))));

    assert!(matches!(sector.get(c.id).await, Err(Error::NotFound(_))));
    assert!(sector.get(m.id).await.is_ok());
    let root: Group = sector.get_as(g.id).await.unwrap();
    assert_eq!(root, g);
}
