use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::engine::{Persistence, StoreEvent};
use crate::{Document, DocumentStore, Error, OpKind, Operation, Result, ID_FIELD};

const EVENT_CAPACITY: usize = 256;

/// Id-keyed documents kept in first-write order.
#[derive(Default)]
struct Replica {
    seq: u64,
    order: BTreeMap<u64, Document>,
    ids: HashMap<String, u64>,
}

impl Replica {
    fn upsert(&mut self, id: String, doc: Document) {
        match self.ids.get(&id) {
            Some(pos) => {
                self.order.insert(*pos, doc);
            }
            None => {
                self.seq += 1;
                self.order.insert(self.seq, doc);
                self.ids.insert(id, self.seq);
            }
        }
        // Writes that replace a document still bump the version used to
        // order snapshots.
        self.seq += 1;
    }

    fn remove(&mut self, id: &str) -> Option<Document> {
        let pos = self.ids.remove(id)?;
        self.seq += 1;
        self.order.remove(&pos)
    }
}

fn doc_id(doc: &Document) -> Result<String> {
    doc.get(ID_FIELD)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| Error::Internal(format!("document has no string '{}' field", ID_FIELD)))
}

/// The local replica of the document log.
///
/// Documents live in memory; when a [`Persistence`] is attached every write
/// schedules a snapshot on a blocking task.
pub struct MemStore {
    name: String,
    data: RwLock<Replica>,
    persistence: Option<Arc<Persistence>>,
    pending_tasks: Arc<AtomicUsize>,
    events: broadcast::Sender<StoreEvent>,
}

impl MemStore {
    pub fn new(
        name: &str,
        initial_data: Vec<Document>,
        persistence: Option<Arc<Persistence>>,
    ) -> Self {
        let mut replica = Replica::default();
        for doc in initial_data {
            match doc_id(&doc) {
                Ok(id) => replica.upsert(id, doc),
                Err(e) => log::warn!("Dropping document without id from {}: {}", name, e),
            }
        }
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            name: name.to_string(),
            data: RwLock::new(replica),
            persistence,
            pending_tasks: Arc::new(AtomicUsize::new(0)),
            events,
        }
    }

    /// Address peers would use to open the same log.
    pub fn address(&self) -> String {
        format!("/sector/{}", self.name)
    }

    pub fn len(&self) -> usize {
        self.data.read().unwrap().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Announces that the replica finished loading and accepts requests.
    pub fn mark_ready(&self) {
        self.emit(StoreEvent::Load { count: self.len() });
        self.emit(StoreEvent::Ready { address: self.address() });
    }

    /// Resolves once every scheduled snapshot has been written.
    pub async fn wait(&self) {
        while self.pending_tasks.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn snapshot(&self) -> (u64, Vec<Document>) {
        let data = self.data.read().unwrap();
        (data.seq, data.order.values().cloned().collect())
    }

    async fn persist(&self) {
        if let Some(p) = &self.persistence {
            let (version, docs) = self.snapshot();
            let p = p.clone();
            let name = self.name.clone();
            let pending = self.pending_tasks.clone();
            pending.fetch_add(1, Ordering::SeqCst);
            tokio::task::spawn_blocking(move || {
                if let Err(e) = p.save_snapshot(&name, version, &docs) {
                    log::error!("Failed to persist store {}: {}", name, e);
                }
                pending.fetch_sub(1, Ordering::SeqCst);
            });
        }
    }

    async fn committed(&self, op: Operation) -> Operation {
        self.persist().await;
        self.emit(StoreEvent::Write { op: op.clone() });
        op
    }
}

#[async_trait]
impl DocumentStore for MemStore {
    async fn put(&self, doc: Document) -> Result<Operation> {
        let id = doc_id(&doc)?;
        let value = serde_json::to_string(&doc)?;
        {
            let mut data = self.data.write().unwrap();
            data.upsert(id.clone(), doc);
        }
        Ok(self.committed(Operation { op: OpKind::Put, key: Some(id), value }).await)
    }

    async fn put_all(&self, docs: Vec<Document>) -> Result<Operation> {
        let ids = docs.iter().map(doc_id).collect::<Result<Vec<_>>>()?;
        let value = serde_json::to_string(&docs)?;
        {
            let mut data = self.data.write().unwrap();
            for (id, doc) in ids.into_iter().zip(docs) {
                data.upsert(id, doc);
            }
        }
        Ok(self.committed(Operation { op: OpKind::PutAll, key: None, value }).await)
    }

    async fn get(&self, id: &str) -> Result<Vec<Document>> {
        let data = self.data.read().unwrap();
        Ok(data
            .ids
            .get(id)
            .and_then(|pos| data.order.get(pos))
            .cloned()
            .into_iter()
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<Operation> {
        {
            let mut data = self.data.write().unwrap();
            data.remove(id).ok_or_else(|| Error::NotFound(id.to_string()))?;
        }
        let op = Operation { op: OpKind::Del, key: Some(id.to_string()), value: String::new() };
        Ok(self.committed(op).await)
    }

    async fn query(
        &self,
        predicate: &(dyn for<'a> Fn(&'a Document) -> bool + Send + Sync),
    ) -> Result<Vec<Document>> {
        let data = self.data.read().unwrap();
        Ok(data.order.values().filter(|doc| predicate(doc)).cloned().collect())
    }
}
