//! Versioned Resource Store
//!
//! Holds the live resource graph behind a lock and hands out independent
//! optimistic transactions. Each entity carries a version that is bumped on
//! every write; a transaction records the version of everything it reads or
//! writes and commits only if none of them moved in the meantime.

use super::events::StoreEvent;
use super::graph::ResourceGraph;
use crate::domain::{Entity, Resource, ResourceId};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

struct StoreState {
    graph: ResourceGraph,
    versions: HashMap<ResourceId, u64>,
    revision: u64,
}

impl StoreState {
    fn version(&self, id: &ResourceId) -> u64 {
        self.versions.get(id).copied().unwrap_or(0)
    }

    fn write(&mut self, resource: Resource) {
        let id = resource.id().clone();
        *self.versions.entry(id).or_insert(0) += 1;
        self.graph.upsert(resource);
    }
}

/// Live, versioned resource graph
pub struct ResourceStore {
    state: RwLock<StoreState>,
    event_sender: broadcast::Sender<StoreEvent>,
}

impl ResourceStore {
    pub fn new(graph: ResourceGraph) -> Arc<Self> {
        let (event_sender, _) = broadcast::channel(1024);
        Arc::new(Self {
            state: RwLock::new(StoreState {
                graph,
                versions: HashMap::new(),
                revision: 0,
            }),
            event_sender,
        })
    }

    /// Get an event receiver
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.event_sender.subscribe()
    }

    /// Point-in-time copy of the whole graph
    pub fn snapshot(&self) -> ResourceGraph {
        self.state.read().graph.clone()
    }

    pub fn get<T: Entity>(&self, id: &ResourceId) -> Option<T> {
        self.state.read().graph.get::<T>(id).cloned()
    }

    pub fn version(&self, id: &ResourceId) -> u64 {
        self.state.read().version(id)
    }

    pub fn revision(&self) -> u64 {
        self.state.read().revision
    }

    /// Write outside any transaction; concurrent transactions that touched
    /// the entity will fail to commit
    pub fn upsert<T: Entity>(&self, entity: T) {
        let id = entity.id().to_string();
        {
            let mut state = self.state.write();
            state.write(entity.into_resource());
            state.revision += 1;
        }
        let _ = self.event_sender.send(StoreEvent::ResourceUpserted {
            id,
            kind: T::KIND.to_string(),
        });
    }

    /// Open an independent transaction
    pub fn begin(self: &Arc<Self>) -> Transaction {
        Transaction {
            store: Arc::clone(self),
            observed: HashMap::new(),
            writes: BTreeMap::new(),
        }
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// Optimistic unit of work over the store.
///
/// Reads see the transaction's own writes first. Nothing is visible to
/// other readers until [`Transaction::commit`]; dropping the transaction
/// discards it.
pub struct Transaction {
    store: Arc<ResourceStore>,
    observed: HashMap<ResourceId, u64>,
    writes: BTreeMap<ResourceId, Resource>,
}

impl Transaction {
    fn observe(&mut self, id: &ResourceId, version: u64) {
        self.observed.entry(id.clone()).or_insert(version);
    }

    /// Read any resource, preferring this transaction's pending writes
    pub fn resource(&mut self, id: &ResourceId) -> Option<Resource> {
        if let Some(resource) = self.writes.get(id) {
            return Some(resource.clone());
        }
        let (resource, version) = {
            let state = self.store.state.read();
            (state.graph.resource(id).cloned(), state.version(id))
        };
        self.observe(id, version);
        resource
    }

    pub fn find<T: Entity>(&mut self, id: &ResourceId) -> Option<T> {
        self.resource(id)
            .and_then(|resource| T::from_resource(&resource).cloned())
    }

    pub fn load<T: Entity>(&mut self, id: &ResourceId) -> Result<T> {
        self.find::<T>(id).ok_or_else(|| Error::not_found(T::KIND, id))
    }

    pub fn save<T: Entity>(&mut self, entity: T) {
        let id = entity.id().clone();
        if !self.observed.contains_key(&id) {
            let version = self.store.version(&id);
            self.observe(&id, version);
        }
        self.writes.insert(id, entity.into_resource());
    }

    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    /// Apply every write atomically, or none if anything observed changed
    pub fn commit(self) -> Result<u64> {
        let written: Vec<String> = self.writes.keys().map(|id| id.to_string()).collect();
        let revision = {
            let mut state = self.store.state.write();

            let stale = self
                .observed
                .iter()
                .find(|(id, version)| state.version(id) != **version)
                .map(|(id, _)| id.clone());
            if let Some(resource) = stale {
                drop(state);
                warn!("Transaction rejected, {} changed concurrently", resource);
                let _ = self.store.event_sender.send(StoreEvent::TransactionConflicted {
                    resource: resource.to_string(),
                });
                return Err(Error::CommitConflict {
                    resource: resource.to_string(),
                });
            }

            for resource in self.writes.into_values() {
                state.write(resource);
            }
            state.revision += 1;
            state.revision
        };

        debug!("Committed revision {} ({} resources)", revision, written.len());
        let _ = self
            .store
            .event_sender
            .send(StoreEvent::TransactionCommitted { revision, written });
        Ok(revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ComposedNode, Drive};
    use assert_matches::assert_matches;

    fn store() -> Arc<ResourceStore> {
        let mut graph = ResourceGraph::new();
        graph.insert(ComposedNode::new("/nodes/1"));
        graph.insert(Drive {
            id: "/drives/1".into(),
            ..Default::default()
        });
        ResourceStore::new(graph)
    }

    #[test]
    fn test_commit_applies_writes() {
        let store = store();
        let mut tx = store.begin();

        let mut drive: Drive = tx.load(&"/drives/1".into()).unwrap();
        drive.allocated = true;
        tx.save(drive);
        assert_eq!(tx.pending_writes(), 1);

        // Not visible before commit
        assert!(!store.get::<Drive>(&"/drives/1".into()).unwrap().allocated);

        let revision = tx.commit().unwrap();
        assert_eq!(revision, 1);
        assert!(store.get::<Drive>(&"/drives/1".into()).unwrap().allocated);
        assert_eq!(store.version(&"/drives/1".into()), 1);
    }

    #[test]
    fn test_concurrent_write_conflicts() {
        let store = store();
        let mut tx = store.begin();
        let mut node: ComposedNode = tx.load(&"/nodes/1".into()).unwrap();
        node.name = Some("first".into());

        // Somebody else writes the same row
        let mut other = ComposedNode::new("/nodes/1");
        other.name = Some("second".into());
        store.upsert(other);

        tx.save(node);
        assert_matches!(tx.commit(), Err(Error::CommitConflict { resource }) if resource == "/nodes/1");
        assert_eq!(
            store.get::<ComposedNode>(&"/nodes/1".into()).unwrap().name.as_deref(),
            Some("second")
        );
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let store = store();
        {
            let mut tx = store.begin();
            let mut drive: Drive = tx.load(&"/drives/1".into()).unwrap();
            drive.allocated = true;
            tx.save(drive);
        }
        assert!(!store.get::<Drive>(&"/drives/1".into()).unwrap().allocated);
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn test_reads_see_own_writes() {
        let store = store();
        let mut tx = store.begin();
        tx.save(Drive {
            id: "/drives/2".into(),
            allocated: true,
            ..Default::default()
        });
        let drive: Drive = tx.load(&"/drives/2".into()).unwrap();
        assert!(drive.allocated);
        assert!(tx.load::<Drive>(&"/drives/9".into()).is_err());
    }

    #[tokio::test]
    async fn test_commit_event_broadcast() {
        let store = store();
        let mut events = store.subscribe();

        let mut tx = store.begin();
        tx.save(ComposedNode::new("/nodes/2"));
        tx.commit().unwrap();

        match events.recv().await.unwrap() {
            StoreEvent::TransactionCommitted { written, .. } => {
                assert_eq!(written, vec!["/nodes/2".to_string()]);
            }
            other => panic!("unexpected event {}", other),
        }
    }
}
