//! The shared shape store: a conflict-free replicated map from shape id to
//! shape record.
//!
//! Layout inside the document:
//! ```text
//! doc
//! └── "shapes" (map)
//!     └── <shape id> -> JSON-encoded shape record (one register per shape)
//! ```
//!
//! Each shape is stored as a single last-writer-wins register, so concurrent
//! rewrites of the same shape converge to exactly one writer's record (ordered
//! by the document's logical clock, peer id breaking ties). Edits to different
//! shapes never conflict. Mutations go through [`ShapeStore::transact`], which
//! tags the batch with an [`Origin`] and reports before/after values to
//! observers.

use crate::now_millis;
use crate::shapes::{Shape, ShapeId};
use loro::{ExportMode, LoroDoc, LoroMap, LoroValue, ValueOrContainer, VersionVector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

const SHAPES_KEY: &str = "shapes";

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("crdt error: {0}")]
    Crdt(String),
    #[error("malformed shape record: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Label identifying where a transaction came from. The history layer keeps a
/// tracked set of origins and ignores everything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// A human edit on this connection.
    User,
    /// An automation engine edit.
    Automation,
    /// An undo/redo application. Never tracked, or undo would record itself.
    History,
    /// State that arrived through `merge`.
    Remote,
    /// Untagged local writes (plain `set`/`delete`, internal reconciliation).
    Local,
    Other(String),
}

impl Origin {
    pub fn as_str(&self) -> &str {
        match self {
            Origin::User => "user",
            Origin::Automation => "automation",
            Origin::History => "history",
            Origin::Remote => "remote",
            Origin::Local => "local",
            Origin::Other(s) => s,
        }
    }
}

/// One shape's before/after within a transaction. `before: None` means the
/// shape was created, `after: None` that it was deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeChange {
    pub id: ShapeId,
    pub before: Option<Shape>,
    pub after: Option<Shape>,
}

/// Reported to observers after every transaction and merge.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionEvent {
    pub origin: Origin,
    /// Milliseconds since the Unix epoch, taken at commit.
    pub at_ms: u64,
    pub changes: Vec<ShapeChange>,
}

pub type ObserverId = u64;

type ObserverFn = Box<dyn Fn(&TransactionEvent) + Send>;

/// Staged writes inside one `transact` body. Reads see staged writes first,
/// then the committed state.
pub struct Txn<'a> {
    store: &'a ShapeStore,
    staged: Vec<(ShapeId, Option<Shape>)>,
}

impl Txn<'_> {
    pub fn get(&self, id: &str) -> Option<Shape> {
        for (sid, value) in self.staged.iter().rev() {
            if sid.as_str() == id {
                return value.clone();
            }
        }
        self.store.get(id)
    }

    pub fn set(&mut self, shape: Shape) {
        self.staged.push((shape.id.clone(), Some(shape)));
    }

    pub fn delete(&mut self, id: impl Into<ShapeId>) {
        self.staged.push((id.into(), None));
    }
}

/// The replicated shape store for one replica.
pub struct ShapeStore {
    doc: LoroDoc,
    /// Frontier of what `updates_since_checkpoint` has already exported.
    checkpoint: VersionVector,
    observers: Vec<(ObserverId, ObserverFn)>,
    next_observer: ObserverId,
}

impl Default for ShapeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ShapeStore {
    pub fn new() -> Self {
        let doc = LoroDoc::new();
        let checkpoint = doc.oplog_vv();
        Self {
            doc,
            checkpoint,
            observers: Vec::new(),
            next_observer: 0,
        }
    }

    /// Rebuild a replica from snapshot bytes.
    pub fn from_snapshot(bytes: &[u8]) -> Result<Self, StoreError> {
        let mut store = Self::new();
        store
            .doc
            .import(bytes)
            .map_err(|e| StoreError::Crdt(e.to_string()))?;
        store.checkpoint = store.doc.oplog_vv();
        Ok(store)
    }

    fn shapes_map(&self) -> LoroMap {
        self.doc.get_map(SHAPES_KEY)
    }

    /// The replica's peer id within the replication log.
    pub fn peer_id(&self) -> u64 {
        self.doc.peer_id()
    }

    pub fn len(&self) -> usize {
        self.shapes_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read one shape. A record that fails to decode is treated as absent.
    pub fn get(&self, id: &str) -> Option<Shape> {
        match self.shapes_map().get(id) {
            Some(ValueOrContainer::Value(value)) => match decode_shape(&value) {
                Ok(shape) => Some(shape),
                Err(e) => {
                    log::warn!("dropping undecodable record {id}: {e}");
                    None
                }
            },
            _ => None,
        }
    }

    /// Every shape keyed by id.
    pub fn snapshot_map(&self) -> HashMap<ShapeId, Shape> {
        let mut result = HashMap::new();
        let value = self.shapes_map().get_deep_value();
        if let LoroValue::Map(entries) = value {
            for (id, raw) in entries.iter() {
                match decode_shape(raw) {
                    Ok(shape) => {
                        result.insert(id.clone(), shape);
                    }
                    Err(e) => log::warn!("dropping undecodable record {id}: {e}"),
                }
            }
        }
        result
    }

    /// All shapes ordered back to front (z index, id as tie-break).
    pub fn list(&self) -> Vec<Shape> {
        let mut shapes: Vec<Shape> = self.snapshot_map().into_values().collect();
        shapes.sort_by(|a, b| a.z_index.cmp(&b.z_index).then_with(|| a.id.cmp(&b.id)));
        shapes
    }

    /// Write one shape outside any tagged transaction.
    pub fn set(&mut self, shape: Shape) -> Result<TransactionEvent, StoreError> {
        self.transact(Origin::Local, |txn| txn.set(shape))
    }

    /// Delete one shape outside any tagged transaction.
    pub fn delete(&mut self, id: &str) -> Result<TransactionEvent, StoreError> {
        let id = id.to_string();
        self.transact(Origin::Local, |txn| txn.delete(id))
    }

    /// Apply a batch of writes atomically, tagged with `origin`.
    ///
    /// The batch commits as one unit, observers are notified once, and the
    /// returned event carries each touched shape's before/after (coalesced
    /// per id when the body writes a shape more than once).
    pub fn transact(
        &mut self,
        origin: Origin,
        body: impl FnOnce(&mut Txn),
    ) -> Result<TransactionEvent, StoreError> {
        let staged = {
            let mut txn = Txn {
                store: self,
                staged: Vec::new(),
            };
            body(&mut txn);
            txn.staged
        };

        let map = self.shapes_map();
        let mut changes: Vec<ShapeChange> = Vec::new();
        for (id, after) in staged {
            let before = self.get(&id);
            match &after {
                Some(shape) => {
                    let raw = serde_json::to_string(shape)?;
                    map.insert(&id, raw)
                        .map_err(|e| StoreError::Crdt(e.to_string()))?;
                }
                None => {
                    if before.is_none() {
                        continue;
                    }
                    map.delete(&id).map_err(|e| StoreError::Crdt(e.to_string()))?;
                }
            }
            record_change(&mut changes, id, before, after);
        }
        self.doc.commit();

        let event = TransactionEvent {
            origin,
            at_ms: now_millis(),
            changes,
        };
        log::debug!(
            "transact origin={} changed {} shape(s)",
            event.origin.as_str(),
            event.changes.len()
        );
        self.notify(&event);
        Ok(event)
    }

    /// Merge remote update or snapshot bytes into this replica.
    ///
    /// Idempotent, commutative and associative: replicas that have seen the
    /// same set of operations converge regardless of arrival order. Observers
    /// receive one `Origin::Remote` event describing the net record changes.
    pub fn merge(&mut self, bytes: &[u8]) -> Result<TransactionEvent, StoreError> {
        let before = self.snapshot_map();
        self.doc
            .import(bytes)
            .map_err(|e| StoreError::Crdt(e.to_string()))?;
        let after = self.snapshot_map();

        let mut changes: Vec<ShapeChange> = Vec::new();
        for (id, old) in &before {
            match after.get(id) {
                Some(new) if new == old => {}
                Some(new) => record_change(
                    &mut changes,
                    id.clone(),
                    Some(old.clone()),
                    Some(new.clone()),
                ),
                None => record_change(&mut changes, id.clone(), Some(old.clone()), None),
            }
        }
        for (id, new) in &after {
            if !before.contains_key(id) {
                record_change(&mut changes, id.clone(), None, Some(new.clone()));
            }
        }
        changes.sort_by(|a, b| a.id.cmp(&b.id));

        let event = TransactionEvent {
            origin: Origin::Remote,
            at_ms: now_millis(),
            changes,
        };
        log::debug!(
            "merged {} byte(s), {} record(s) changed",
            bytes.len(),
            event.changes.len()
        );
        self.notify(&event);
        Ok(event)
    }

    /// Full state as snapshot bytes.
    pub fn snapshot_bytes(&self) -> Result<Vec<u8>, StoreError> {
        self.doc
            .export(ExportMode::Snapshot)
            .map_err(|e| StoreError::Crdt(e.to_string()))
    }

    /// Operations since the last call (or construction), advancing the
    /// checkpoint. Includes merged remote operations when merges landed since
    /// the checkpoint; importing those again elsewhere is a no-op.
    pub fn updates_since_checkpoint(&mut self) -> Result<Vec<u8>, StoreError> {
        let bytes = self
            .doc
            .export(ExportMode::updates(&self.checkpoint))
            .map_err(|e| StoreError::Crdt(e.to_string()))?;
        self.checkpoint = self.doc.oplog_vv();
        Ok(bytes)
    }

    /// Register a change observer. Fired after every transaction and merge.
    pub fn subscribe(&mut self, observer: impl Fn(&TransactionEvent) + Send + 'static) -> ObserverId {
        let id = self.next_observer;
        self.next_observer += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Remove an observer. Returns false if the id was not registered.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let len = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != len
    }

    fn notify(&self, event: &TransactionEvent) {
        for (_, observer) in &self.observers {
            observer(event);
        }
    }
}

fn record_change(
    changes: &mut Vec<ShapeChange>,
    id: ShapeId,
    before: Option<Shape>,
    after: Option<Shape>,
) {
    if let Some(existing) = changes.iter_mut().find(|c| c.id == id) {
        existing.after = after;
    } else {
        changes.push(ShapeChange { id, before, after });
    }
}

fn decode_shape(value: &LoroValue) -> Result<Shape, StoreError> {
    match value {
        LoroValue::String(raw) => {
            let raw = raw.to_string();
            Ok(serde_json::from_str(&raw)?)
        }
        other => Err(StoreError::Crdt(format!(
            "expected string register, found {other:?}"
        ))),
    }
}
