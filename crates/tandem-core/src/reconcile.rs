//! Gesture authority: which connection may manipulate a shape right now.
//!
//! A gesture (drag, resize, rotate) claims the shape by writing the local
//! connection id into its `dragged_by` field through a user-action
//! transaction, then streams live previews over the presence channel; the
//! store is only touched again at commit. There is no distributed lock: two
//! connections can claim concurrently, the store converges to one winner, and
//! the loser finds out on its next observation and backs off. A marker whose
//! holder has gone silent is stale and may simply be overwritten.

use crate::now_millis;
use crate::presence::{DragPreview, PresenceChannel};
use crate::shapes::{normalize_rotation, Shape, ShapeId};
use crate::store::{Origin, ShapeStore, StoreError, TransactionEvent};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("shape {0} not found")]
    NotFound(ShapeId),
    #[error("shape {id} is being manipulated by {by}")]
    Locked { id: ShapeId, by: String },
    #[error("claim on shape {0} was lost to another connection")]
    ClaimLost(ShapeId),
    #[error("no active gesture on shape {0}")]
    NoGesture(ShapeId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Net effect of a gesture, applied to the shape record at commit.
///
/// Scale factors are pending multipliers; commit bakes them into the intrinsic
/// size fields and the stored record never carries a non-unit scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformDelta {
    pub dx: f64,
    pub dy: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    /// Rotation delta in degrees.
    pub rotation: f64,
}

impl Default for TransformDelta {
    fn default() -> Self {
        Self {
            dx: 0.0,
            dy: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
        }
    }
}

impl TransformDelta {
    pub fn translation(dx: f64, dy: f64) -> Self {
        Self {
            dx,
            dy,
            ..Self::default()
        }
    }
}

/// Per-connection gesture state.
pub struct Reconciler {
    connection_id: String,
    active: HashSet<ShapeId>,
}

impl Reconciler {
    pub fn new(connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            active: HashSet::new(),
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Who holds a live claim on the shape, if it is not us. A marker whose
    /// holder has no fresh presence record does not count; it is overwritable.
    pub fn locked_by_at(
        &self,
        store: &ShapeStore,
        presence: &PresenceChannel,
        shape_id: &str,
        now_ms: u64,
    ) -> Option<String> {
        let shape = store.get(shape_id)?;
        let holder = shape.dragged_by?;
        if holder == self.connection_id {
            return None;
        }
        presence
            .is_connection_live_at(&holder, now_ms)
            .then_some(holder)
    }

    /// Start a gesture: claim the shape and publish the first preview.
    pub fn begin_gesture(
        &mut self,
        store: &mut ShapeStore,
        presence: &mut PresenceChannel,
        shape_id: &str,
    ) -> Result<(), ReconcileError> {
        let now = now_millis();
        let mut shape = store
            .get(shape_id)
            .ok_or_else(|| ReconcileError::NotFound(shape_id.to_string()))?;
        if let Some(by) = self.locked_by_at(store, presence, shape_id, now) {
            return Err(ReconcileError::Locked {
                id: shape_id.to_string(),
                by,
            });
        }

        let preview = DragPreview::new(shape.x, shape.y);
        shape.dragged_by = Some(self.connection_id.clone());
        shape.touch(now);
        store.transact(Origin::User, |txn| txn.set(shape))?;
        presence.set_drag_preview(shape_id, preview);
        self.active.insert(shape_id.to_string());
        Ok(())
    }

    /// Stream a preview for an active gesture. Presence only; the store is not
    /// written until commit.
    pub fn update_gesture(
        &mut self,
        presence: &mut PresenceChannel,
        shape_id: &str,
        preview: DragPreview,
    ) -> Result<(), ReconcileError> {
        if !self.active.contains(shape_id) {
            return Err(ReconcileError::NoGesture(shape_id.to_string()));
        }
        presence.set_drag_preview(shape_id, preview);
        Ok(())
    }

    /// Finish a gesture: bake the delta into the record, release the claim
    /// and drop the preview. Fails with `ClaimLost` when another connection
    /// won the shape while we were dragging.
    pub fn commit_gesture(
        &mut self,
        store: &mut ShapeStore,
        presence: &mut PresenceChannel,
        shape_id: &str,
        delta: TransformDelta,
    ) -> Result<Shape, ReconcileError> {
        if !self.active.remove(shape_id) {
            return Err(ReconcileError::NoGesture(shape_id.to_string()));
        }
        presence.clear_drag_preview(shape_id);

        let Some(mut shape) = store.get(shape_id) else {
            return Err(ReconcileError::NotFound(shape_id.to_string()));
        };
        if shape.dragged_by.as_deref() != Some(self.connection_id.as_str()) {
            log::debug!(
                "claim on {shape_id} lost to {:?} before commit",
                shape.dragged_by
            );
            return Err(ReconcileError::ClaimLost(shape_id.to_string()));
        }

        shape.x += delta.dx;
        shape.y += delta.dy;
        shape.bake_scale(delta.scale_x, delta.scale_y);
        shape.rotation = normalize_rotation(shape.rotation + delta.rotation);
        shape.dragged_by = None;
        shape.touch(now_millis());

        let committed = shape.clone();
        store.transact(Origin::User, |txn| txn.set(shape))?;
        Ok(committed)
    }

    /// Abandon a gesture without applying its delta. Releases our claim if we
    /// still hold it; the release is an internal write, invisible to undo.
    pub fn abort_gesture(
        &mut self,
        store: &mut ShapeStore,
        presence: &mut PresenceChannel,
        shape_id: &str,
    ) -> Result<(), ReconcileError> {
        self.active.remove(shape_id);
        presence.clear_drag_preview(shape_id);
        if let Some(mut shape) = store.get(shape_id) {
            if shape.dragged_by.as_deref() == Some(self.connection_id.as_str()) {
                shape.dragged_by = None;
                store.transact(Origin::Local, |txn| txn.set(shape))?;
            }
        }
        Ok(())
    }

    /// Reconcile local gesture state against an observed store event. When a
    /// replicated change shows a shape we are dragging owned by someone else
    /// (or deleted), the gesture is dropped and its preview cleared. Returns
    /// the shape ids whose claims were lost.
    pub fn observe(
        &mut self,
        presence: &mut PresenceChannel,
        event: &TransactionEvent,
    ) -> Vec<ShapeId> {
        if event.origin != Origin::Remote || self.active.is_empty() {
            return Vec::new();
        }
        let mut lost = Vec::new();
        for change in &event.changes {
            if !self.active.contains(&change.id) {
                continue;
            }
            let still_ours = change
                .after
                .as_ref()
                .and_then(|shape| shape.dragged_by.as_deref())
                == Some(self.connection_id.as_str());
            if !still_ours {
                self.active.remove(&change.id);
                presence.clear_drag_preview(&change.id);
                lost.push(change.id.clone());
            }
        }
        lost
    }

    /// Clear a stale claim left by a dead connection. Returns true if a
    /// marker was released.
    pub fn release_stale(
        &mut self,
        store: &mut ShapeStore,
        presence: &PresenceChannel,
        shape_id: &str,
    ) -> Result<bool, ReconcileError> {
        let now = now_millis();
        let Some(mut shape) = store.get(shape_id) else {
            return Ok(false);
        };
        let Some(holder) = shape.dragged_by.clone() else {
            return Ok(false);
        };
        if holder == self.connection_id || presence.is_connection_live_at(&holder, now) {
            return Ok(false);
        }
        shape.dragged_by = None;
        store.transact(Origin::Local, |txn| txn.set(shape))?;
        log::debug!("released stale claim by {holder} on {shape_id}");
        Ok(true)
    }

    /// True while this connection has an open gesture on the shape.
    pub fn is_active(&self, shape_id: &str) -> bool {
        self.active.contains(shape_id)
    }
}
