//! Origin-scoped undo/redo over the shape store.
//!
//! The manager observes transaction events and records inverse patches, but
//! only for transactions whose origin is in the tracked set; presence never
//! produces transactions, and remote merges, automation writes and internal
//! reconciliation carry untracked origins, so none of them pollute the
//! stacks. Tracked transactions landing within [`CAPTURE_WINDOW_MS`] of a
//! group's first transaction collapse into one undoable entry, which folds a
//! whole drag sequence into a single step.

use crate::store::{Origin, ShapeChange, ShapeStore, StoreError, TransactionEvent};
use std::collections::HashSet;

/// Tracked transactions within this many milliseconds of a group's first
/// transaction join that group.
pub const CAPTURE_WINDOW_MS: u64 = 500;

#[derive(Debug, Clone)]
struct HistoryEntry {
    /// Coalesced per shape: earliest before, latest after.
    changes: Vec<ShapeChange>,
    first_at_ms: u64,
}

/// Undo/redo stacks for one connection.
pub struct HistoryManager {
    tracked: HashSet<Origin>,
    undo_stack: Vec<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    /// Whether the top undo entry is still open for grouping.
    capturing: bool,
}

impl HistoryManager {
    /// Track the given origins. Everything else is invisible to undo.
    pub fn new(tracked: impl IntoIterator<Item = Origin>) -> Self {
        Self {
            tracked: tracked.into_iter().collect(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            capturing: false,
        }
    }

    /// Feed one transaction event. Embedders call this for every event the
    /// store reports; untracked origins and empty transactions are ignored.
    pub fn observe(&mut self, event: &TransactionEvent) {
        if event.changes.is_empty() || !self.tracked.contains(&event.origin) {
            return;
        }
        self.redo_stack.clear();

        if self.capturing {
            if let Some(open) = self.undo_stack.last_mut() {
                if event.at_ms.saturating_sub(open.first_at_ms) <= CAPTURE_WINDOW_MS {
                    for change in &event.changes {
                        merge_change(&mut open.changes, change);
                    }
                    return;
                }
            }
        }

        self.undo_stack.push(HistoryEntry {
            changes: event.changes.clone(),
            first_at_ms: event.at_ms,
        });
        self.capturing = true;
    }

    /// Close the open capture group; the next tracked transaction starts a
    /// fresh entry regardless of timing. Useful at gesture end.
    pub fn close_group(&mut self) {
        self.capturing = false;
    }

    /// Reverse the newest entry through the store. The inverse is applied
    /// under [`Origin::History`], which is never tracked here, so undo does
    /// not record itself. Returns false when there is nothing to undo.
    pub fn undo(&mut self, store: &mut ShapeStore) -> Result<bool, StoreError> {
        self.capturing = false;
        let Some(entry) = self.undo_stack.pop() else {
            return Ok(false);
        };
        let result = store.transact(Origin::History, |txn| {
            for change in entry.changes.iter().rev() {
                match &change.before {
                    Some(shape) => txn.set(shape.clone()),
                    None => txn.delete(change.id.clone()),
                }
            }
        });
        match result {
            Ok(_) => {
                log::debug!("undo applied ({} shape(s))", entry.changes.len());
                self.redo_stack.push(entry);
                Ok(true)
            }
            Err(e) => {
                self.undo_stack.push(entry);
                Err(e)
            }
        }
    }

    /// Re-apply the newest undone entry. Returns false when there is nothing
    /// to redo.
    pub fn redo(&mut self, store: &mut ShapeStore) -> Result<bool, StoreError> {
        self.capturing = false;
        let Some(entry) = self.redo_stack.pop() else {
            return Ok(false);
        };
        let result = store.transact(Origin::History, |txn| {
            for change in &entry.changes {
                match &change.after {
                    Some(shape) => txn.set(shape.clone()),
                    None => txn.delete(change.id.clone()),
                }
            }
        });
        match result {
            Ok(_) => {
                log::debug!("redo applied ({} shape(s))", entry.changes.len());
                self.undo_stack.push(entry);
                Ok(true)
            }
            Err(e) => {
                self.redo_stack.push(entry);
                Err(e)
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Drop both stacks (session reset).
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.capturing = false;
    }
}

fn merge_change(changes: &mut Vec<ShapeChange>, incoming: &ShapeChange) {
    if let Some(existing) = changes.iter_mut().find(|c| c.id == incoming.id) {
        existing.after = incoming.after.clone();
    } else {
        changes.push(incoming.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::{Shape, ShapeKind};

    fn rect(x: f64) -> Shape {
        Shape::new(
            ShapeKind::Rectangle {
                width: 150.0,
                height: 100.0,
            },
            x,
            0.0,
            0,
            "alice",
        )
    }

    fn event(origin: Origin, at_ms: u64, changes: Vec<ShapeChange>) -> TransactionEvent {
        TransactionEvent {
            origin,
            at_ms,
            changes,
        }
    }

    fn set_change(shape: &Shape, before: Option<Shape>) -> ShapeChange {
        ShapeChange {
            id: shape.id.clone(),
            before,
            after: Some(shape.clone()),
        }
    }

    #[test]
    fn test_burst_within_window_collapses_to_one_entry() {
        let mut history = HistoryManager::new([Origin::User]);
        let base = rect(0.0);
        let mut prev = base.clone();
        for i in 0..10u64 {
            let mut moved = prev.clone();
            moved.x = (i + 1) as f64 * 10.0;
            history.observe(&event(
                Origin::User,
                i * 50,
                vec![set_change(&moved, Some(prev.clone()))],
            ));
            prev = moved;
        }
        assert_eq!(history.undo_depth(), 1);
    }

    #[test]
    fn test_spaced_transactions_stay_separate() {
        let mut history = HistoryManager::new([Origin::User]);
        let base = rect(0.0);
        let mut prev = base.clone();
        for i in 0..10u64 {
            let mut moved = prev.clone();
            moved.x = (i + 1) as f64 * 10.0;
            history.observe(&event(
                Origin::User,
                i * 600,
                vec![set_change(&moved, Some(prev.clone()))],
            ));
            prev = moved;
        }
        assert_eq!(history.undo_depth(), 10);
    }

    #[test]
    fn test_untracked_origins_are_invisible() {
        let mut history = HistoryManager::new([Origin::User]);
        let shape = rect(1.0);
        for origin in [
            Origin::Automation,
            Origin::Remote,
            Origin::Local,
            Origin::History,
        ] {
            history.observe(&event(origin, 0, vec![set_change(&shape, None)]));
        }
        assert_eq!(history.undo_depth(), 0);
        assert!(!history.can_undo());
    }

    #[test]
    fn test_undo_reverses_create_through_store() {
        let mut store = ShapeStore::new();
        let mut history = HistoryManager::new([Origin::User]);
        let shape = rect(5.0);
        let id = shape.id.clone();

        let ev = store
            .transact(Origin::User, |txn| txn.set(shape))
            .expect("transact");
        history.observe(&ev);

        assert!(history.undo(&mut store).expect("undo"));
        assert!(store.get(&id).is_none());
        assert!(store.is_empty());
        assert!(history.can_redo());

        assert!(history.redo(&mut store).expect("redo"));
        assert!(store.get(&id).is_some());
        assert_eq!(history.undo_depth(), 1);
    }

    #[test]
    fn test_undo_reverses_delete() {
        let mut store = ShapeStore::new();
        let mut history = HistoryManager::new([Origin::User]);
        let shape = rect(5.0);
        let id = shape.id.clone();
        store.set(shape).expect("seed");

        let ev = store
            .transact(Origin::User, |txn| txn.delete(id.clone()))
            .expect("transact");
        history.observe(&ev);
        assert!(store.is_empty());

        assert!(history.undo(&mut store).expect("undo"));
        let restored = store.get(&id).expect("restored");
        assert!((restored.x - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_grouped_undo_restores_earliest_state() {
        let mut store = ShapeStore::new();
        let mut history = HistoryManager::new([Origin::User]);
        let shape = rect(0.0);
        let id = shape.id.clone();
        store.set(shape).expect("seed");

        // drag burst: 0 -> 30 -> 60, all within the capture window
        for target in [30.0, 60.0] {
            let mut moved = store.get(&id).expect("present");
            moved.x = target;
            let ev = store
                .transact(Origin::User, |txn| txn.set(moved))
                .expect("transact");
            history.observe(&ev);
        }
        assert_eq!(history.undo_depth(), 1);

        assert!(history.undo(&mut store).expect("undo"));
        let back = store.get(&id).expect("present");
        assert!((back.x - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_new_tracked_edit_clears_redo() {
        let mut store = ShapeStore::new();
        let mut history = HistoryManager::new([Origin::User]);

        let first = rect(1.0);
        let ev = store
            .transact(Origin::User, |txn| txn.set(first))
            .expect("transact");
        history.observe(&ev);
        assert!(history.undo(&mut store).expect("undo"));
        assert!(history.can_redo());

        let second = rect(2.0);
        let ev = store
            .transact(Origin::User, |txn| txn.set(second))
            .expect("transact");
        history.observe(&ev);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_history_origin_not_self_recorded() {
        let mut history = HistoryManager::new([Origin::User]);
        let shape = rect(9.0);
        history.observe(&event(
            Origin::History,
            0,
            vec![set_change(&shape, None)],
        ));
        assert_eq!(history.undo_depth(), 0);
    }

    #[test]
    fn test_empty_stacks_return_false() {
        let mut store = ShapeStore::new();
        let mut history = HistoryManager::new([Origin::User]);
        assert!(!history.undo(&mut store).expect("undo"));
        assert!(!history.redo(&mut store).expect("redo"));
    }

    #[test]
    fn test_close_group_splits_a_burst() {
        let mut history = HistoryManager::new([Origin::User]);
        let shape = rect(0.0);
        history.observe(&event(Origin::User, 0, vec![set_change(&shape, None)]));
        history.close_group();
        let mut moved = shape.clone();
        moved.x = 10.0;
        history.observe(&event(
            Origin::User,
            100,
            vec![set_change(&moved, Some(shape))],
        ));
        assert_eq!(history.undo_depth(), 2);
    }
}
