//! Ephemeral per-connection presence: cursors and live drag previews.
//!
//! Presence is physically separate from the shape store. Records are
//! last-write-wins per connection, broadcast but never merged into the
//! replicated document, never persisted and never visible to undo. A record
//! or drag preview that stops being refreshed goes stale after
//! [`PRESENCE_STALE_MS`] and must be ignored by readers even if a disconnect
//! notification never arrived.

use crate::now_millis;
use crate::shapes::ShapeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Presence data older than this is treated as abandoned.
pub const PRESENCE_STALE_MS: u64 = 5_000;

/// Display colors handed to connections that do not bring their own.
pub const PEER_COLORS: [&str; 8] = [
    "#ef4444", "#f97316", "#eab308", "#22c55e", "#14b8a6", "#3b82f6", "#8b5cf6", "#ec4899",
];

/// Pick a palette color for the nth connection.
pub fn color_for_index(index: usize) -> &'static str {
    PEER_COLORS[index % PEER_COLORS.len()]
}

/// Who a connection is, as shown to other participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

/// In-progress drag/transform state for one shape, published while a gesture
/// is live. Position is absolute; scale and rotation are pending deltas that
/// are only baked into the shape record at commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragPreview {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    /// Milliseconds since the Unix epoch; stamped on publish.
    #[serde(default)]
    pub updated_at: u64,
}

impl DragPreview {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            scale_x: None,
            scale_y: None,
            rotation: None,
            updated_at: 0,
        }
    }

    pub fn is_fresh_at(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.updated_at) <= PRESENCE_STALE_MS
    }
}

/// One connection's full presence state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub user: UserDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorPosition>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub drag_previews: HashMap<ShapeId, DragPreview>,
    /// Milliseconds since the Unix epoch of the last write to this record.
    pub updated_at: u64,
}

impl PresenceRecord {
    pub fn new(user: UserDescriptor) -> Self {
        Self {
            user,
            cursor: None,
            drag_previews: HashMap::new(),
            updated_at: now_millis(),
        }
    }

    pub fn is_fresh_at(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.updated_at) <= PRESENCE_STALE_MS
    }
}

/// Fired on every local or remote record change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    Updated { connection_id: String },
    Left { connection_id: String },
}

pub type ListenerId = u64;

type ListenerFn = Box<dyn Fn(&PresenceEvent) + Send>;

/// The presence channel for one connection: its own record plus the observed
/// records of every other connection.
pub struct PresenceChannel {
    connection_id: String,
    local: PresenceRecord,
    remote: HashMap<String, PresenceRecord>,
    dirty: bool,
    listeners: Vec<(ListenerId, ListenerFn)>,
    next_listener: ListenerId,
}

impl PresenceChannel {
    pub fn new(connection_id: impl Into<String>, user: UserDescriptor) -> Self {
        Self {
            connection_id: connection_id.into(),
            local: PresenceRecord::new(user),
            remote: HashMap::new(),
            dirty: false,
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn local(&self) -> &PresenceRecord {
        &self.local
    }

    pub fn set_user(&mut self, user: UserDescriptor) {
        self.local.user = user;
        self.touch_local();
    }

    pub fn set_cursor(&mut self, x: f64, y: f64) {
        self.local.cursor = Some(CursorPosition { x, y });
        self.touch_local();
    }

    pub fn clear_cursor(&mut self) {
        self.local.cursor = None;
        self.touch_local();
    }

    /// Publish a live preview for one shape. The preview timestamp is stamped
    /// here so staleness is measured from the last publish.
    pub fn set_drag_preview(&mut self, shape_id: impl Into<ShapeId>, mut preview: DragPreview) {
        let now = now_millis();
        preview.updated_at = now;
        self.local.drag_previews.insert(shape_id.into(), preview);
        self.touch_local();
    }

    pub fn clear_drag_preview(&mut self, shape_id: &str) {
        if self.local.drag_previews.remove(shape_id).is_some() {
            self.touch_local();
        }
    }

    fn touch_local(&mut self) {
        self.local.updated_at = now_millis();
        self.dirty = true;
        let event = PresenceEvent::Updated {
            connection_id: self.connection_id.clone(),
        };
        self.notify(&event);
    }

    /// True when a local change is waiting to be broadcast.
    pub fn has_outgoing(&self) -> bool {
        self.dirty
    }

    /// Take the latest local record for broadcast, if anything changed since
    /// the last take. Intermediate states are deliberately collapsed; only the
    /// newest record matters to receivers.
    pub fn take_outgoing(&mut self) -> Option<PresenceRecord> {
        if self.dirty {
            self.dirty = false;
            Some(self.local.clone())
        } else {
            None
        }
    }

    /// Apply a record received from another connection. A record echoing our
    /// own connection id is ignored.
    pub fn apply_remote(&mut self, connection_id: &str, record: PresenceRecord) {
        if connection_id == self.connection_id {
            return;
        }
        self.remote.insert(connection_id.to_string(), record);
        let event = PresenceEvent::Updated {
            connection_id: connection_id.to_string(),
        };
        self.notify(&event);
    }

    /// Drop a connection's record (disconnect).
    pub fn remove_connection(&mut self, connection_id: &str) {
        if self.remote.remove(connection_id).is_some() {
            let event = PresenceEvent::Left {
                connection_id: connection_id.to_string(),
            };
            self.notify(&event);
        }
    }

    /// Every known record keyed by connection id, local included.
    pub fn get_all(&self) -> HashMap<String, PresenceRecord> {
        let mut all = self.remote.clone();
        all.insert(self.connection_id.clone(), self.local.clone());
        all
    }

    /// A connection is live while its record keeps being refreshed. The local
    /// connection is always live.
    pub fn is_connection_live_at(&self, connection_id: &str, now_ms: u64) -> bool {
        if connection_id == self.connection_id {
            return true;
        }
        self.remote
            .get(connection_id)
            .map(|record| record.is_fresh_at(now_ms))
            .unwrap_or(false)
    }

    /// Read one connection's preview for one shape, discarding stale entries.
    pub fn drag_preview_at(
        &self,
        connection_id: &str,
        shape_id: &str,
        now_ms: u64,
    ) -> Option<&DragPreview> {
        let record = if connection_id == self.connection_id {
            &self.local
        } else {
            self.remote.get(connection_id)?
        };
        record
            .drag_previews
            .get(shape_id)
            .filter(|preview| preview.is_fresh_at(now_ms))
    }

    /// All fresh previews across every connection. Stale entries are skipped
    /// even when the owning record is still around.
    pub fn active_drag_previews_at(&self, now_ms: u64) -> Vec<(&str, &ShapeId, &DragPreview)> {
        let local = std::iter::once((self.connection_id.as_str(), &self.local));
        let remote = self.remote.iter().map(|(id, record)| (id.as_str(), record));
        local
            .chain(remote)
            .flat_map(|(conn, record)| {
                record
                    .drag_previews
                    .iter()
                    .map(move |(shape_id, preview)| (conn, shape_id, preview))
            })
            .filter(|(_, _, preview)| preview.is_fresh_at(now_ms))
            .collect()
    }

    /// Drop remote records that have gone silent past the staleness window.
    /// Returns the connection ids removed.
    pub fn prune_stale_at(&mut self, now_ms: u64) -> Vec<String> {
        let stale: Vec<String> = self
            .remote
            .iter()
            .filter(|(_, record)| !record.is_fresh_at(now_ms))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            self.remove_connection(id);
        }
        stale
    }

    pub fn prune_stale(&mut self) -> Vec<String> {
        self.prune_stale_at(now_millis())
    }

    /// Register a change listener.
    pub fn on_change(&mut self, listener: impl Fn(&PresenceEvent) + Send + 'static) -> ListenerId {
        let id = self.next_listener;
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let len = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != len
    }

    fn notify(&self, event: &PresenceEvent) {
        for (_, listener) in &self.listeners {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryManager;
    use crate::shapes::{Shape, ShapeKind};
    use crate::store::{Origin, ShapeStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn user(id: &str) -> UserDescriptor {
        UserDescriptor {
            id: id.to_string(),
            name: id.to_string(),
            color: String::new(),
        }
    }

    #[test]
    fn test_local_writes_queue_one_broadcast() {
        let mut presence = PresenceChannel::new("c1", user("alice"));
        assert!(!presence.has_outgoing());

        presence.set_cursor(10.0, 20.0);
        presence.set_cursor(11.0, 21.0);
        assert!(presence.has_outgoing());

        let record = presence.take_outgoing().expect("pending broadcast");
        let cursor = record.cursor.expect("cursor");
        assert!((cursor.x - 11.0).abs() < f64::EPSILON);
        assert!(presence.take_outgoing().is_none());
    }

    #[test]
    fn test_apply_remote_ignores_own_connection() {
        let mut presence = PresenceChannel::new("c1", user("alice"));
        let mut echo = PresenceRecord::new(user("mallory"));
        echo.cursor = Some(CursorPosition { x: 1.0, y: 1.0 });

        presence.apply_remote("c1", echo.clone());
        assert_eq!(presence.get_all().len(), 1);
        assert_eq!(presence.local().user.id, "alice");

        presence.apply_remote("c2", echo);
        assert_eq!(presence.get_all().len(), 2);
    }

    #[test]
    fn test_stale_previews_are_ignored_by_readers() {
        let mut presence = PresenceChannel::new("c1", user("alice"));
        let mut remote = PresenceRecord::new(user("bob"));
        let mut preview = DragPreview::new(5.0, 5.0);
        preview.updated_at = 1_000;
        remote.drag_previews.insert("shape-a".to_string(), preview);
        remote.updated_at = 1_000;
        presence.apply_remote("c2", remote);

        // within the window
        assert!(presence.drag_preview_at("c2", "shape-a", 4_000).is_some());
        assert_eq!(presence.active_drag_previews_at(4_000).len(), 1);

        // past the window the entry still exists but readers must skip it
        assert!(presence.drag_preview_at("c2", "shape-a", 7_000).is_none());
        assert!(presence.active_drag_previews_at(7_000).is_empty());
        assert_eq!(presence.get_all().len(), 2);
    }

    #[test]
    fn test_prune_stale_drops_silent_connections() {
        let mut presence = PresenceChannel::new("c1", user("alice"));
        let left = Arc::new(AtomicUsize::new(0));
        let left_seen = Arc::clone(&left);
        presence.on_change(move |event| {
            if matches!(event, PresenceEvent::Left { .. }) {
                left_seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        let mut silent = PresenceRecord::new(user("bob"));
        silent.updated_at = 1_000;
        presence.apply_remote("c2", silent);
        let mut live = PresenceRecord::new(user("carol"));
        live.updated_at = 9_500;
        presence.apply_remote("c3", live);

        let removed = presence.prune_stale_at(10_000);
        assert_eq!(removed, vec!["c2".to_string()]);
        assert!(!presence.is_connection_live_at("c2", 10_000));
        assert!(presence.is_connection_live_at("c3", 10_000));
        assert_eq!(left.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_presence_never_reaches_store_or_history() {
        let mut store = ShapeStore::new();
        let mut history = HistoryManager::new([Origin::User]);
        let shape = Shape::new(ShapeKind::Circle { radius: 10.0 }, 0.0, 0.0, 0, "alice");
        let event = store
            .transact(Origin::User, |txn| txn.set(shape))
            .expect("transact");
        history.observe(&event);
        let baseline = store.list();

        let mut presence = PresenceChannel::new("c1", user("alice"));
        presence.set_cursor(50.0, 60.0);
        presence.set_drag_preview("shape-x", DragPreview::new(1.0, 2.0));
        let mut remote = PresenceRecord::new(user("bob"));
        remote.cursor = Some(CursorPosition { x: 3.0, y: 4.0 });
        presence.apply_remote("c2", remote);
        presence.clear_drag_preview("shape-x");

        assert_eq!(store.list(), baseline);
        assert_eq!(history.undo_depth(), 1);
        assert_eq!(history.redo_depth(), 0);
    }
}
