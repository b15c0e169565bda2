//! Tandem Core Library
//!
//! Platform-agnostic engine for the tandem collaborative canvas: the replicated
//! shape store, the ephemeral presence channel, origin-scoped undo/redo, gesture
//! reconciliation and the automation command engine.

pub mod engine;
pub mod history;
pub mod presence;
pub mod protocol;
pub mod reconcile;
pub mod shapes;
pub mod store;

pub use engine::{Engine, EngineError, ToolCall, ToolOutcome};
pub use history::HistoryManager;
pub use presence::{DragPreview, PresenceChannel, PresenceRecord, UserDescriptor};
pub use reconcile::{Reconciler, TransformDelta};
pub use shapes::{Color, Shape, ShapeId, ShapeKind};
pub use store::{Origin, ShapeChange, ShapeStore, TransactionEvent};

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
