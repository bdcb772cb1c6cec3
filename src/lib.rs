//! # Boardwise Core
//!
//! Domain models and the ordering engine for Boardwise kanban boards.
//!
//! Lists within a board and cards within a list carry an integer `order`.
//! This crate assigns orders to new items, recomputes them after
//! drag-and-drop moves, persists each reorder atomically and keeps an
//! optimistic in-memory copy of loaded boards that rolls back when a
//! commit fails. Every creation, edit and deletion is written to an
//! activity log. UI layers talk to [`BoardService`]; storage backends
//! implement [`Storage`].

pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod service;
pub mod storage;

// Re-export commonly used types
pub use cache::{BoardCache, BoardEvent, BoardSnapshot, FailedReorder, ParentKey, ReorderAction};
pub use config::CoreConfig;
pub use domain::{
    AuditAction, AuditEntry, AuditQuery, Board, BoardId, BoardUpdate, Card, CardId, CardPatch,
    EntityType, List, ListId, ListWithCards, OrderBatch,
};
pub use error::{BoardwiseError, Result};
pub use service::{BoardService, CardMove, ReorderReceipt};
pub use storage::{Deadline, FileStorage, Storage};

#[cfg(feature = "sqlite-storage")]
pub use storage::SqliteStorage;
