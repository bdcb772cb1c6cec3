pub mod audit;
pub mod board;
pub mod card;
pub mod ids;
pub mod list;
pub mod ordering;
pub mod reorder;

pub use audit::{AuditAction, AuditEntry, AuditQuery, EntityType};
pub use board::{Board, BoardUpdate};
pub use card::{Card, CardPatch};
pub use ids::{BoardId, CardId, ListId};
pub use list::{List, ListWithCards};
pub use ordering::{next_order, Sibling, FIRST_ORDER};
pub use reorder::{move_across, reorder_within, Moved, OrderBatch, OrderUpdate, Reordered};
