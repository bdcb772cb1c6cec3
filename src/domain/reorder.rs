//! Reorder engine for drag-and-drop moves.
//!
//! Every function here is pure: it takes the current sibling sequences,
//! returns the recomputed ones and holds nothing across calls. Indices
//! address the rendering sequence, i.e. siblings after [`arrange`].

use crate::domain::ids::{BoardId, CardId, ListId};
use crate::domain::ordering::{arrange, renumber, Sibling};
use crate::error::{BoardwiseError, Result};
use serde::{Deserialize, Serialize};

/// Result of a same-parent move
#[derive(Debug, Clone, PartialEq)]
pub struct Reordered<T> {
    pub items: Vec<T>,
    /// `false` when the move was a no-op and `items` is the untouched input
    pub changed: bool,
}

/// Result of a cross-parent move; both sequences are renumbered from zero
#[derive(Debug, Clone, PartialEq)]
pub struct Moved<T> {
    pub source: Vec<T>,
    pub destination: Vec<T>,
}

fn check_source(index: usize, len: usize) -> Result<()> {
    if index >= len {
        return Err(BoardwiseError::IndexOutOfRange { index, len });
    }
    Ok(())
}

fn check_destination(index: usize, len_after_removal: usize) -> Result<()> {
    if index > len_after_removal {
        return Err(BoardwiseError::IndexOutOfRange {
            index,
            len: len_after_removal,
        });
    }
    Ok(())
}

/// Moves the sibling at `source_index` to `dest_index` under the same parent
///
/// The resulting sequence is renumbered `0..n`. When both indices are equal
/// the input comes back as-is with `changed == false`, and the caller can
/// skip persistence.
///
/// # Errors
/// [`BoardwiseError::IndexOutOfRange`] when `source_index >= len` or
/// `dest_index > len - 1`. Indices are never clamped.
///
/// # Examples
/// ```
/// use boardwise_core::domain::reorder::reorder_within;
/// use boardwise_core::domain::{Card, ListId};
///
/// let list_id = ListId::new();
/// let cards: Vec<Card> = ["Alpha", "Bravo", "Charlie"]
///     .iter()
///     .enumerate()
///     .map(|(i, t)| Card::new(list_id, t, i as i64).unwrap())
///     .collect();
///
/// let result = reorder_within(&cards, 0, 2).unwrap();
/// assert_eq!(result.items[2].title, "Alpha");
/// assert_eq!(result.items[2].order, 2);
/// ```
pub fn reorder_within<T: Sibling>(
    siblings: &[T],
    source_index: usize,
    dest_index: usize,
) -> Result<Reordered<T>> {
    check_source(source_index, siblings.len())?;
    check_destination(dest_index, siblings.len() - 1)?;

    if source_index == dest_index {
        return Ok(Reordered {
            items: siblings.to_vec(),
            changed: false,
        });
    }

    let mut items = siblings.to_vec();
    arrange(&mut items);
    let moved = items.remove(source_index);
    items.insert(dest_index, moved);
    renumber(&mut items);

    Ok(Reordered {
        items,
        changed: true,
    })
}

/// Moves the sibling at `source_index` of `source` into `destination` at
/// `dest_index`, reparenting it to `dest_parent`
///
/// Both resulting sequences are renumbered independently from zero.
///
/// # Errors
/// [`BoardwiseError::IndexOutOfRange`] for bad indices, and
/// [`BoardwiseError::Validation`] if `dest_parent` is the source parent
/// (use [`reorder_within`] for that).
pub fn move_across<T: Sibling>(
    source: &[T],
    source_index: usize,
    destination: &[T],
    dest_index: usize,
    dest_parent: T::ParentId,
) -> Result<Moved<T>> {
    check_source(source_index, source.len())?;
    check_destination(dest_index, destination.len())?;

    let mut source = source.to_vec();
    arrange(&mut source);
    if source[source_index].parent_id() == dest_parent {
        return Err(BoardwiseError::Validation(format!(
            "item {} already belongs to {}",
            source[source_index].id(),
            dest_parent
        )));
    }

    let mut destination = destination.to_vec();
    arrange(&mut destination);

    let mut moved = source.remove(source_index);
    moved.set_parent_id(dest_parent);
    destination.insert(dest_index, moved);

    renumber(&mut source);
    renumber(&mut destination);

    Ok(Moved {
        source,
        destination,
    })
}

/// One row of an order batch. `parent_id` is set when the row's parent
/// reference must be written together with its order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate<I, P> {
    pub id: I,
    pub order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<P>,
}

pub type ListOrderUpdate = OrderUpdate<ListId, BoardId>;
pub type CardOrderUpdate = OrderUpdate<CardId, ListId>;

/// Builds the update rows for a renumbered sequence
pub fn order_updates<T: Sibling>(
    items: &[T],
    with_parent: bool,
) -> Vec<OrderUpdate<T::Id, T::ParentId>> {
    items
        .iter()
        .map(|item| OrderUpdate {
            id: item.id(),
            order: item.order(),
            parent_id: with_parent.then(|| item.parent_id()),
        })
        .collect()
}

/// Set of order rows that must be applied atomically
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OrderBatch {
    Lists {
        board_id: BoardId,
        updates: Vec<ListOrderUpdate>,
    },
    Cards {
        board_id: BoardId,
        updates: Vec<CardOrderUpdate>,
    },
}

impl OrderBatch {
    pub fn board_id(&self) -> BoardId {
        match self {
            Self::Lists { board_id, .. } | Self::Cards { board_id, .. } => *board_id,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Lists { updates, .. } => updates.len(),
            Self::Cards { updates, .. } => updates.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
