use chrono::{DateTime, Utc};
use std::fmt;

/// Order assigned to the first item created under an empty parent.
///
/// Reorders renumber from zero, so a freshly created item and a reordered
/// one do not share a numbering origin. Both conventions sort correctly.
pub const FIRST_ORDER: i64 = 1;

/// An item that shares a direct parent with other items of the same kind
/// and is rendered by ascending `order` (lists under a board, cards under a
/// list).
pub trait Sibling: Clone {
    type Id: Copy + Ord + fmt::Display;
    type ParentId: Copy + Eq + fmt::Display;

    fn id(&self) -> Self::Id;
    fn parent_id(&self) -> Self::ParentId;
    fn set_parent_id(&mut self, parent: Self::ParentId);
    fn order(&self) -> i64;
    fn set_order(&mut self, order: i64);
    fn created_at(&self) -> DateTime<Utc>;
}

/// Computes the order for a new item appended after its siblings
///
/// Returns one more than the largest existing order, or [`FIRST_ORDER`] when
/// there are no siblings. Input need not be sorted and may contain
/// duplicates.
///
/// # Examples
/// ```
/// use boardwise_core::domain::ordering::{next_order, FIRST_ORDER};
///
/// assert_eq!(next_order([3, 0, 7, 7]), 8);
/// assert_eq!(next_order(Vec::<i64>::new()), FIRST_ORDER);
/// ```
pub fn next_order<I>(existing: I) -> i64
where
    I: IntoIterator<Item = i64>,
{
    existing
        .into_iter()
        .max()
        .map(|max| max.saturating_add(1))
        .unwrap_or(FIRST_ORDER)
}

/// Sorts siblings into rendering sequence
///
/// Ascending `order`; equal orders (left behind by racing writers) fall
/// back to creation time and then identifier, so the result is
/// deterministic. The sort is stable.
pub fn arrange<T: Sibling>(items: &mut [T]) {
    items.sort_by(|a, b| {
        a.order()
            .cmp(&b.order())
            .then_with(|| a.created_at().cmp(&b.created_at()))
            .then_with(|| a.id().cmp(&b.id()))
    });
}

/// Assigns `order = position` to every item, starting at zero
pub fn renumber<T: Sibling>(items: &mut [T]) {
    for (index, item) in items.iter_mut().enumerate() {
        item.set_order(index as i64);
    }
}

/// Whether the orders are exactly `0..len` in sequence
pub fn is_contiguous<T: Sibling>(items: &[T]) -> bool {
    items
        .iter()
        .enumerate()
        .all(|(index, item)| item.order() == index as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Card, ListId};
    use chrono::Duration;

    fn card(list_id: ListId, title: &str, order: i64) -> Card {
        Card::new(list_id, title, order).unwrap()
    }

    #[test]
    fn test_next_order_empty() {
        assert_eq!(next_order(Vec::<i64>::new()), FIRST_ORDER);
        assert_eq!(next_order(std::iter::empty::<i64>()), 1);
    }

    #[test]
    fn test_next_order_unsorted_input() {
        assert_eq!(next_order(vec![5, 2, 9, 1]), 10);
    }

    #[test]
    fn test_next_order_exceeds_every_duplicate() {
        let existing = vec![4, 4, 4, 0];
        let next = next_order(existing.clone());
        assert!(existing.iter().all(|order| next > *order));
    }

    #[test]
    fn test_next_order_after_reorder_numbering() {
        // A renumbered list starts at zero; appending continues from its max
        assert_eq!(next_order(vec![0, 1, 2]), 3);
    }

    #[test]
    fn test_next_order_negative_values() {
        assert_eq!(next_order(vec![-3, -7]), -2);
    }

    #[test]
    fn test_arrange_by_order() {
        let list_id = ListId::new();
        let mut cards = vec![
            card(list_id, "Gamma", 9),
            card(list_id, "Alpha", 1),
            card(list_id, "Beta", 4),
        ];

        arrange(&mut cards);

        let titles: Vec<_> = cards.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha", "Beta", "Gamma"]);
    }

    #[test]
    fn test_arrange_tie_break_by_creation_then_id() {
        let list_id = ListId::new();
        let mut older = card(list_id, "Older", 2);
        let mut newer = card(list_id, "Newer", 2);
        older.created_at = newer.created_at - Duration::seconds(30);

        let mut cards = vec![newer.clone(), older.clone()];
        arrange(&mut cards);
        assert_eq!(cards[0].title, "Older");

        // Same timestamp: identifier decides
        newer.created_at = older.created_at;
        let mut cards = vec![newer.clone(), older.clone()];
        arrange(&mut cards);
        let mut swapped = vec![older, newer];
        arrange(&mut swapped);
        assert_eq!(cards[0].id, swapped[0].id);
        assert!(cards[0].id < cards[1].id);
    }

    #[test]
    fn test_renumber_contiguous() {
        let list_id = ListId::new();
        let mut cards = vec![
            card(list_id, "Alpha", 10),
            card(list_id, "Beta", 10),
            card(list_id, "Gamma", 300),
        ];
        assert!(!is_contiguous(&cards));

        renumber(&mut cards);

        let orders: Vec<_> = cards.iter().map(|c| c.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert!(is_contiguous(&cards));
    }
}
