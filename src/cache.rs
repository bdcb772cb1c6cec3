//! Optimistic in-memory board state.
//!
//! Each loaded board keeps two snapshots: `committed` mirrors what storage
//! has acknowledged, `working` is what the UI renders and may run ahead of
//! it while a reorder is in flight. Reorders are computed by the pure
//! reducer [`BoardSnapshot::apply`]; commit and rollback copy only the
//! parents a reorder touched from one snapshot to the other.

use crate::domain::{
    move_across,
    ordering::arrange,
    reorder::order_updates,
    reorder_within, Board, BoardId, Card, CardId, List, ListId, ListWithCards, OrderBatch,
};
use crate::error::{BoardwiseError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Order space owned by one parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParentKey {
    /// The order of lists within a board
    Board(BoardId),
    /// The order of cards within a list
    List(ListId),
}

/// A drag-and-drop outcome, in rendering-sequence indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReorderAction {
    MoveList {
        source_index: usize,
        dest_index: usize,
    },
    MoveCard {
        source_list: ListId,
        source_index: usize,
        dest_list: ListId,
        dest_index: usize,
    },
}

impl ReorderAction {
    /// Parents whose order space the action writes, sorted and deduplicated
    pub fn parents(&self, board_id: BoardId) -> Vec<ParentKey> {
        match *self {
            Self::MoveList { .. } => vec![ParentKey::Board(board_id)],
            Self::MoveCard {
                source_list,
                dest_list,
                ..
            } => normalize_parents(&[ParentKey::List(source_list), ParentKey::List(dest_list)]),
        }
    }
}

/// A board with its lists and cards, in rendering sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pub board: Board,
    pub lists: Vec<ListWithCards>,
}

/// Result of applying a [`ReorderAction`] to a snapshot
#[derive(Debug, Clone)]
pub struct StagedReorder {
    pub action: ReorderAction,
    pub parents: Vec<ParentKey>,
    pub batch: OrderBatch,
    /// Working state the action was computed from
    pub base: BoardSnapshot,
    /// Working state after the action
    pub outcome: BoardSnapshot,
}

/// A reorder whose commit failed, kept so it can be retried as-is
#[derive(Debug, Clone)]
pub struct FailedReorder {
    pub staged: StagedReorder,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

impl FailedReorder {
    /// Parents the failed reorder would write
    pub fn parents(&self) -> &[ParentKey] {
        &self.staged.parents
    }

    fn overlaps(&self, parents: &[ParentKey]) -> bool {
        self.staged.parents.iter().any(|parent| parents.contains(parent))
    }
}

/// Sorts and deduplicates parent keys
pub fn normalize_parents(parents: &[ParentKey]) -> Vec<ParentKey> {
    let mut keys = parents.to_vec();
    keys.sort();
    keys.dedup();
    keys
}

impl BoardSnapshot {
    pub fn new(board: Board, mut lists: Vec<ListWithCards>) -> Self {
        arrange(&mut lists);
        for entry in &mut lists {
            arrange(&mut entry.cards);
        }
        Self { board, lists }
    }

    pub fn board_id(&self) -> BoardId {
        self.board.id
    }

    pub fn list(&self, list_id: &ListId) -> Option<&ListWithCards> {
        self.lists.iter().find(|entry| entry.list.id == *list_id)
    }

    fn list_mut(&mut self, list_id: &ListId) -> Option<&mut ListWithCards> {
        self.lists.iter_mut().find(|entry| entry.list.id == *list_id)
    }

    fn list_index(&self, list_id: &ListId) -> Result<usize> {
        self.lists
            .iter()
            .position(|entry| entry.list.id == *list_id)
            .ok_or_else(|| BoardwiseError::ListNotFound(list_id.to_string()))
    }

    /// Finds the list holding a card and the card's position in it
    pub fn locate_card(&self, card_id: &CardId) -> Option<(ListId, usize)> {
        self.lists.iter().find_map(|entry| {
            entry
                .cards
                .iter()
                .position(|card| card.id == *card_id)
                .map(|index| (entry.list.id, index))
        })
    }

    pub fn card(&self, card_id: &CardId) -> Option<&Card> {
        self.lists
            .iter()
            .flat_map(|entry| entry.cards.iter())
            .find(|card| card.id == *card_id)
    }

    /// Computes the snapshot after `action` and the batch that persists it
    ///
    /// Returns `None` for a no-op (same position, same parent).
    pub fn apply(&self, action: &ReorderAction) -> Result<Option<(BoardSnapshot, OrderBatch)>> {
        let board_id = self.board.id;
        match *action {
            ReorderAction::MoveList {
                source_index,
                dest_index,
            } => {
                let reordered = reorder_within(&self.lists, source_index, dest_index)?;
                if !reordered.changed {
                    return Ok(None);
                }
                let batch = OrderBatch::Lists {
                    board_id,
                    updates: order_updates(&reordered.items, false),
                };
                let next = BoardSnapshot {
                    board: self.board.clone(),
                    lists: reordered.items,
                };
                Ok(Some((next, batch)))
            }
            ReorderAction::MoveCard {
                source_list,
                source_index,
                dest_list,
                dest_index,
            } => {
                let source_pos = self.list_index(&source_list)?;
                let dest_pos = self.list_index(&dest_list)?;
                let mut next = self.clone();

                let updates = if source_pos == dest_pos {
                    let reordered =
                        reorder_within(&self.lists[source_pos].cards, source_index, dest_index)?;
                    if !reordered.changed {
                        return Ok(None);
                    }
                    let updates = order_updates(&reordered.items, true);
                    next.lists[source_pos].cards = reordered.items;
                    updates
                } else {
                    let moved = move_across(
                        &self.lists[source_pos].cards,
                        source_index,
                        &self.lists[dest_pos].cards,
                        dest_index,
                        dest_list,
                    )?;
                    let mut updates = order_updates(&moved.source, true);
                    updates.extend(order_updates(&moved.destination, true));
                    next.lists[source_pos].cards = moved.source;
                    next.lists[dest_pos].cards = moved.destination;
                    updates
                };

                Ok(Some((next, OrderBatch::Cards { board_id, updates })))
            }
        }
    }

    /// Copies the state of `parents` from `other` into `self`
    fn adopt(&mut self, other: &BoardSnapshot, parents: &[ParentKey]) {
        for parent in parents {
            match parent {
                ParentKey::Board(_) => {
                    for entry in &mut self.lists {
                        if let Some(theirs) = other.list(&entry.list.id) {
                            entry.list.order = theirs.list.order;
                        }
                    }
                    arrange(&mut self.lists);
                }
                ParentKey::List(list_id) => {
                    let cards = other.list(list_id).map(|entry| entry.cards.clone());
                    if let (Some(cards), Some(entry)) = (cards, self.list_mut(list_id)) {
                        entry.cards = cards;
                    }
                }
            }
        }
    }

    /// Whether `self` and `other` agree on the state of `parents`
    fn same_parents(&self, other: &BoardSnapshot, parents: &[ParentKey]) -> bool {
        parents.iter().all(|parent| match parent {
            ParentKey::Board(_) => {
                let ours = self.lists.iter().map(|e| (e.list.id, e.list.order));
                let theirs = other.lists.iter().map(|e| (e.list.id, e.list.order));
                ours.eq(theirs)
            }
            ParentKey::List(list_id) => {
                self.list(list_id).map(|e| &e.cards) == other.list(list_id).map(|e| &e.cards)
            }
        })
    }

    pub(crate) fn insert_list(&mut self, entry: ListWithCards) {
        self.lists.push(entry);
        arrange(&mut self.lists);
    }

    pub(crate) fn remove_list(&mut self, list_id: &ListId) {
        self.lists.retain(|entry| entry.list.id != *list_id);
    }

    /// Copies content fields of `list`; its order is kept
    pub(crate) fn patch_list_content(&mut self, list: &List) -> Result<()> {
        let entry = self
            .list_mut(&list.id)
            .ok_or_else(|| BoardwiseError::ListNotFound(list.id.to_string()))?;
        entry.list.title = list.title.clone();
        entry.list.color = list.color.clone();
        entry.list.updated_at = list.updated_at;
        Ok(())
    }

    pub(crate) fn insert_card(&mut self, card: Card) -> Result<()> {
        let entry = self
            .list_mut(&card.list_id)
            .ok_or_else(|| BoardwiseError::ListNotFound(card.list_id.to_string()))?;
        entry.cards.push(card);
        arrange(&mut entry.cards);
        Ok(())
    }

    /// Copies content fields of `card`; position and parent are kept
    pub(crate) fn patch_card_content(&mut self, card: &Card) {
        let target = self
            .lists
            .iter_mut()
            .flat_map(|entry| entry.cards.iter_mut())
            .find(|existing| existing.id == card.id);
        if let Some(existing) = target {
            existing.title = card.title.clone();
            existing.description = card.description.clone();
            existing.color = card.color.clone();
            existing.updated_at = card.updated_at;
        }
    }

    pub(crate) fn remove_card(&mut self, card_id: &CardId) {
        for entry in &mut self.lists {
            entry.cards.retain(|card| card.id != *card_id);
        }
    }
}

/// Change notifications for renderers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEvent {
    Loaded {
        board_id: BoardId,
    },
    /// Working state changed ahead of storage
    Optimistic {
        board_id: BoardId,
        action: ReorderAction,
    },
    Committed {
        board_id: BoardId,
        rows: usize,
    },
    /// Working state was restored to the last committed state
    RolledBack {
        board_id: BoardId,
        reason: String,
    },
    /// Content, creation or deletion changes
    Changed {
        board_id: BoardId,
    },
    Evicted {
        board_id: BoardId,
    },
}

#[derive(Debug)]
struct BoardState {
    committed: BoardSnapshot,
    working: BoardSnapshot,
    /// At most one entry per parent; a newer failure replaces overlapping ones
    failed: Vec<FailedReorder>,
}

/// Explicitly owned cache of loaded boards, keyed by board id
#[derive(Debug)]
pub struct BoardCache {
    boards: HashMap<BoardId, BoardState>,
    events: broadcast::Sender<BoardEvent>,
}

impl BoardCache {
    pub fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            boards: HashMap::new(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: BoardEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn state(&self, board_id: &BoardId) -> Result<&BoardState> {
        self.boards
            .get(board_id)
            .ok_or_else(|| BoardwiseError::BoardNotFound(board_id.to_string()))
    }

    fn state_mut(&mut self, board_id: &BoardId) -> Result<&mut BoardState> {
        self.boards
            .get_mut(board_id)
            .ok_or_else(|| BoardwiseError::BoardNotFound(board_id.to_string()))
    }

    pub fn contains(&self, board_id: &BoardId) -> bool {
        self.boards.contains_key(board_id)
    }

    /// Replaces whatever is cached for the board with a fresh snapshot
    pub fn load(&mut self, snapshot: BoardSnapshot) {
        let board_id = snapshot.board_id();
        self.boards.insert(
            board_id,
            BoardState {
                committed: snapshot.clone(),
                working: snapshot,
                failed: Vec::new(),
            },
        );
        self.notify(BoardEvent::Loaded { board_id });
    }

    pub fn evict(&mut self, board_id: &BoardId) {
        if self.boards.remove(board_id).is_some() {
            self.notify(BoardEvent::Evicted {
                board_id: *board_id,
            });
        }
    }

    /// State to render, including in-flight reorders
    pub fn working(&self, board_id: &BoardId) -> Result<&BoardSnapshot> {
        Ok(&self.state(board_id)?.working)
    }

    /// Last state acknowledged by storage
    pub fn committed(&self, board_id: &BoardId) -> Result<&BoardSnapshot> {
        Ok(&self.state(board_id)?.committed)
    }

    /// Reorders whose commit failed and that have not been retried yet
    pub fn failed(&self, board_id: &BoardId) -> Result<&[FailedReorder]> {
        Ok(&self.state(board_id)?.failed)
    }

    /// Applies `action` to the working state ahead of storage
    ///
    /// Returns `None` when the action is a no-op; nothing changes then.
    pub fn stage(
        &mut self,
        board_id: &BoardId,
        action: ReorderAction,
    ) -> Result<Option<StagedReorder>> {
        let state = self.state_mut(board_id)?;
        let Some((outcome, batch)) = state.working.apply(&action)? else {
            return Ok(None);
        };

        let staged = StagedReorder {
            action,
            parents: action.parents(*board_id),
            batch,
            base: state.working.clone(),
            outcome: outcome.clone(),
        };
        state.working.adopt(&outcome, &staged.parents);
        self.notify(BoardEvent::Optimistic {
            board_id: *board_id,
            action,
        });
        Ok(Some(staged))
    }

    /// Marks a staged reorder as acknowledged by storage
    pub fn commit(&mut self, board_id: &BoardId, staged: &StagedReorder) -> Result<()> {
        let state = self.state_mut(board_id)?;
        state.committed.adopt(&staged.outcome, &staged.parents);
        state.failed.retain(|failed| !failed.overlaps(&staged.parents));
        self.notify(BoardEvent::Committed {
            board_id: *board_id,
            rows: staged.batch.len(),
        });
        Ok(())
    }

    /// Restores the staged parents to their committed state and keeps the
    /// reorder for [`BoardCache::restage`]
    pub fn revert(
        &mut self,
        board_id: &BoardId,
        staged: StagedReorder,
        error: &BoardwiseError,
    ) -> Result<()> {
        let state = self.state_mut(board_id)?;
        let committed = state.committed.clone();
        state.working.adopt(&committed, &staged.parents);
        state.failed.retain(|failed| !failed.overlaps(&staged.parents));
        state.failed.push(FailedReorder {
            staged,
            error: error.to_string(),
            failed_at: Utc::now(),
        });
        self.notify(BoardEvent::RolledBack {
            board_id: *board_id,
            reason: error.to_string(),
        });
        Ok(())
    }

    /// Re-applies the failed reorder on `parents` to the working state
    ///
    /// Fails if the affected parents changed since the reorder was computed;
    /// the stale reorder is discarded then.
    pub fn restage(&mut self, board_id: &BoardId, parents: &[ParentKey]) -> Result<StagedReorder> {
        let keys = normalize_parents(parents);
        let state = self.state_mut(board_id)?;
        let position = state
            .failed
            .iter()
            .position(|failed| failed.staged.parents == keys)
            .ok_or_else(|| {
                BoardwiseError::Other(format!(
                    "no failed reorder on {:?} of board {}",
                    keys, board_id
                ))
            })?;
        let staged = state.failed.remove(position).staged;

        if !state.working.same_parents(&staged.base, &staged.parents) {
            return Err(BoardwiseError::Validation(
                "board changed since the failed reorder; repeat the move".to_string(),
            ));
        }

        state.working.adopt(&staged.outcome, &staged.parents);
        self.notify(BoardEvent::Optimistic {
            board_id: *board_id,
            action: staged.action,
        });
        Ok(staged)
    }

    /// Applies a non-reorder change to both snapshots
    pub fn apply_change<F>(&mut self, board_id: &BoardId, mut change: F) -> Result<()>
    where
        F: FnMut(&mut BoardSnapshot) -> Result<()>,
    {
        let state = self.state_mut(board_id)?;
        change(&mut state.committed)?;
        change(&mut state.working)?;
        self.notify(BoardEvent::Changed {
            board_id: *board_id,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> BoardSnapshot {
        let board = Board::new("org_1", "Roadmap").unwrap();
        let lists = ["Todo", "Doing", "Done"]
            .iter()
            .enumerate()
            .map(|(i, title)| {
                let list = List::new(board.id, title, i as i64).unwrap();
                let cards = (0..3)
                    .map(|n| Card::new(list.id, &format!("{} card {}", title, n), n).unwrap())
                    .collect();
                ListWithCards::with_cards(list, cards)
            })
            .collect();
        BoardSnapshot::new(board, lists)
    }

    fn list_titles(snapshot: &BoardSnapshot) -> Vec<&str> {
        snapshot.lists.iter().map(|e| e.list.title.as_str()).collect()
    }

    fn card_titles(entry: &ListWithCards) -> Vec<&str> {
        entry.cards.iter().map(|c| c.title.as_str()).collect()
    }

    #[test]
    fn test_parents_are_sorted_and_deduplicated() {
        let list_id = ListId::new();
        let action = ReorderAction::MoveCard {
            source_list: list_id,
            source_index: 0,
            dest_list: list_id,
            dest_index: 1,
        };
        assert_eq!(action.parents(BoardId::new()), vec![ParentKey::List(list_id)]);
    }

    #[test]
    fn test_reducer_move_list() {
        let snap = snapshot();

        let (next, batch) = snap
            .apply(&ReorderAction::MoveList {
                source_index: 0,
                dest_index: 2,
            })
            .unwrap()
            .unwrap();

        assert_eq!(list_titles(&next), vec!["Doing", "Done", "Todo"]);
        assert!(matches!(batch, OrderBatch::Lists { ref updates, .. } if updates.len() == 3));
        // Input is untouched
        assert_eq!(list_titles(&snap), vec!["Todo", "Doing", "Done"]);
    }

    #[test]
    fn test_reducer_noop() {
        let snap = snapshot();
        let result = snap
            .apply(&ReorderAction::MoveList {
                source_index: 1,
                dest_index: 1,
            })
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_reducer_move_card_across_lists() {
        let snap = snapshot();
        let todo = snap.lists[0].list.id;
        let done = snap.lists[2].list.id;

        let (next, batch) = snap
            .apply(&ReorderAction::MoveCard {
                source_list: todo,
                source_index: 1,
                dest_list: done,
                dest_index: 0,
            })
            .unwrap()
            .unwrap();

        assert_eq!(card_titles(&next.lists[0]), vec!["Todo card 0", "Todo card 2"]);
        assert_eq!(next.lists[2].cards[0].title, "Todo card 1");
        assert_eq!(next.lists[2].cards[0].list_id, done);
        // Both lists are written: 2 remaining + 4 in destination
        assert_eq!(batch.len(), 6);
    }

    #[test]
    fn test_reducer_unknown_list() {
        let snap = snapshot();
        let result = snap.apply(&ReorderAction::MoveCard {
            source_list: ListId::new(),
            source_index: 0,
            dest_list: snap.lists[0].list.id,
            dest_index: 0,
        });
        assert!(matches!(result, Err(BoardwiseError::ListNotFound(_))));
    }

    #[test]
    fn test_stage_commit_cycle() {
        let mut cache = BoardCache::new(8);
        let snap = snapshot();
        let board_id = snap.board_id();
        cache.load(snap);

        let staged = cache
            .stage(
                &board_id,
                ReorderAction::MoveList {
                    source_index: 2,
                    dest_index: 0,
                },
            )
            .unwrap()
            .unwrap();

        let working = cache.working(&board_id).unwrap();
        assert_eq!(list_titles(working), vec!["Done", "Todo", "Doing"]);
        let committed = cache.committed(&board_id).unwrap();
        assert_eq!(list_titles(committed), vec!["Todo", "Doing", "Done"]);

        cache.commit(&board_id, &staged).unwrap();

        assert_eq!(cache.committed(&board_id).unwrap(), cache.working(&board_id).unwrap());
    }

    #[test]
    fn test_revert_then_restage() {
        let mut cache = BoardCache::new(8);
        let snap = snapshot();
        let board_id = snap.board_id();
        let original = snap.clone();
        cache.load(snap);

        let action = ReorderAction::MoveList {
            source_index: 0,
            dest_index: 1,
        };
        let staged = cache.stage(&board_id, action).unwrap().unwrap();
        let outcome = staged.outcome.clone();
        cache
            .revert(&board_id, staged, &BoardwiseError::Persistence("offline".to_string()))
            .unwrap();

        assert_eq!(cache.working(&board_id).unwrap(), &original);
        assert_eq!(cache.failed(&board_id).unwrap().len(), 1);

        let restaged = cache.restage(&board_id, &action.parents(board_id)).unwrap();
        assert_eq!(restaged.action, action);
        assert_eq!(cache.working(&board_id).unwrap(), &outcome);
        assert!(cache.failed(&board_id).unwrap().is_empty());
    }

    #[test]
    fn test_restage_rejects_changed_board() {
        let mut cache = BoardCache::new(8);
        let snap = snapshot();
        let board_id = snap.board_id();
        let todo = snap.lists[0].list.id;
        cache.load(snap);

        let staged = cache
            .stage(
                &board_id,
                ReorderAction::MoveCard {
                    source_list: todo,
                    source_index: 0,
                    dest_list: todo,
                    dest_index: 2,
                },
            )
            .unwrap()
            .unwrap();
        cache
            .revert(&board_id, staged, &BoardwiseError::Persistence("offline".to_string()))
            .unwrap();

        let newcomer = Card::new(todo, "Newcomer", 9).unwrap();
        cache
            .apply_change(&board_id, |s| s.insert_card(newcomer.clone()))
            .unwrap();

        let result = cache.restage(&board_id, &[ParentKey::List(todo)]);
        assert!(matches!(result, Err(BoardwiseError::Validation(_))));
        assert!(cache.failed(&board_id).unwrap().is_empty());
    }

    #[test]
    fn test_failures_on_different_parents_are_all_kept() {
        let mut cache = BoardCache::new(8);
        let snap = snapshot();
        let board_id = snap.board_id();
        let todo = snap.lists[0].list.id;
        let doing = snap.lists[1].list.id;
        cache.load(snap);
        let offline = BoardwiseError::Persistence("offline".to_string());

        let first = ReorderAction::MoveCard {
            source_list: todo,
            source_index: 0,
            dest_list: todo,
            dest_index: 2,
        };
        let staged = cache.stage(&board_id, first).unwrap().unwrap();
        cache.revert(&board_id, staged, &offline).unwrap();

        let second = ReorderAction::MoveCard {
            source_list: doing,
            source_index: 2,
            dest_list: doing,
            dest_index: 0,
        };
        let staged = cache.stage(&board_id, second).unwrap().unwrap();
        cache.revert(&board_id, staged, &offline).unwrap();

        assert_eq!(cache.failed(&board_id).unwrap().len(), 2);

        let restaged = cache.restage(&board_id, &[ParentKey::List(todo)]).unwrap();
        assert_eq!(restaged.action, first);
        let restaged = cache.restage(&board_id, &[ParentKey::List(doing)]).unwrap();
        assert_eq!(restaged.action, second);

        let working = cache.working(&board_id).unwrap();
        assert_eq!(card_titles(&working.lists[0])[2], "Todo card 0");
        assert_eq!(card_titles(&working.lists[1])[0], "Doing card 2");
    }

    #[test]
    fn test_newer_failure_replaces_overlapping_one() {
        let mut cache = BoardCache::new(8);
        let snap = snapshot();
        let board_id = snap.board_id();
        let todo = snap.lists[0].list.id;
        let done = snap.lists[2].list.id;
        cache.load(snap);
        let offline = BoardwiseError::Persistence("offline".to_string());

        let within = ReorderAction::MoveCard {
            source_list: todo,
            source_index: 0,
            dest_list: todo,
            dest_index: 1,
        };
        let staged = cache.stage(&board_id, within).unwrap().unwrap();
        cache.revert(&board_id, staged, &offline).unwrap();

        let across = ReorderAction::MoveCard {
            source_list: todo,
            source_index: 0,
            dest_list: done,
            dest_index: 0,
        };
        let staged = cache.stage(&board_id, across).unwrap().unwrap();
        cache.revert(&board_id, staged, &offline).unwrap();

        let failed = cache.failed(&board_id).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].staged.action, across);
        assert!(cache.restage(&board_id, &[ParentKey::List(todo)]).is_err());
    }

    #[test]
    fn test_revert_only_touches_affected_parents() {
        let mut cache = BoardCache::new(8);
        let snap = snapshot();
        let board_id = snap.board_id();
        let todo = snap.lists[0].list.id;
        let doing = snap.lists[1].list.id;
        cache.load(snap);

        let card_move = cache
            .stage(
                &board_id,
                ReorderAction::MoveCard {
                    source_list: todo,
                    source_index: 0,
                    dest_list: todo,
                    dest_index: 2,
                },
            )
            .unwrap()
            .unwrap();
        let other_move = cache
            .stage(
                &board_id,
                ReorderAction::MoveCard {
                    source_list: doing,
                    source_index: 2,
                    dest_list: doing,
                    dest_index: 0,
                },
            )
            .unwrap()
            .unwrap();

        cache.commit(&board_id, &other_move).unwrap();
        cache
            .revert(&board_id, card_move, &BoardwiseError::Persistence("offline".to_string()))
            .unwrap();

        let working = cache.working(&board_id).unwrap();
        assert_eq!(working.lists[0].cards[0].title, "Todo card 0");
        assert_eq!(working.lists[1].cards[0].title, "Doing card 2");
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let mut cache = BoardCache::new(8);
        let mut events = cache.subscribe();
        let snap = snapshot();
        let board_id = snap.board_id();
        cache.load(snap);

        let action = ReorderAction::MoveList {
            source_index: 0,
            dest_index: 2,
        };
        let staged = cache.stage(&board_id, action).unwrap().unwrap();
        cache.commit(&board_id, &staged).unwrap();

        assert_eq!(events.recv().await.unwrap(), BoardEvent::Loaded { board_id });
        assert_eq!(
            events.recv().await.unwrap(),
            BoardEvent::Optimistic { board_id, action }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            BoardEvent::Committed { board_id, rows: 3 }
        );
    }

    #[test]
    fn test_patch_card_content_keeps_position() {
        let mut snap = snapshot();
        let mut card = snap.lists[1].cards[2].clone();
        card.title = "Renamed card".to_string();
        card.order = 99;

        snap.patch_card_content(&card);

        let stored = snap.card(&card.id).unwrap();
        assert_eq!(stored.title, "Renamed card");
        assert_eq!(stored.order, 2);
        assert_eq!(snap.locate_card(&card.id), Some((snap.lists[1].list.id, 2)));
    }

    #[test]
    fn test_unknown_board() {
        let cache = BoardCache::new(8);
        assert!(matches!(
            cache.working(&BoardId::new()),
            Err(BoardwiseError::BoardNotFound(_))
        ));
    }
}
