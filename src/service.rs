//! Board operations for UI layers.
//!
//! Creation, edits and deletions go to storage first and are then mirrored
//! into the cache. Reorders are applied to the cache optimistically,
//! committed with one [`Storage::apply_order_batch`] call and rolled back if
//! that call fails or misses its deadline. Every creation, edit and deletion
//! is also written to the activity log.

use crate::cache::{
    BoardCache, BoardEvent, BoardSnapshot, FailedReorder, ParentKey, ReorderAction, StagedReorder,
};
use crate::config::CoreConfig;
use crate::domain::{
    board::validate_text, next_order, AuditAction, AuditEntry, AuditQuery, Board, BoardId,
    BoardUpdate, Card, CardId, CardPatch, List, ListId, ListWithCards,
};
use crate::error::{BoardwiseError, Result};
use crate::storage::{Deadline, Storage};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::sync::{
    broadcast, Mutex as AsyncMutex, OwnedMutexGuard, OwnedRwLockReadGuard,
    OwnedRwLockWriteGuard, RwLock,
};
use uuid::Uuid;

/// A card drag-and-drop outcome as reported by the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardMove {
    pub source_list: ListId,
    pub source_index: usize,
    pub dest_list: ListId,
    pub dest_index: usize,
}

impl From<CardMove> for ReorderAction {
    fn from(value: CardMove) -> Self {
        ReorderAction::MoveCard {
            source_list: value.source_list,
            source_index: value.source_index,
            dest_list: value.dest_list,
            dest_index: value.dest_index,
        }
    }
}

/// What a reorder did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderReceipt {
    /// Nothing moved; storage was not contacted
    Unchanged,
    Committed { rows: usize },
}

/// Guards held by an operation on a loaded board
struct BoardAccess {
    _parents: Vec<OwnedMutexGuard<()>>,
    _gate: OwnedRwLockReadGuard<()>,
}

/// Per-board gates and per-parent async locks
///
/// Every operation on a loaded board holds its board's gate shared, so a
/// reload or deletion, which holds it exclusively, never lands in the middle
/// of one. Within the gate, tokio's mutex hands out parent locks in FIFO
/// order, so reorders on one parent are committed in the order they were
/// issued.
#[derive(Default)]
struct ParentLocks {
    gates: Mutex<HashMap<BoardId, Arc<RwLock<()>>>>,
    locks: Mutex<HashMap<ParentKey, Arc<AsyncMutex<()>>>>,
}

impl ParentLocks {
    fn gate(&self, board_id: BoardId) -> Arc<RwLock<()>> {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(gates.entry(board_id).or_default())
    }

    async fn exclusive(&self, board_id: BoardId) -> OwnedRwLockWriteGuard<()> {
        self.gate(board_id).write_owned().await
    }

    /// Takes the board's gate shared, then locks every key in sorted order so
    /// two callers cannot deadlock
    async fn shared(&self, board_id: BoardId, keys: &[ParentKey]) -> BoardAccess {
        let gate = self.gate(board_id).read_owned().await;
        BoardAccess {
            _parents: self.acquire(keys).await,
            _gate: gate,
        }
    }

    async fn acquire(&self, keys: &[ParentKey]) -> Vec<OwnedMutexGuard<()>> {
        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();

        let handles: Vec<_> = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            keys.iter()
                .map(|key| Arc::clone(locks.entry(*key).or_default()))
                .collect()
        };

        let mut guards = Vec::with_capacity(handles.len());
        for handle in handles {
            guards.push(handle.lock_owned().await);
        }
        guards
    }
}

/// Board operations over a storage backend and an optimistic cache
pub struct BoardService<S: Storage> {
    storage: Arc<S>,
    cache: Mutex<BoardCache>,
    locks: ParentLocks,
    config: CoreConfig,
}

impl<S: Storage> BoardService<S> {
    pub fn new(storage: Arc<S>, config: CoreConfig) -> Self {
        Self {
            cache: Mutex::new(BoardCache::new(config.event_capacity)),
            storage,
            locks: ParentLocks::default(),
            config,
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Receives change notifications for every loaded board
    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.cache().subscribe()
    }

    fn cache(&self) -> MutexGuard<'_, BoardCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads the board unless it is cached; call before taking the shared gate
    async fn ensure_loaded(&self, board_id: BoardId) -> Result<()> {
        if self.cache().contains(&board_id) {
            return Ok(());
        }
        let _gate = self.locks.exclusive(board_id).await;
        // Another caller may have loaded it while we waited
        let loaded = self.cache().contains(&board_id);
        if !loaded {
            self.load(board_id).await?;
        }
        Ok(())
    }

    async fn load(&self, board_id: BoardId) -> Result<BoardSnapshot> {
        let board = self.storage.load_board(&board_id).await?;
        let lists = self.storage.load_lists(&board_id).await?;
        let snapshot = BoardSnapshot::new(board, lists);
        self.cache().load(snapshot.clone());
        tracing::debug!(board_id = %board_id, lists = snapshot.lists.len(), "board loaded");
        Ok(snapshot)
    }

    fn org_id(&self, board_id: BoardId) -> Result<String> {
        Ok(self.cache().committed(&board_id)?.board.org_id.clone())
    }

    /// Writes an activity entry; a failure is logged and does not undo the
    /// operation it describes
    async fn record(&self, entry: AuditEntry) {
        if let Err(error) = self.storage.record_audit(&entry).await {
            tracing::warn!(
                entity_id = %entry.entity_id,
                action = %entry.action,
                error = %error,
                "could not record activity"
            );
        }
    }

    // Boards

    pub async fn create_board(&self, org_id: &str, title: &str) -> Result<Board> {
        let board = Board::new(org_id, title)?;
        self.storage.save_board(&board).await?;
        self.record(AuditEntry::board(&board, AuditAction::Create)).await;
        tracing::info!(board_id = %board.id, org_id = %board.org_id, "board created");
        Ok(board)
    }

    pub async fn boards(&self, org_id: &str) -> Result<Vec<Board>> {
        self.storage.list_boards(org_id).await
    }

    /// Edits a board's title, background or favourite flag
    pub async fn update_board(&self, board_id: BoardId, update: BoardUpdate) -> Result<Board> {
        let _access = self.locks.shared(board_id, &[]).await;
        let mut board = self.storage.load_board(&board_id).await?;
        board.apply(&update)?;
        self.storage.save_board(&board).await?;

        {
            let mut cache = self.cache();
            if cache.contains(&board_id) {
                cache.apply_change(&board_id, |snapshot| {
                    snapshot.board = board.clone();
                    Ok(())
                })?;
            }
        }
        self.record(AuditEntry::board(&board, AuditAction::Update)).await;
        Ok(board)
    }

    pub async fn rename_board(&self, board_id: BoardId, title: &str) -> Result<Board> {
        self.update_board(board_id, BoardUpdate::title(title)).await
    }

    pub async fn delete_board(&self, board_id: BoardId) -> Result<()> {
        let _gate = self.locks.exclusive(board_id).await;
        let board = self.storage.load_board(&board_id).await?;
        self.storage.delete_board(&board_id).await?;
        self.cache().evict(&board_id);
        self.record(AuditEntry::board(&board, AuditAction::Delete)).await;
        tracing::info!(board_id = %board_id, "board deleted");
        Ok(())
    }

    /// Loads a board from storage into the cache, replacing cached state
    ///
    /// Waits for every operation in flight on the board to finish first.
    pub async fn open_board(&self, board_id: BoardId) -> Result<BoardSnapshot> {
        let _gate = self.locks.exclusive(board_id).await;
        self.load(board_id).await
    }

    /// State to render, including reorders still in flight
    pub fn snapshot(&self, board_id: BoardId) -> Result<BoardSnapshot> {
        self.cache().working(&board_id).cloned()
    }

    /// Last state acknowledged by storage
    pub fn committed_snapshot(&self, board_id: BoardId) -> Result<BoardSnapshot> {
        self.cache().committed(&board_id).cloned()
    }

    /// Reorders waiting for [`BoardService::retry_failed`], one per parent set
    pub fn failed_reorders(&self, board_id: BoardId) -> Result<Vec<FailedReorder>> {
        Ok(self.cache().failed(&board_id)?.to_vec())
    }

    // Lists

    /// Appends a new list after the board's existing lists
    pub async fn create_list(&self, board_id: BoardId, title: &str) -> Result<List> {
        self.ensure_loaded(board_id).await?;
        let _access = self
            .locks
            .shared(board_id, &[ParentKey::Board(board_id)])
            .await;

        let (org_id, order) = {
            let cache = self.cache();
            let committed = cache.committed(&board_id)?;
            let order = next_order(committed.lists.iter().map(|entry| entry.list.order));
            (committed.board.org_id.clone(), order)
        };
        let entry = ListWithCards::new(List::new(board_id, title, order)?);
        self.storage.insert_list(&entry).await?;
        self.cache().apply_change(&board_id, |snapshot| {
            snapshot.insert_list(entry.clone());
            Ok(())
        })?;
        self.record(AuditEntry::list(&org_id, &entry.list, AuditAction::Create)).await;

        tracing::info!(board_id = %board_id, list_id = %entry.list.id, order, "list created");
        Ok(entry.list)
    }

    /// Appends a copy of a list, cards included, titled "<title> - Copy"
    pub async fn copy_list(&self, board_id: BoardId, list_id: ListId) -> Result<ListWithCards> {
        self.ensure_loaded(board_id).await?;
        let _access = self
            .locks
            .shared(board_id, &[ParentKey::Board(board_id), ParentKey::List(list_id)])
            .await;

        let (org_id, source, order) = {
            let cache = self.cache();
            let committed = cache.committed(&board_id)?;
            let source = committed
                .list(&list_id)
                .cloned()
                .ok_or_else(|| BoardwiseError::ListNotFound(list_id.to_string()))?;
            let order = next_order(committed.lists.iter().map(|entry| entry.list.order));
            (committed.board.org_id.clone(), source, order)
        };

        let list = List::new(board_id, &format!("{} - Copy", source.list.title), order)?
            .with_color(source.list.color.clone());
        let cards = source
            .cards
            .iter()
            .map(|card| card.duplicate_into(list.id))
            .collect();
        let copy = ListWithCards::with_cards(list, cards);

        self.storage.insert_list(&copy).await?;
        self.cache().apply_change(&board_id, |snapshot| {
            snapshot.insert_list(copy.clone());
            Ok(())
        })?;
        self.record(AuditEntry::list(&org_id, &copy.list, AuditAction::Create)).await;

        tracing::info!(
            board_id = %board_id,
            source = %list_id,
            list_id = %copy.list.id,
            "list copied"
        );
        Ok(copy)
    }

    pub async fn rename_list(
        &self,
        board_id: BoardId,
        list_id: ListId,
        title: &str,
    ) -> Result<List> {
        let title = validate_text("Title", title)?;
        self.ensure_loaded(board_id).await?;
        let _access = self.locks.shared(board_id, &[]).await;

        let list = self.storage.rename_list(&board_id, &list_id, &title).await?;
        self.cache()
            .apply_change(&board_id, |snapshot| snapshot.patch_list_content(&list))?;
        let org_id = self.org_id(board_id)?;
        self.record(AuditEntry::list(&org_id, &list, AuditAction::Update)).await;
        Ok(list)
    }

    /// Deletes a list and its cards; remaining lists keep their orders
    pub async fn delete_list(&self, board_id: BoardId, list_id: ListId) -> Result<()> {
        self.ensure_loaded(board_id).await?;
        let _access = self
            .locks
            .shared(board_id, &[ParentKey::Board(board_id), ParentKey::List(list_id)])
            .await;

        let (org_id, list) = {
            let cache = self.cache();
            let committed = cache.committed(&board_id)?;
            let list = committed.list(&list_id).map(|entry| entry.list.clone());
            (committed.board.org_id.clone(), list)
        };

        self.storage.delete_list(&board_id, &list_id).await?;
        self.cache().apply_change(&board_id, |snapshot| {
            snapshot.remove_list(&list_id);
            Ok(())
        })?;
        if let Some(list) = list {
            self.record(AuditEntry::list(&org_id, &list, AuditAction::Delete)).await;
        }
        tracing::info!(board_id = %board_id, list_id = %list_id, "list deleted");
        Ok(())
    }

    // Cards

    /// Appends a new card after the list's existing cards
    pub async fn create_card(
        &self,
        board_id: BoardId,
        list_id: ListId,
        title: &str,
    ) -> Result<Card> {
        self.ensure_loaded(board_id).await?;
        let _access = self
            .locks
            .shared(board_id, &[ParentKey::List(list_id)])
            .await;

        let order = {
            let cache = self.cache();
            let list = cache
                .committed(&board_id)?
                .list(&list_id)
                .ok_or_else(|| BoardwiseError::ListNotFound(list_id.to_string()))?;
            next_order(list.card_orders())
        };
        let card = Card::new(list_id, title, order)?;
        self.storage.insert_card(&board_id, &card).await?;
        self.cache()
            .apply_change(&board_id, |snapshot| snapshot.insert_card(card.clone()))?;
        let org_id = self.org_id(board_id)?;
        self.record(AuditEntry::card(&org_id, &card, AuditAction::Create)).await;

        tracing::info!(
            board_id = %board_id,
            list_id = %list_id,
            card_id = %card.id,
            order,
            "card created"
        );
        Ok(card)
    }

    /// Edits a card's content; its position is never touched
    pub async fn update_card(
        &self,
        board_id: BoardId,
        card_id: CardId,
        patch: CardPatch,
    ) -> Result<Card> {
        self.ensure_loaded(board_id).await?;
        let _access = self.locks.shared(board_id, &[]).await;

        let card = self.storage.update_card(&board_id, &card_id, &patch).await?;
        self.cache().apply_change(&board_id, |snapshot| {
            snapshot.patch_card_content(&card);
            Ok(())
        })?;
        let org_id = self.org_id(board_id)?;
        self.record(AuditEntry::card(&org_id, &card, AuditAction::Update)).await;
        Ok(card)
    }

    /// Sets the colour of every card in a list and returns how many changed
    pub async fn set_list_card_color(
        &self,
        board_id: BoardId,
        list_id: ListId,
        color: &str,
    ) -> Result<usize> {
        self.ensure_loaded(board_id).await?;
        let _access = self
            .locks
            .shared(board_id, &[ParentKey::List(list_id)])
            .await;

        let (org_id, card_ids) = {
            let cache = self.cache();
            let committed = cache.committed(&board_id)?;
            let list = committed
                .list(&list_id)
                .ok_or_else(|| BoardwiseError::ListNotFound(list_id.to_string()))?;
            let card_ids: Vec<CardId> = list.cards.iter().map(|card| card.id).collect();
            (committed.board.org_id.clone(), card_ids)
        };

        let patch = CardPatch::color(color);
        for card_id in &card_ids {
            let card = self.storage.update_card(&board_id, card_id, &patch).await?;
            self.cache().apply_change(&board_id, |snapshot| {
                snapshot.patch_card_content(&card);
                Ok(())
            })?;
            self.record(AuditEntry::card(&org_id, &card, AuditAction::Update)).await;
        }
        Ok(card_ids.len())
    }

    /// Deletes a card; remaining cards keep their orders until the next
    /// reorder renumbers them
    pub async fn delete_card(&self, board_id: BoardId, card_id: CardId) -> Result<Card> {
        self.ensure_loaded(board_id).await?;
        let gate = self.locks.gate(board_id).read_owned().await;

        // The card may change lists while we wait for the lock
        let _access = loop {
            let list_id = self.card_list(board_id, card_id)?;
            let parents = self.locks.acquire(&[ParentKey::List(list_id)]).await;
            if self.card_list(board_id, card_id)? == list_id {
                break BoardAccess {
                    _parents: parents,
                    _gate: gate,
                };
            }
        };

        let card = self.storage.delete_card(&board_id, &card_id).await?;
        self.cache().apply_change(&board_id, |snapshot| {
            snapshot.remove_card(&card_id);
            Ok(())
        })?;
        let org_id = self.org_id(board_id)?;
        self.record(AuditEntry::card(&org_id, &card, AuditAction::Delete)).await;
        tracing::info!(board_id = %board_id, card_id = %card_id, "card deleted");
        Ok(card)
    }

    fn card_list(&self, board_id: BoardId, card_id: CardId) -> Result<ListId> {
        self.cache()
            .committed(&board_id)?
            .locate_card(&card_id)
            .map(|(list_id, _)| list_id)
            .ok_or_else(|| BoardwiseError::CardNotFound(card_id.to_string()))
    }

    // Activity

    /// An organization's activity feed, newest first
    pub async fn activity(&self, org_id: &str, limit: Option<usize>) -> Result<Vec<AuditEntry>> {
        let mut query = AuditQuery::org(org_id);
        query.limit = limit;
        self.storage.load_audit(&query).await
    }

    /// Activity of one board, list or card, newest first
    pub async fn entity_activity(
        &self,
        org_id: &str,
        entity_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<AuditEntry>> {
        let mut query = AuditQuery::org(org_id).entity(entity_id);
        query.limit = limit;
        self.storage.load_audit(&query).await
    }

    // Reordering

    /// Moves the list at `source_index` to `dest_index`
    pub async fn reorder_lists(
        &self,
        board_id: BoardId,
        source_index: usize,
        dest_index: usize,
    ) -> Result<ReorderReceipt> {
        self.reorder(
            board_id,
            ReorderAction::MoveList {
                source_index,
                dest_index,
            },
        )
        .await
    }

    /// Moves a card within its list or into another list
    pub async fn move_card(
        &self,
        board_id: BoardId,
        card_move: CardMove,
    ) -> Result<ReorderReceipt> {
        self.reorder(board_id, card_move.into()).await
    }

    /// Applies a reorder optimistically and commits it
    ///
    /// On a storage failure or timeout the affected parents roll back to their
    /// last committed state, the reorder is kept for
    /// [`BoardService::retry_failed`], and the error is returned.
    pub async fn reorder(
        &self,
        board_id: BoardId,
        action: ReorderAction,
    ) -> Result<ReorderReceipt> {
        self.ensure_loaded(board_id).await?;
        let _access = self.locks.shared(board_id, &action.parents(board_id)).await;

        let staged = self.cache().stage(&board_id, action)?;
        let Some(staged) = staged else {
            tracing::debug!(board_id = %board_id, ?action, "reorder is a no-op");
            return Ok(ReorderReceipt::Unchanged);
        };
        self.commit(board_id, staged).await
    }

    /// Retries the failed reorder on `parents` without redoing the move
    ///
    /// `parents` are the keys reported by [`FailedReorder::parents`].
    pub async fn retry_failed(
        &self,
        board_id: BoardId,
        parents: &[ParentKey],
    ) -> Result<ReorderReceipt> {
        let _access = self.locks.shared(board_id, parents).await;

        let staged = self.cache().restage(&board_id, parents)?;
        tracing::info!(board_id = %board_id, action = ?staged.action, "retrying reorder");
        self.commit(board_id, staged).await
    }

    /// Retries every failed reorder of a board, oldest first
    pub async fn retry_all_failed(&self, board_id: BoardId) -> Result<Vec<ReorderReceipt>> {
        let pending: Vec<Vec<ParentKey>> = self
            .failed_reorders(board_id)?
            .iter()
            .map(|failed| failed.parents().to_vec())
            .collect();

        let mut receipts = Vec::with_capacity(pending.len());
        for parents in pending {
            receipts.push(self.retry_failed(board_id, &parents).await?);
        }
        Ok(receipts)
    }

    async fn commit(&self, board_id: BoardId, staged: StagedReorder) -> Result<ReorderReceipt> {
        let timeout = self.config.commit_timeout();
        let result = self
            .storage
            .apply_order_batch(&staged.batch, Deadline::after(timeout))
            .await;

        let error = match result {
            Ok(()) => {
                let rows = staged.batch.len();
                if let Err(error) = self.cache().commit(&board_id, &staged) {
                    tracing::warn!(board_id = %board_id, error = %error, "board left the cache");
                }
                tracing::info!(
                    board_id = %board_id,
                    action = ?staged.action,
                    rows,
                    "reorder committed"
                );
                return Ok(ReorderReceipt::Committed { rows });
            }
            Err(BoardwiseError::Timeout(_)) => BoardwiseError::Timeout(timeout),
            Err(err) => BoardwiseError::Persistence(err.to_string()),
        };

        tracing::warn!(
            board_id = %board_id,
            action = ?staged.action,
            error = %error,
            "reorder rolled back"
        );
        if let Err(revert_error) = self.cache().revert(&board_id, staged, &error) {
            tracing::warn!(
                board_id = %board_id,
                error = %revert_error,
                "could not roll back reorder"
            );
        }
        Err(error)
    }
}
