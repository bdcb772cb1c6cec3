use crate::{
    domain::{
        AuditEntry, AuditQuery, Board, BoardId, Card, CardId, CardPatch, List, ListId,
        ListWithCards, OrderBatch,
    },
    error::{BoardwiseError, Result},
};
use async_trait::async_trait;
use std::{future::Future, time::Duration};
use tokio::time::Instant;

pub mod file_storage;

#[cfg(feature = "sqlite-storage")]
pub mod sqlite_storage;

pub use file_storage::FileStorage;

#[cfg(feature = "sqlite-storage")]
pub use sqlite_storage::SqliteStorage;

/// Point in time after which a batch must no longer be applied
///
/// Backends check it up to their commit point. Once a batch is past the
/// commit point it is finished regardless, so a caller that sees
/// [`BoardwiseError::Timeout`] knows nothing was written.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Fails with [`BoardwiseError::Timeout`] once the deadline has passed
    pub fn check(&self) -> Result<()> {
        if self.is_expired() {
            return Err(BoardwiseError::Timeout(self.budget));
        }
        Ok(())
    }

    /// Awaits `fut`, giving up when the deadline passes
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output> {
        tokio::time::timeout_at(self.at, fut)
            .await
            .map_err(|_| BoardwiseError::Timeout(self.budget))
    }
}

/// Storage trait for persisting boards, lists and cards
///
/// Only [`Storage::apply_order_batch`] may change the `order` of an
/// existing row, or move a card to another list.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Initializes the storage backend
    async fn initialize(&self) -> Result<()>;

    /// Checks if the storage has been initialized
    async fn is_initialized(&self) -> bool;

    /// Inserts or replaces a board's own fields
    async fn save_board(&self, board: &Board) -> Result<()>;

    /// Loads a board by ID
    async fn load_board(&self, id: &BoardId) -> Result<Board>;

    /// Lists the boards of an organization, oldest first
    async fn list_boards(&self, org_id: &str) -> Result<Vec<Board>>;

    /// Deletes a board with all of its lists and cards
    async fn delete_board(&self, id: &BoardId) -> Result<()>;

    /// Inserts a new list, optionally with cards
    async fn insert_list(&self, list: &ListWithCards) -> Result<()>;

    /// Changes a list's title and returns the updated list
    async fn rename_list(
        &self,
        board_id: &BoardId,
        list_id: &ListId,
        title: &str,
    ) -> Result<List>;

    /// Deletes a list and its cards; sibling orders are left as they are
    async fn delete_list(&self, board_id: &BoardId, list_id: &ListId) -> Result<()>;

    /// Loads every list of a board with its cards, in rendering sequence
    async fn load_lists(&self, board_id: &BoardId) -> Result<Vec<ListWithCards>>;

    /// Inserts a new card into an existing list
    async fn insert_card(&self, board_id: &BoardId, card: &Card) -> Result<()>;

    /// Applies a content edit to a card and returns the updated card
    async fn update_card(
        &self,
        board_id: &BoardId,
        card_id: &CardId,
        patch: &CardPatch,
    ) -> Result<Card>;

    /// Deletes a card; sibling orders are left as they are
    async fn delete_card(&self, board_id: &BoardId, card_id: &CardId) -> Result<Card>;

    /// Applies every row of `batch`, or none of them
    ///
    /// Nothing is applied if `deadline` passes before the commit point.
    async fn apply_order_batch(&self, batch: &OrderBatch, deadline: Deadline) -> Result<()>;

    /// Appends an entry to the activity log
    async fn record_audit(&self, entry: &AuditEntry) -> Result<()>;

    /// Reads matching activity entries, newest first
    async fn load_audit(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let deadline = Deadline::after(Duration::from_millis(100));
        assert!(deadline.check().is_ok());

        tokio::time::advance(Duration::from_millis(150)).await;

        assert!(deadline.is_expired());
        assert!(matches!(deadline.check(), Err(BoardwiseError::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_run_gives_up() {
        let deadline = Deadline::after(Duration::from_millis(100));

        let done = deadline.run(async { 7 }).await.unwrap();
        assert_eq!(done, 7);

        let stalled = deadline
            .run(tokio::time::sleep(Duration::from_secs(5)))
            .await;
        assert!(matches!(stalled, Err(BoardwiseError::Timeout(_))));
    }
}
