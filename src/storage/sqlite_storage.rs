use crate::{
    domain::{
        ordering::arrange, AuditEntry, AuditQuery, Board, BoardId, Card, CardId, CardPatch, List,
        ListId, ListWithCards, OrderBatch,
    },
    error::{BoardwiseError, Result},
    storage::{Deadline, Storage},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use std::{
    collections::HashMap,
    path::Path,
    sync::{Mutex, MutexGuard},
};
use uuid::Uuid;

const SCHEMA_SQL: &str = "
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS boards (
    id          TEXT PRIMARY KEY,
    org_id      TEXT NOT NULL,
    title       TEXT NOT NULL,
    image_url   TEXT,
    color       TEXT,
    is_favorite INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_boards_org ON boards(org_id);

CREATE TABLE IF NOT EXISTS lists (
    id          TEXT PRIMARY KEY,
    board_id    TEXT NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
    title       TEXT NOT NULL,
    sort_order  INTEGER NOT NULL,
    color       TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_lists_board ON lists(board_id);

CREATE TABLE IF NOT EXISTS cards (
    id          TEXT PRIMARY KEY,
    list_id     TEXT NOT NULL REFERENCES lists(id) ON DELETE CASCADE,
    title       TEXT NOT NULL,
    description TEXT,
    color       TEXT,
    sort_order  INTEGER NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cards_list ON cards(list_id);

CREATE TABLE IF NOT EXISTS audit_logs (
    id           TEXT PRIMARY KEY,
    org_id       TEXT NOT NULL,
    action       TEXT NOT NULL,
    entity_type  TEXT NOT NULL,
    entity_id    TEXT NOT NULL,
    entity_title TEXT NOT NULL,
    created_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_org ON audit_logs(org_id, created_at);
";

const BOARD_COLUMNS: &str =
    "id, org_id, title, image_url, color, is_favorite, created_at, updated_at";
const LIST_COLUMNS: &str = "id, board_id, title, sort_order, color, created_at, updated_at";
const CARD_COLUMNS: &str =
    "c.id, c.list_id, c.title, c.description, c.color, c.sort_order, c.created_at, c.updated_at";
const AUDIT_COLUMNS: &str =
    "id, org_id, action, entity_type, entity_id, entity_title, created_at";

fn conversion_error(
    index: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn uuid_at(row: &Row<'_>, index: usize) -> rusqlite::Result<Uuid> {
    let value: String = row.get(index)?;
    Uuid::parse_str(&value).map_err(|err| conversion_error(index, err))
}

fn time_at(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let value: String = row.get(index)?;
    DateTime::parse_from_rfc3339(&value)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|err| conversion_error(index, err))
}

fn board_from_row(row: &Row<'_>) -> rusqlite::Result<Board> {
    Ok(Board {
        id: BoardId::from_uuid(uuid_at(row, 0)?),
        org_id: row.get(1)?,
        title: row.get(2)?,
        image_url: row.get(3)?,
        color: row.get(4)?,
        is_favorite: row.get(5)?,
        created_at: time_at(row, 6)?,
        updated_at: time_at(row, 7)?,
    })
}

fn list_from_row(row: &Row<'_>) -> rusqlite::Result<List> {
    Ok(List {
        id: ListId::from_uuid(uuid_at(row, 0)?),
        board_id: BoardId::from_uuid(uuid_at(row, 1)?),
        title: row.get(2)?,
        order: row.get(3)?,
        color: row.get(4)?,
        created_at: time_at(row, 5)?,
        updated_at: time_at(row, 6)?,
    })
}

fn card_from_row(row: &Row<'_>) -> rusqlite::Result<Card> {
    Ok(Card {
        id: CardId::from_uuid(uuid_at(row, 0)?),
        list_id: ListId::from_uuid(uuid_at(row, 1)?),
        title: row.get(2)?,
        description: row.get(3)?,
        color: row.get(4)?,
        order: row.get(5)?,
        created_at: time_at(row, 6)?,
        updated_at: time_at(row, 7)?,
    })
}

fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    let action: String = row.get(2)?;
    let entity_type: String = row.get(3)?;
    Ok(AuditEntry {
        id: uuid_at(row, 0)?,
        org_id: row.get(1)?,
        action: action.parse().map_err(|err| conversion_error(2, err))?,
        entity_type: entity_type.parse().map_err(|err| conversion_error(3, err))?,
        entity_id: uuid_at(row, 4)?,
        entity_title: row.get(5)?,
        created_at: time_at(row, 6)?,
    })
}

fn insert_card_row(conn: &Connection, card: &Card) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO cards
           (id, list_id, title, description, color, sort_order, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            card.id.to_string(),
            card.list_id.to_string(),
            card.title,
            card.description,
            card.color,
            card.order,
            card.created_at.to_rfc3339(),
            card.updated_at.to_rfc3339(),
        ],
    )
}

/// SQLite-based storage backend for boards, lists and cards
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens (or creates) a database file and applies the schema
    pub fn new(database_path: impl AsRef<Path>) -> Result<Self> {
        let path = database_path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens a private in-memory database
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| BoardwiseError::StorageError("database mutex poisoned".to_string()))
    }

    fn card_in_board(conn: &Connection, board_id: &BoardId, card_id: &CardId) -> Result<Card> {
        let sql = format!(
            "SELECT {CARD_COLUMNS} FROM cards c JOIN lists l ON c.list_id = l.id
             WHERE c.id = ?1 AND l.board_id = ?2"
        );
        conn.query_row(
            &sql,
            params![card_id.to_string(), board_id.to_string()],
            card_from_row,
        )
        .optional()?
        .ok_or_else(|| BoardwiseError::CardNotFound(card_id.to_string()))
    }

    fn list_in_board(conn: &Connection, board_id: &BoardId, list_id: &ListId) -> Result<List> {
        let sql = format!("SELECT {LIST_COLUMNS} FROM lists WHERE id = ?1 AND board_id = ?2");
        conn.query_row(
            &sql,
            params![list_id.to_string(), board_id.to_string()],
            list_from_row,
        )
        .optional()?
        .ok_or_else(|| BoardwiseError::ListNotFound(list_id.to_string()))
    }

    fn ensure_board(conn: &Connection, board_id: &BoardId) -> Result<()> {
        let exists = conn
            .query_row(
                "SELECT 1 FROM boards WHERE id = ?1",
                params![board_id.to_string()],
                |_| Ok(()),
            )
            .optional()?;
        exists.ok_or_else(|| BoardwiseError::BoardNotFound(board_id.to_string()))
    }

    fn ensure_list(conn: &Connection, board_id: &BoardId, list_id: &ListId) -> Result<()> {
        let exists = conn
            .query_row(
                "SELECT 1 FROM lists WHERE id = ?1 AND board_id = ?2",
                params![list_id.to_string(), board_id.to_string()],
                |_| Ok(()),
            )
            .optional()?;
        exists.ok_or_else(|| BoardwiseError::ListNotFound(list_id.to_string()))
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn initialize(&self) -> Result<()> {
        self.conn()?.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    async fn is_initialized(&self) -> bool {
        let Ok(conn) = self.conn() else {
            return false;
        };
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table' AND name IN ('boards', 'lists', 'cards', 'audit_logs')",
            [],
            |row| row.get::<_, i64>(0),
        )
        .map(|count| count == 4)
        .unwrap_or(false)
    }

    async fn save_board(&self, board: &Board) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO boards
               (id, org_id, title, image_url, color, is_favorite, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
               org_id = excluded.org_id,
               title = excluded.title,
               image_url = excluded.image_url,
               color = excluded.color,
               is_favorite = excluded.is_favorite,
               updated_at = excluded.updated_at",
            params![
                board.id.to_string(),
                board.org_id,
                board.title,
                board.image_url,
                board.color,
                board.is_favorite,
                board.created_at.to_rfc3339(),
                board.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn load_board(&self, id: &BoardId) -> Result<Board> {
        let sql = format!("SELECT {BOARD_COLUMNS} FROM boards WHERE id = ?1");
        self.conn()?
            .query_row(&sql, params![id.to_string()], board_from_row)
            .optional()?
            .ok_or_else(|| BoardwiseError::BoardNotFound(id.to_string()))
    }

    async fn list_boards(&self, org_id: &str) -> Result<Vec<Board>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {BOARD_COLUMNS} FROM boards
             WHERE org_id = ?1 ORDER BY created_at ASC, id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let boards = stmt
            .query_map(params![org_id], board_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(boards)
    }

    async fn delete_board(&self, id: &BoardId) -> Result<()> {
        let affected = self
            .conn()?
            .execute("DELETE FROM boards WHERE id = ?1", params![id.to_string()])?;
        if affected == 0 {
            return Err(BoardwiseError::BoardNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn insert_list(&self, list: &ListWithCards) -> Result<()> {
        let mut conn = self.conn()?;
        Self::ensure_board(&conn, &list.list.board_id)?;

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO lists (id, board_id, title, sort_order, color, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                list.list.id.to_string(),
                list.list.board_id.to_string(),
                list.list.title,
                list.list.order,
                list.list.color,
                list.list.created_at.to_rfc3339(),
                list.list.updated_at.to_rfc3339(),
            ],
        )?;
        for card in &list.cards {
            if card.list_id != list.list.id {
                return Err(BoardwiseError::Validation(format!(
                    "cards of list {} reference another list",
                    list.list.id
                )));
            }
            insert_card_row(&tx, card)?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn rename_list(
        &self,
        board_id: &BoardId,
        list_id: &ListId,
        title: &str,
    ) -> Result<List> {
        let conn = self.conn()?;
        let mut list = Self::list_in_board(&conn, board_id, list_id)?;
        list.set_title(title)?;
        conn.execute(
            "UPDATE lists SET title = ?1, updated_at = ?2 WHERE id = ?3",
            params![list.title, list.updated_at.to_rfc3339(), list.id.to_string()],
        )?;
        Ok(list)
    }

    async fn delete_list(&self, board_id: &BoardId, list_id: &ListId) -> Result<()> {
        let affected = self.conn()?.execute(
            "DELETE FROM lists WHERE id = ?1 AND board_id = ?2",
            params![list_id.to_string(), board_id.to_string()],
        )?;
        if affected == 0 {
            return Err(BoardwiseError::ListNotFound(list_id.to_string()));
        }
        Ok(())
    }

    async fn load_lists(&self, board_id: &BoardId) -> Result<Vec<ListWithCards>> {
        let conn = self.conn()?;
        Self::ensure_board(&conn, board_id)?;

        let list_sql = format!("SELECT {LIST_COLUMNS} FROM lists WHERE board_id = ?1");
        let mut stmt = conn.prepare(&list_sql)?;
        let lists = stmt
            .query_map(params![board_id.to_string()], list_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let card_sql = format!(
            "SELECT {CARD_COLUMNS} FROM cards c JOIN lists l ON c.list_id = l.id
             WHERE l.board_id = ?1"
        );
        let mut stmt = conn.prepare(&card_sql)?;
        let mut cards_by_list: HashMap<ListId, Vec<Card>> = HashMap::new();
        for card in stmt.query_map(params![board_id.to_string()], card_from_row)? {
            let card = card?;
            cards_by_list.entry(card.list_id).or_default().push(card);
        }

        let mut result: Vec<ListWithCards> = lists
            .into_iter()
            .map(|list| {
                let cards = cards_by_list.remove(&list.id).unwrap_or_default();
                ListWithCards::with_cards(list, cards)
            })
            .collect();
        arrange(&mut result);
        Ok(result)
    }

    async fn insert_card(&self, board_id: &BoardId, card: &Card) -> Result<()> {
        let conn = self.conn()?;
        Self::ensure_list(&conn, board_id, &card.list_id)?;
        insert_card_row(&conn, card)?;
        Ok(())
    }

    async fn update_card(
        &self,
        board_id: &BoardId,
        card_id: &CardId,
        patch: &CardPatch,
    ) -> Result<Card> {
        let conn = self.conn()?;
        let mut card = Self::card_in_board(&conn, board_id, card_id)?;
        card.apply(patch)?;
        conn.execute(
            "UPDATE cards SET title = ?1, description = ?2, color = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                card.title,
                card.description,
                card.color,
                card.updated_at.to_rfc3339(),
                card.id.to_string()
            ],
        )?;
        Ok(card)
    }

    async fn delete_card(&self, board_id: &BoardId, card_id: &CardId) -> Result<Card> {
        let conn = self.conn()?;
        let card = Self::card_in_board(&conn, board_id, card_id)?;
        conn.execute("DELETE FROM cards WHERE id = ?1", params![card_id.to_string()])?;
        Ok(card)
    }

    async fn apply_order_batch(&self, batch: &OrderBatch, deadline: Deadline) -> Result<()> {
        let mut conn = self.conn()?;
        // Returning early drops the transaction, which rolls it back
        let tx = conn.transaction()?;

        match batch {
            OrderBatch::Lists { board_id, updates } => {
                for update in updates {
                    if let Some(parent) = update.parent_id {
                        if parent != *board_id {
                            return Err(BoardwiseError::Validation(format!(
                                "list {} cannot move to board {}",
                                update.id, parent
                            )));
                        }
                    }
                    let affected = tx.execute(
                        "UPDATE lists SET sort_order = ?1 WHERE id = ?2 AND board_id = ?3",
                        params![update.order, update.id.to_string(), board_id.to_string()],
                    )?;
                    if affected != 1 {
                        return Err(BoardwiseError::ListNotFound(update.id.to_string()));
                    }
                }
            }
            OrderBatch::Cards { board_id, updates } => {
                for update in updates {
                    let affected = match update.parent_id {
                        Some(list_id) => {
                            Self::ensure_list(&tx, board_id, &list_id)?;
                            tx.execute(
                                "UPDATE cards SET sort_order = ?1, list_id = ?2
                                 WHERE id = ?3
                                   AND list_id IN (SELECT id FROM lists WHERE board_id = ?4)",
                                params![
                                    update.order,
                                    list_id.to_string(),
                                    update.id.to_string(),
                                    board_id.to_string()
                                ],
                            )?
                        }
                        None => tx.execute(
                            "UPDATE cards SET sort_order = ?1
                             WHERE id = ?2
                               AND list_id IN (SELECT id FROM lists WHERE board_id = ?3)",
                            params![update.order, update.id.to_string(), board_id.to_string()],
                        )?,
                    };
                    if affected != 1 {
                        return Err(BoardwiseError::CardNotFound(update.id.to_string()));
                    }
                }
            }
        }

        deadline.check()?;
        tx.commit()?;
        tracing::debug!(board_id = %batch.board_id(), rows = batch.len(), "order batch committed");
        Ok(())
    }

    async fn record_audit(&self, entry: &AuditEntry) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO audit_logs
               (id, org_id, action, entity_type, entity_id, entity_title, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.id.to_string(),
                entry.org_id,
                entry.action.as_str(),
                entry.entity_type.as_str(),
                entry.entity_id.to_string(),
                entry.entity_title,
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn load_audit(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_logs
             WHERE org_id = ?1 AND (?2 IS NULL OR entity_id = ?2)"
        );
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(
                params![query.org_id, query.entity_id.map(|id| id.to_string())],
                audit_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(query.finish(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AuditAction, BoardUpdate, OrderUpdate};
    use std::time::Duration;

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    async fn storage_with_board() -> (SqliteStorage, Board) {
        let storage = SqliteStorage::in_memory().unwrap();
        let board = Board::new("org_1", "Roadmap").unwrap();
        storage.save_board(&board).await.unwrap();
        (storage, board)
    }

    async fn add_list(storage: &SqliteStorage, board: &Board, title: &str, order: i64) -> List {
        let list = List::new(board.id, title, order).unwrap();
        storage
            .insert_list(&ListWithCards::new(list.clone()))
            .await
            .unwrap();
        list
    }

    async fn add_card(
        storage: &SqliteStorage,
        board: &Board,
        list: &List,
        title: &str,
        order: i64,
    ) -> Card {
        let card = Card::new(list.id, title, order).unwrap();
        storage.insert_card(&board.id, &card).await.unwrap();
        card
    }

    #[tokio::test]
    async fn test_initialization() {
        let storage = SqliteStorage::in_memory().unwrap();
        assert!(storage.is_initialized().await);
        storage.initialize().await.unwrap();
    }

    #[tokio::test]
    async fn test_board_round_trip() {
        let (storage, board) = storage_with_board().await;

        assert_eq!(storage.load_board(&board.id).await.unwrap(), board);
        assert_eq!(storage.list_boards("org_1").await.unwrap().len(), 1);
        assert!(storage.list_boards("org_2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lists_and_cards_in_rendering_sequence() {
        let (storage, board) = storage_with_board().await;
        let done = add_list(&storage, &board, "Done", 2).await;
        let todo = add_list(&storage, &board, "Todo", 1).await;
        add_card(&storage, &board, &todo, "Later", 9).await;
        add_card(&storage, &board, &todo, "Sooner", 3).await;

        let lists = storage.load_lists(&board.id).await.unwrap();

        assert_eq!(lists[0].list.id, todo.id);
        assert_eq!(lists[1].list.id, done.id);
        assert_eq!(lists[0].cards[0].title, "Sooner");
    }

    #[tokio::test]
    async fn test_delete_board_cascades() {
        let (storage, board) = storage_with_board().await;
        let list = add_list(&storage, &board, "Todo", 1).await;
        let card = add_card(&storage, &board, &list, "Task", 1).await;

        storage.delete_board(&board.id).await.unwrap();

        assert!(storage.load_lists(&board.id).await.is_err());
        assert!(storage.delete_card(&board.id, &card.id).await.is_err());
    }

    #[tokio::test]
    async fn test_cross_list_batch() {
        let (storage, board) = storage_with_board().await;
        let source = add_list(&storage, &board, "Todo", 1).await;
        let dest = add_list(&storage, &board, "Done", 2).await;
        let card = add_card(&storage, &board, &source, "Task", 1).await;

        let batch = OrderBatch::Cards {
            board_id: board.id,
            updates: vec![OrderUpdate {
                id: card.id,
                order: 0,
                parent_id: Some(dest.id),
            }],
        };
        storage.apply_order_batch(&batch, deadline()).await.unwrap();

        let lists = storage.load_lists(&board.id).await.unwrap();
        assert!(lists[0].cards.is_empty());
        assert_eq!(lists[1].cards[0].list_id, dest.id);
        assert_eq!(lists[1].cards[0].order, 0);
    }

    #[tokio::test]
    async fn test_interrupted_batch_rolls_back() {
        let (storage, board) = storage_with_board().await;
        let source = add_list(&storage, &board, "Todo", 1).await;
        let dest = add_list(&storage, &board, "Done", 2).await;
        let a = add_card(&storage, &board, &source, "Alpha", 0).await;
        let b = add_card(&storage, &board, &source, "Bravo", 1).await;
        let before = storage.load_lists(&board.id).await.unwrap();

        // The first row is written before the second one fails
        let batch = OrderBatch::Cards {
            board_id: board.id,
            updates: vec![
                OrderUpdate { id: b.id, order: 0, parent_id: Some(dest.id) },
                OrderUpdate {
                    id: CardId::new(),
                    order: 1,
                    parent_id: Some(dest.id),
                },
                OrderUpdate { id: a.id, order: 0, parent_id: Some(source.id) },
            ],
        };

        assert!(storage.apply_order_batch(&batch, deadline()).await.is_err());
        assert_eq!(storage.load_lists(&board.id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_update_card_content() {
        let (storage, board) = storage_with_board().await;
        let list = add_list(&storage, &board, "Todo", 1).await;
        let card = add_card(&storage, &board, &list, "Task", 4).await;

        let updated = storage
            .update_card(&board.id, &card.id, &CardPatch::description("Some details"))
            .await
            .unwrap();

        assert_eq!(updated.description.as_deref(), Some("Some details"));
        assert_eq!(updated.order, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline_rolls_back() {
        let (storage, board) = storage_with_board().await;
        let source = add_list(&storage, &board, "Todo", 1).await;
        let dest = add_list(&storage, &board, "Done", 2).await;
        let card = add_card(&storage, &board, &source, "Task", 1).await;
        let before = storage.load_lists(&board.id).await.unwrap();

        let expired = Deadline::after(Duration::from_millis(10));
        tokio::time::advance(Duration::from_millis(20)).await;
        let batch = OrderBatch::Cards {
            board_id: board.id,
            updates: vec![OrderUpdate {
                id: card.id,
                order: 0,
                parent_id: Some(dest.id),
            }],
        };

        let result = storage.apply_order_batch(&batch, expired).await;
        assert!(matches!(result, Err(BoardwiseError::Timeout(_))));
        assert_eq!(storage.load_lists(&board.id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_board_color_and_favorite_persist() {
        let (storage, mut board) = storage_with_board().await;
        board
            .apply(&BoardUpdate {
                color: Some("#22aa88".to_string()),
                is_favorite: Some(true),
                ..BoardUpdate::default()
            })
            .unwrap();
        storage.save_board(&board).await.unwrap();

        let loaded = storage.load_board(&board.id).await.unwrap();
        assert_eq!(loaded.color.as_deref(), Some("#22aa88"));
        assert!(loaded.is_favorite);
    }

    #[tokio::test]
    async fn test_audit_log_queries() {
        let (storage, board) = storage_with_board().await;
        let list = add_list(&storage, &board, "Todo", 1).await;
        let card = add_card(&storage, &board, &list, "Task", 1).await;

        let created = AuditEntry::card("org_1", &card, AuditAction::Create);
        let mut deleted = AuditEntry::card("org_1", &card, AuditAction::Delete);
        deleted.created_at = created.created_at + chrono::Duration::seconds(1);
        let board_entry = AuditEntry::board(&board, AuditAction::Create);
        for entry in [&created, &deleted, &board_entry] {
            storage.record_audit(entry).await.unwrap();
        }

        let card_feed = storage
            .load_audit(&AuditQuery::org("org_1").entity(*card.id.as_uuid()))
            .await
            .unwrap();
        assert_eq!(card_feed, vec![deleted, created]);

        assert_eq!(storage.load_audit(&AuditQuery::org("org_1")).await.unwrap().len(), 3);
        assert!(storage.load_audit(&AuditQuery::org("org_2")).await.unwrap().is_empty());
    }
}
