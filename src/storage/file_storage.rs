use crate::{
    config::CoreConfig,
    domain::{
        ordering::arrange,
        reorder::{CardOrderUpdate, ListOrderUpdate},
        AuditEntry, AuditQuery, Board, BoardId, Card, CardId, CardPatch, List, ListId,
        ListWithCards, OrderBatch,
    },
    error::{BoardwiseError, Result},
    storage::{Deadline, Storage},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use tokio::{
    fs,
    io::AsyncWriteExt,
    sync::{Mutex, OwnedMutexGuard},
};

/// Everything stored for one board
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BoardDocument {
    board: Board,
    #[serde(default)]
    lists: Vec<ListWithCards>,
}

impl BoardDocument {
    fn list_mut(&mut self, list_id: &ListId) -> Result<&mut ListWithCards> {
        self.lists
            .iter_mut()
            .find(|entry| entry.list.id == *list_id)
            .ok_or_else(|| BoardwiseError::ListNotFound(list_id.to_string()))
    }

    fn locate_card(&self, card_id: &CardId) -> Option<(usize, usize)> {
        self.lists.iter().enumerate().find_map(|(list_index, entry)| {
            entry
                .cards
                .iter()
                .position(|card| card.id == *card_id)
                .map(|card_index| (list_index, card_index))
        })
    }
}

/// File-based storage: one JSON document per board
///
/// Every mutation rewrites the whole document through a uniquely named
/// temporary file that is persisted over the old one, so a failed write
/// leaves the previous document intact. The activity log is a JSON-lines
/// file next to the boards directory.
pub struct FileStorage {
    root_path: PathBuf,
    write_lock: Arc<Mutex<()>>,
    audit_lock: Mutex<()>,
}

impl FileStorage {
    const DATA_DIR: &'static str = ".boardwise";
    const BOARDS_DIR: &'static str = "boards";
    const AUDIT_FILE: &'static str = "audit.jsonl";

    /// Creates a new FileStorage instance for the given project root
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            root_path: project_root.as_ref().join(Self::DATA_DIR),
            write_lock: Arc::new(Mutex::new(())),
            audit_lock: Mutex::new(()),
        }
    }

    /// Creates a FileStorage rooted at [`CoreConfig::storage_root`]
    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(&config.storage_root)
    }

    fn boards_dir(&self) -> PathBuf {
        self.root_path.join(Self::BOARDS_DIR)
    }

    fn board_file(&self, id: &BoardId) -> PathBuf {
        self.boards_dir().join(format!("{}.json", id))
    }

    fn audit_file(&self) -> PathBuf {
        self.root_path.join(Self::AUDIT_FILE)
    }

    async fn ensure_directory_exists(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path).await?;
        }
        Ok(())
    }

    async fn read_document(&self, id: &BoardId) -> Result<BoardDocument> {
        let path = self.board_file(id);
        if !path.exists() {
            return Err(BoardwiseError::BoardNotFound(id.to_string()));
        }

        let contents = fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&contents)?)
    }

    async fn lock(&self, deadline: Option<Deadline>) -> Result<OwnedMutexGuard<()>> {
        let acquire = Arc::clone(&self.write_lock).lock_owned();
        match deadline {
            Some(deadline) => deadline.run(acquire).await,
            None => Ok(acquire.await),
        }
    }

    /// Replaces the document on disk
    ///
    /// The write runs on the blocking pool and owns `guard`, so it finishes
    /// and releases the lock even if the caller stops waiting for it.
    async fn write_document(
        &self,
        document: &BoardDocument,
        guard: OwnedMutexGuard<()>,
    ) -> Result<()> {
        let dir = self.boards_dir();
        let path = self.board_file(&document.board.id);
        let json = serde_json::to_vec_pretty(document)?;

        tokio::task::spawn_blocking(move || -> Result<()> {
            let _guard = guard;
            std::fs::create_dir_all(&dir)?;
            let mut staging = tempfile::Builder::new()
                .prefix(".")
                .suffix(".tmp")
                .tempfile_in(&dir)?;
            staging.write_all(&json)?;
            staging.as_file().sync_all()?;
            staging
                .persist(&path)
                .map_err(|err| BoardwiseError::IoError(err.error))?;
            Ok(())
        })
        .await
        .map_err(|err| BoardwiseError::StorageError(format!("write task failed: {}", err)))??;

        tracing::debug!(board_id = %document.board.id, "board document written");
        Ok(())
    }

    /// Read-modify-write of one board document under the write lock
    async fn modify<T, F>(&self, id: &BoardId, change: F) -> Result<T>
    where
        F: FnOnce(&mut BoardDocument) -> Result<T> + Send,
        T: Send,
    {
        self.modify_until(id, None, change).await
    }

    /// Like [`Self::modify`], but gives up without writing once `deadline` passes
    async fn modify_until<T, F>(
        &self,
        id: &BoardId,
        deadline: Option<Deadline>,
        change: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut BoardDocument) -> Result<T> + Send,
        T: Send,
    {
        let guard = self.lock(deadline).await?;
        let mut document = self.read_document(id).await?;
        let output = change(&mut document)?;
        if let Some(deadline) = deadline {
            deadline.check()?;
        }
        self.write_document(&document, guard).await?;
        Ok(output)
    }
}

fn apply_list_updates(document: &mut BoardDocument, updates: &[ListOrderUpdate]) -> Result<()> {
    let board_id = document.board.id;
    for update in updates {
        if let Some(parent) = update.parent_id {
            if parent != board_id {
                return Err(BoardwiseError::Validation(format!(
                    "list {} cannot move to board {}",
                    update.id, parent
                )));
            }
        }
        document.list_mut(&update.id)?.list.order = update.order;
    }
    arrange(&mut document.lists);
    Ok(())
}

fn apply_card_updates(document: &mut BoardDocument, updates: &[CardOrderUpdate]) -> Result<()> {
    for update in updates {
        let (list_index, card_index) = document
            .locate_card(&update.id)
            .ok_or_else(|| BoardwiseError::CardNotFound(update.id.to_string()))?;

        let mut card = document.lists[list_index].cards.remove(card_index);
        let target = update.parent_id.unwrap_or(card.list_id);
        card.order = update.order;
        card.list_id = target;
        document.list_mut(&target)?.cards.push(card);
    }
    for entry in &mut document.lists {
        arrange(&mut entry.cards);
    }
    Ok(())
}

#[async_trait]
impl Storage for FileStorage {
    async fn initialize(&self) -> Result<()> {
        self.ensure_directory_exists(&self.root_path).await?;
        self.ensure_directory_exists(&self.boards_dir()).await?;

        let gitignore_path = self.root_path.join(".gitignore");
        if !gitignore_path.exists() {
            fs::write(gitignore_path, "# Interrupted writes\n*.tmp\n").await?;
        }

        Ok(())
    }

    async fn is_initialized(&self) -> bool {
        self.root_path.exists() && self.boards_dir().exists()
    }

    async fn save_board(&self, board: &Board) -> Result<()> {
        let guard = self.lock(None).await?;
        let document = match self.read_document(&board.id).await {
            Ok(mut existing) => {
                existing.board = board.clone();
                existing
            }
            Err(BoardwiseError::BoardNotFound(_)) => BoardDocument {
                board: board.clone(),
                lists: Vec::new(),
            },
            Err(err) => return Err(err),
        };
        self.write_document(&document, guard).await
    }

    async fn load_board(&self, id: &BoardId) -> Result<Board> {
        Ok(self.read_document(id).await?.board)
    }

    async fn list_boards(&self, org_id: &str) -> Result<Vec<Board>> {
        let boards_dir = self.boards_dir();
        if !boards_dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(&boards_dir).await?;
        let mut boards = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|stem| BoardId::from_str(stem).ok())
            else {
                continue;
            };

            match self.read_document(&id).await {
                Ok(document) if document.board.org_id == org_id => boards.push(document.board),
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %error,
                        "skipping malformed board document"
                    );
                }
            }
        }

        boards.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(boards)
    }

    async fn delete_board(&self, id: &BoardId) -> Result<()> {
        let _guard = self.lock(None).await?;
        let path = self.board_file(id);
        if !path.exists() {
            return Err(BoardwiseError::BoardNotFound(id.to_string()));
        }
        fs::remove_file(path).await?;
        Ok(())
    }

    async fn insert_list(&self, list: &ListWithCards) -> Result<()> {
        let list = list.clone();
        let board_id = list.list.board_id;
        self.modify(&board_id, move |document| {
            if document.lists.iter().any(|entry| entry.list.id == list.list.id) {
                return Err(BoardwiseError::StorageError(format!(
                    "list {} already exists",
                    list.list.id
                )));
            }
            if list.cards.iter().any(|card| card.list_id != list.list.id) {
                return Err(BoardwiseError::Validation(format!(
                    "cards of list {} reference another list",
                    list.list.id
                )));
            }
            document.lists.push(list);
            Ok(())
        })
        .await
    }

    async fn rename_list(
        &self,
        board_id: &BoardId,
        list_id: &ListId,
        title: &str,
    ) -> Result<List> {
        self.modify(board_id, |document| {
            let entry = document.list_mut(list_id)?;
            entry.list.set_title(title)?;
            Ok(entry.list.clone())
        })
        .await
    }

    async fn delete_list(&self, board_id: &BoardId, list_id: &ListId) -> Result<()> {
        self.modify(board_id, |document| {
            let before = document.lists.len();
            document.lists.retain(|entry| entry.list.id != *list_id);
            if document.lists.len() == before {
                return Err(BoardwiseError::ListNotFound(list_id.to_string()));
            }
            Ok(())
        })
        .await
    }

    async fn load_lists(&self, board_id: &BoardId) -> Result<Vec<ListWithCards>> {
        let mut lists = self.read_document(board_id).await?.lists;
        arrange(&mut lists);
        for entry in &mut lists {
            arrange(&mut entry.cards);
        }
        Ok(lists)
    }

    async fn insert_card(&self, board_id: &BoardId, card: &Card) -> Result<()> {
        let card = card.clone();
        self.modify(board_id, move |document| {
            if document.locate_card(&card.id).is_some() {
                return Err(BoardwiseError::StorageError(format!(
                    "card {} already exists",
                    card.id
                )));
            }
            document.list_mut(&card.list_id)?.cards.push(card);
            Ok(())
        })
        .await
    }

    async fn update_card(
        &self,
        board_id: &BoardId,
        card_id: &CardId,
        patch: &CardPatch,
    ) -> Result<Card> {
        self.modify(board_id, |document| {
            let (list_index, card_index) = document
                .locate_card(card_id)
                .ok_or_else(|| BoardwiseError::CardNotFound(card_id.to_string()))?;
            let card = &mut document.lists[list_index].cards[card_index];
            card.apply(patch)?;
            Ok(card.clone())
        })
        .await
    }

    async fn delete_card(&self, board_id: &BoardId, card_id: &CardId) -> Result<Card> {
        self.modify(board_id, |document| {
            let (list_index, card_index) = document
                .locate_card(card_id)
                .ok_or_else(|| BoardwiseError::CardNotFound(card_id.to_string()))?;
            Ok(document.lists[list_index].cards.remove(card_index))
        })
        .await
    }

    async fn apply_order_batch(&self, batch: &OrderBatch, deadline: Deadline) -> Result<()> {
        // Rows are applied to an in-memory copy; the document on disk is only
        // replaced once every row has been applied.
        self.modify_until(&batch.board_id(), Some(deadline), |document| match batch {
            OrderBatch::Lists { updates, .. } => apply_list_updates(document, updates),
            OrderBatch::Cards { updates, .. } => apply_card_updates(document, updates),
        })
        .await?;

        tracing::debug!(board_id = %batch.board_id(), rows = batch.len(), "order batch applied");
        Ok(())
    }

    async fn record_audit(&self, entry: &AuditEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let _guard = self.audit_lock.lock().await;
        self.ensure_directory_exists(&self.root_path).await?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.audit_file())
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn load_audit(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>> {
        let path = self.audit_file();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&path).await?;
        let mut entries = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) if query.matches(&entry) => entries.push(entry),
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(
                        line = index + 1,
                        error = %error,
                        "skipping malformed audit entry"
                    );
                }
            }
        }
        Ok(query.finish(entries))
    }
}
