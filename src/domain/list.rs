use crate::domain::board::validate_text;
use crate::domain::card::Card;
use crate::domain::ids::{BoardId, ListId};
use crate::domain::ordering::{arrange, Sibling};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A column of cards on a board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct List {
    pub id: ListId,
    pub board_id: BoardId,
    pub title: String,
    pub order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl List {
    /// Creates a list at the given order. Use
    /// [`next_order`](crate::domain::ordering::next_order) to append.
    pub fn new(board_id: BoardId, title: &str, order: i64) -> Result<Self> {
        let title = validate_text("Title", title)?;
        let now = Utc::now();
        Ok(Self {
            id: ListId::new(),
            board_id,
            title,
            order,
            color: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn set_title(&mut self, title: &str) -> Result<()> {
        self.title = validate_text("Title", title)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn with_color(mut self, color: Option<String>) -> Self {
        self.color = color;
        self
    }
}

impl Sibling for List {
    type Id = ListId;
    type ParentId = BoardId;

    fn id(&self) -> ListId {
        self.id
    }

    fn parent_id(&self) -> BoardId {
        self.board_id
    }

    fn set_parent_id(&mut self, parent: BoardId) {
        self.board_id = parent;
    }

    fn order(&self) -> i64 {
        self.order
    }

    fn set_order(&mut self, order: i64) {
        self.order = order;
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// A list together with its cards in rendering sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListWithCards {
    #[serde(flatten)]
    pub list: List,
    #[serde(default)]
    pub cards: Vec<Card>,
}

impl ListWithCards {
    pub fn new(list: List) -> Self {
        Self {
            list,
            cards: Vec::new(),
        }
    }

    /// Builds the view, arranging `cards` into rendering sequence
    pub fn with_cards(list: List, mut cards: Vec<Card>) -> Self {
        arrange(&mut cards);
        Self { list, cards }
    }

    pub fn id(&self) -> ListId {
        self.list.id
    }

    pub fn card_orders(&self) -> impl Iterator<Item = i64> + '_ {
        self.cards.iter().map(|card| card.order)
    }
}

impl Sibling for ListWithCards {
    type Id = ListId;
    type ParentId = BoardId;

    fn id(&self) -> ListId {
        self.list.id
    }

    fn parent_id(&self) -> BoardId {
        self.list.board_id
    }

    fn set_parent_id(&mut self, parent: BoardId) {
        self.list.board_id = parent;
    }

    fn order(&self) -> i64 {
        self.list.order
    }

    fn set_order(&mut self, order: i64) {
        self.list.order = order;
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.list.created_at
    }
}
