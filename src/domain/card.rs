use crate::domain::board::validate_text;
use crate::domain::ids::{CardId, ListId};
use crate::domain::ordering::Sibling;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A kanban card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub list_id: ListId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    /// Creates a card at the given order within `list_id`
    pub fn new(list_id: ListId, title: &str, order: i64) -> Result<Self> {
        let title = validate_text("Title", title)?;
        let now = Utc::now();
        Ok(Self {
            id: CardId::new(),
            list_id,
            title,
            description: None,
            color: None,
            order,
            created_at: now,
            updated_at: now,
        })
    }

    /// Copies content into a fresh card under another list, keeping `order`
    pub fn duplicate_into(&self, list_id: ListId) -> Self {
        let now = Utc::now();
        Self {
            id: CardId::new(),
            list_id,
            title: self.title.clone(),
            description: self.description.clone(),
            color: self.color.clone(),
            order: self.order,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a content edit. Never touches `order` or `list_id`.
    pub fn apply(&mut self, patch: &CardPatch) -> Result<()> {
        let title = patch
            .title
            .as_deref()
            .map(|title| validate_text("Title", title))
            .transpose()?;
        let description = match &patch.description {
            Some(Some(description)) => Some(Some(validate_text("Description", description)?)),
            Some(None) => Some(None),
            None => None,
        };

        if let Some(title) = title {
            self.title = title;
        }
        if let Some(description) = description {
            self.description = description;
        }
        if let Some(color) = &patch.color {
            self.color = color.clone();
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

impl Sibling for Card {
    type Id = CardId;
    type ParentId = ListId;

    fn id(&self) -> CardId {
        self.id
    }

    fn parent_id(&self) -> ListId {
        self.list_id
    }

    fn set_parent_id(&mut self, parent: ListId) {
        self.list_id = parent;
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

/// Content edit for a card
///
/// `None` fields are left as they are. For `description` and `color`,
/// `Some(None)` clears the field; in JSON that is an explicit `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub color: Option<Option<String>>,
}

/// Tells a field given as `null` apart from a missing one
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl CardPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn description(description: impl Into<String>) -> Self {
        Self {
            description: Some(Some(description.into())),
            ..Self::default()
        }
    }

    pub fn color(color: impl Into<String>) -> Self {
        Self {
            color: Some(Some(color.into())),
            ..Self::default()
        }
    }

    pub fn clear_description() -> Self {
        Self {
            description: Some(None),
            ..Self::default()
        }
    }

    pub fn clear_color() -> Self {
        Self {
            color: Some(None),
            ..Self::default()
        }
    }
}
