use crate::domain::ids::BoardId;
use crate::error::{BoardwiseError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shortest accepted title or description, in characters
pub const MIN_TEXT_LEN: usize = 3;

/// Trims `value` and checks it against [`MIN_TEXT_LEN`]
pub fn validate_text(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.chars().count() < MIN_TEXT_LEN {
        return Err(BoardwiseError::Validation(format!(
            "{} is too short (minimum {} characters)",
            field, MIN_TEXT_LEN
        )));
    }
    Ok(trimmed.to_string())
}

/// A kanban board, scoped to one organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub id: BoardId,
    pub org_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Background colour, used when the board has no image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Board {
    /// Creates a new board, validating the title
    pub fn new(org_id: impl Into<String>, title: &str) -> Result<Self> {
        let org_id = org_id.into();
        if org_id.trim().is_empty() {
            return Err(BoardwiseError::Validation(
                "organization id is required".to_string(),
            ));
        }
        let title = validate_text("Title", title)?;
        let now = Utc::now();
        Ok(Self {
            id: BoardId::new(),
            org_id,
            title,
            image_url: None,
            color: None,
            is_favorite: false,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn set_title(&mut self, title: &str) -> Result<()> {
        self.title = validate_text("Title", title)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn set_image_url(&mut self, url: Option<String>) {
        self.image_url = url;
        self.updated_at = Utc::now();
    }

    /// Applies an edit of the board's own fields
    ///
    /// A board shows either an image or a colour, so setting one clears the
    /// other and an update may not set both.
    pub fn apply(&mut self, update: &BoardUpdate) -> Result<()> {
        if update.image_url.is_some() && update.color.is_some() {
            return Err(BoardwiseError::Validation(
                "a board can have either an image or a color, not both".to_string(),
            ));
        }
        let title = update
            .title
            .as_deref()
            .map(|title| validate_text("Title", title))
            .transpose()?;

        if let Some(title) = title {
            self.title = title;
        }
        if let Some(url) = &update.image_url {
            self.image_url = Some(url.clone());
            self.color = None;
        }
        if let Some(color) = &update.color {
            self.color = Some(color.clone());
            self.image_url = None;
        }
        if let Some(is_favorite) = update.is_favorite {
            self.is_favorite = is_favorite;
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Edit of a board's own fields; `None` fields are left as they are
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

impl BoardUpdate {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn favorite(is_favorite: bool) -> Self {
        Self {
            is_favorite: Some(is_favorite),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_creation() {
        let board = Board::new("org_1", "  Roadmap ").unwrap();
        assert_eq!(board.title, "Roadmap");
        assert_eq!(board.org_id, "org_1");
        assert!(board.image_url.is_none());
    }

    #[test]
    fn test_board_title_too_short() {
        let result = Board::new("org_1", "ab");
        assert!(matches!(result, Err(BoardwiseError::Validation(_))));
    }

    #[test]
    fn test_board_requires_org() {
        assert!(Board::new("  ", "Roadmap").is_err());
    }

    #[test]
    fn test_set_title_updates_updated_at() {
        let mut board = Board::new("org_1", "Roadmap").unwrap();
        let before = board.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(5));
        board.set_title("Q3 Roadmap").unwrap();
        assert_eq!(board.title, "Q3 Roadmap");
        assert!(board.updated_at > before);
    }

    #[test]
    fn test_update_rejects_image_and_color_together() {
        let mut board = Board::new("org_1", "Roadmap").unwrap();
        let before = board.clone();

        let result = board.apply(&BoardUpdate {
            image_url: Some("https://images.example/1.jpg".to_string()),
            color: Some("#336699".to_string()),
            ..BoardUpdate::default()
        });

        assert!(matches!(result, Err(BoardwiseError::Validation(_))));
        assert_eq!(board, before);
    }

    #[test]
    fn test_update_swaps_image_for_color() {
        let mut board = Board::new("org_1", "Roadmap").unwrap();
        board.set_image_url(Some("https://images.example/1.jpg".to_string()));

        board
            .apply(&BoardUpdate {
                color: Some("#336699".to_string()),
                is_favorite: Some(true),
                ..BoardUpdate::default()
            })
            .unwrap();

        assert_eq!(board.color.as_deref(), Some("#336699"));
        assert!(board.image_url.is_none());
        assert!(board.is_favorite);
        assert_eq!(board.title, "Roadmap");
    }

    #[test]
    fn test_update_validates_title() {
        let mut board = Board::new("org_1", "Roadmap").unwrap();
        assert!(board.apply(&BoardUpdate::title("no")).is_err());
        assert!(!board.is_favorite);
        board.apply(&BoardUpdate::favorite(true)).unwrap();
        assert!(board.is_favorite);
    }

    #[test]
    fn test_validate_text_counts_characters() {
        assert!(validate_text("Title", "äöü").is_ok());
        assert!(validate_text("Title", " x ").is_err());
    }
}
