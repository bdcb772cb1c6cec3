//! Activity log entries recorded for every board, list and card mutation.

use crate::domain::{Board, Card, List};
use crate::error::BoardwiseError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// What happened to the entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            Self::Create => "created",
            Self::Update => "updated",
            Self::Delete => "deleted",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = BoardwiseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            other => Err(BoardwiseError::Validation(format!(
                "unknown audit action '{}'",
                other
            ))),
        }
    }
}

/// Kind of entity an entry refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityType {
    Board,
    List,
    Card,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Board => "BOARD",
            Self::List => "LIST",
            Self::Card => "CARD",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = BoardwiseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BOARD" => Ok(Self::Board),
            "LIST" => Ok(Self::List),
            "CARD" => Ok(Self::Card),
            other => Err(BoardwiseError::Validation(format!(
                "unknown entity type '{}'",
                other
            ))),
        }
    }
}

/// One line of an organization's activity feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub org_id: String,
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    /// Title at the time of the action, kept so deleted entities stay readable
    pub entity_title: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        org_id: impl Into<String>,
        action: AuditAction,
        entity_type: EntityType,
        entity_id: Uuid,
        entity_title: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id: org_id.into(),
            action,
            entity_type,
            entity_id,
            entity_title: entity_title.into(),
            created_at: Utc::now(),
        }
    }

    pub fn board(board: &Board, action: AuditAction) -> Self {
        Self::new(
            board.org_id.clone(),
            action,
            EntityType::Board,
            *board.id.as_uuid(),
            board.title.clone(),
        )
    }

    pub fn list(org_id: &str, list: &List, action: AuditAction) -> Self {
        Self::new(org_id, action, EntityType::List, *list.id.as_uuid(), list.title.clone())
    }

    pub fn card(org_id: &str, card: &Card, action: AuditAction) -> Self {
        Self::new(org_id, action, EntityType::Card, *card.id.as_uuid(), card.title.clone())
    }

    /// Human readable summary, e.g. `created card "Write docs"`
    pub fn message(&self) -> String {
        format!(
            "{} {} \"{}\"",
            self.action.verb(),
            self.entity_type.as_str().to_lowercase(),
            self.entity_title
        )
    }
}

/// Filter for reading an activity feed, newest entries first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditQuery {
    pub org_id: String,
    pub entity_id: Option<Uuid>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn org(org_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            entity_id: None,
            limit: None,
        }
    }

    pub fn entity(mut self, entity_id: Uuid) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        entry.org_id == self.org_id && self.entity_id.map_or(true, |id| entry.entity_id == id)
    }

    /// Sorts newest first and applies the limit
    pub fn finish(&self, mut entries: Vec<AuditEntry>) -> Vec<AuditEntry> {
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        if let Some(limit) = self.limit {
            entries.truncate(limit);
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ListId;
    use chrono::Duration;

    #[test]
    fn test_message() {
        let card = Card::new(ListId::new(), "Write docs", 1).unwrap();
        let entry = AuditEntry::card("org_1", &card, AuditAction::Create);

        assert_eq!(entry.message(), "created card \"Write docs\"");
        assert_eq!(entry.entity_id, *card.id.as_uuid());
        assert_eq!(entry.entity_type, EntityType::Card);
    }

    #[test]
    fn test_action_and_type_parse_back() {
        for action in [AuditAction::Create, AuditAction::Update, AuditAction::Delete] {
            assert_eq!(action.as_str().parse::<AuditAction>().unwrap(), action);
        }
        assert_eq!("LIST".parse::<EntityType>().unwrap(), EntityType::List);
        assert!("ARCHIVE".parse::<AuditAction>().is_err());
    }

    #[test]
    fn test_serializes_upper_case() {
        let board = Board::new("org_1", "Roadmap").unwrap();
        let value = serde_json::to_value(AuditEntry::board(&board, AuditAction::Delete)).unwrap();
        assert_eq!(value["action"], "DELETE");
        assert_eq!(value["entity_type"], "BOARD");
    }

    #[test]
    fn test_query_filters_and_orders() {
        let board = Board::new("org_1", "Roadmap").unwrap();
        let mut older = AuditEntry::board(&board, AuditAction::Create);
        older.created_at = older.created_at - Duration::minutes(5);
        let newer = AuditEntry::board(&board, AuditAction::Update);
        let foreign = AuditEntry::new(
            "org_2",
            AuditAction::Create,
            EntityType::Board,
            Uuid::new_v4(),
            "Other",
        );

        let query = AuditQuery::org("org_1").entity(*board.id.as_uuid());
        let entries: Vec<_> = [older.clone(), foreign, newer.clone()]
            .into_iter()
            .filter(|entry| query.matches(entry))
            .collect();
        let entries = query.clone().limit(1).finish(entries);

        assert_eq!(entries, vec![newer]);
    }
}
