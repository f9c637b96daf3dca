// ✅ Action Entity - supporting initiatives behind a key result

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{OkrError, OkrResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Todo,
    Doing,
    Done,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Todo => "todo",
            ActionStatus::Doing => "doing",
            ActionStatus::Done => "done",
        }
    }
}

impl FromStr for ActionStatus {
    type Err = OkrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "todo" | "a_fazer" => Ok(ActionStatus::Todo),
            "doing" | "em_andamento" => Ok(ActionStatus::Doing),
            "done" | "concluida" | "concluída" => Ok(ActionStatus::Done),
            other => Err(OkrError::validation(
                "status",
                format!("Unknown action status '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub key_result_id: String,
    pub title: String,
    #[serde(default)]
    pub responsible: String,
    pub due_date: Option<NaiveDate>,
    pub status: ActionStatus,
    pub created_at: DateTime<Utc>,
}

impl Action {
    pub fn new(key_result_id: &str, title: &str) -> OkrResult<Self> {
        let title = title.trim();
        if title.is_empty() {
            return Err(OkrError::validation("title", "Required field is empty"));
        }

        Ok(Action {
            id: uuid::Uuid::new_v4().to_string(),
            key_result_id: key_result_id.to_string(),
            title: title.to_string(),
            responsible: String::new(),
            due_date: None,
            status: ActionStatus::Todo,
            created_at: Utc::now(),
        })
    }

    /// Builder pattern: add responsible person
    pub fn with_responsible(mut self, responsible: &str) -> Self {
        self.responsible = responsible.trim().to_string();
        self
    }

    /// Builder pattern: add due date
    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    /// Late = not done and past its due date
    pub fn is_late(&self, today: NaiveDate) -> bool {
        self.status != ActionStatus::Done && self.due_date.map(|d| d < today).unwrap_or(false)
    }
}
