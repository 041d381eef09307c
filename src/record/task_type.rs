//! Task type definitions.

use crate::error::{Result, TaskLockError};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of exclusive background task.
///
/// Each kind carries its own lock-expiration timeout: a holder that stops
/// renewing loses the lock once that much time has passed since its last
/// obtain or renew.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// Deleting a form and all of its submissions.
    FormDeletion,
    /// Purging submissions older than a cutoff.
    PurgeOlderSubmissions,
    /// Pushing accepted submissions to an external service.
    UploadSubmissions,
    /// Building a worksheet from form data.
    WorksheetCreation,
    /// Generating a CSV/KML export file.
    ExportGeneration,
    /// Migrating a table's schema or data.
    TableMigration,
}

impl TaskType {
    /// All known task types.
    pub const ALL: [TaskType; 6] = [
        TaskType::FormDeletion,
        TaskType::PurgeOlderSubmissions,
        TaskType::UploadSubmissions,
        TaskType::WorksheetCreation,
        TaskType::ExportGeneration,
        TaskType::TableMigration,
    ];

    /// Stable wire name, used in stored records and cache keys.
    pub fn name(&self) -> &'static str {
        match self {
            TaskType::FormDeletion => "FORM_DELETION",
            TaskType::PurgeOlderSubmissions => "PURGE_OLDER_SUBMISSIONS",
            TaskType::UploadSubmissions => "UPLOAD_SUBMISSIONS",
            TaskType::WorksheetCreation => "WORKSHEET_CREATION",
            TaskType::ExportGeneration => "EXPORT_GENERATION",
            TaskType::TableMigration => "TABLE_MIGRATION",
        }
    }

    /// How long an obtained or renewed lock stays valid.
    pub fn lock_timeout(&self) -> Duration {
        match self {
            TaskType::FormDeletion
            | TaskType::PurgeOlderSubmissions
            | TaskType::UploadSubmissions => Duration::seconds(60),
            TaskType::WorksheetCreation | TaskType::ExportGeneration => Duration::seconds(120),
            TaskType::TableMigration => Duration::seconds(300),
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TaskType {
    type Err = TaskLockError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().replace('-', "_").to_uppercase();
        TaskType::ALL
            .into_iter()
            .find(|t| t.name() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = TaskType::ALL.iter().map(|t| t.name()).collect();
                TaskLockError::UserError(format!(
                    "unknown task type '{}' (expected one of: {})",
                    s,
                    known.join(", ")
                ))
            })
    }
}
