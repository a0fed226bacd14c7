//! Message board collaborator: a shared markdown file agents leave notes on.
//!
//! Read-only during bootstrap (lines addressed `**To Agent:**`), append-only
//! at session end. A missing board file is an empty board, not an error.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::io::AsyncWriteExt;

use crate::{Error, Result};

/// A shared markdown message board.
#[derive(Debug, Clone)]
pub struct MessageBoard {
    path: PathBuf,
}

/// End-of-session summary block appended to the board.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// Agent writing the summary.
    pub agent: String,
    /// Ordinal of this session for the agent.
    pub session_number: u32,
    /// What was completed.
    pub completed: String,
    /// What comes next.
    pub next_tasks: String,
    /// Messages for other agents.
    pub messages: String,
    /// Current blockers.
    pub blockers: String,
    /// Quantitative metrics.
    pub metrics: String,
}

impl SessionSummary {
    /// Render the summary as a markdown block.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "\n## Agent {} - Session #{}\n\
             **Date:** {}\n\n\
             ### What I Completed Today\n{}\n\n\
             ### What I'm Working On Next\n{}\n\n\
             ### Messages for Other Agents\n{}\n\n\
             ### Blockers\n{}\n\n\
             ### Metrics\n{}\n\n\
             ---\n",
            display_name(&self.agent),
            self.session_number,
            Utc::now().format("%Y-%m-%d %H:%M"),
            self.completed,
            self.next_tasks,
            self.messages,
            self.blockers,
            self.metrics,
        )
    }
}

impl MessageBoard {
    /// Create a board over the given file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The board file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines on the board addressed to `agent` (`**To Agent:**` markers).
    ///
    /// A missing board file yields an empty list.
    pub async fn messages_for(&self, agent: &str) -> Result<Vec<String>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "message board not found");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(Error::IoError(format!(
                    "Failed to read message board {}: {e}",
                    self.path.display()
                )))
            }
        };

        let marker = format!("**To {}:**", display_name(agent));
        Ok(content
            .lines()
            .filter(|line| line.contains(&marker))
            .map(ToString::to_string)
            .collect())
    }

    /// Append a session summary to the board, creating the file if needed.
    pub async fn append_summary(&self, summary: &SessionSummary) -> Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                Error::IoError(format!(
                    "Failed to open message board {}: {e}",
                    self.path.display()
                ))
            })?;

        file.write_all(summary.render().as_bytes())
            .await
            .map_err(|e| Error::IoError(format!("Failed to write summary: {e}")))?;

        tracing::info!(agent = %summary.agent, "session summary written to board");
        Ok(())
    }
}

/// Board-facing form of an agent name: first letter upper, rest lower.
fn display_name(agent: &str) -> String {
    let mut chars = agent.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
    })
}
