//! Task queue collaborator: per-agent markdown checklists.
//!
//! Each agent has a `{queue_dir}/{agent}_queue.md` file maintained by hand;
//! pending work is whatever is still unchecked. A missing file is an empty
//! queue, not an error.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;

use crate::{Error, Result};

/// A single checklist entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    /// The task text.
    pub text: String,
    /// Whether the checkbox is ticked.
    pub done: bool,
}

/// Per-agent task queues stored as markdown checklists.
#[derive(Debug, Clone)]
pub struct TaskList {
    queue_dir: PathBuf,
}

impl TaskList {
    /// Create a task list rooted at the given directory.
    #[must_use]
    pub fn new(queue_dir: impl Into<PathBuf>) -> Self {
        Self {
            queue_dir: queue_dir.into(),
        }
    }

    /// Path of an agent's queue file.
    #[must_use]
    pub fn path_for(&self, agent: &str) -> PathBuf {
        self.queue_dir
            .join(format!("{}_queue.md", agent.to_lowercase()))
    }

    /// The queue directory.
    #[must_use]
    pub fn queue_dir(&self) -> &Path {
        &self.queue_dir
    }

    /// Pending (unchecked) tasks for an agent, in file order.
    ///
    /// A missing queue file yields an empty list.
    pub async fn pending(&self, agent: &str) -> Result<Vec<Task>> {
        let path = self.path_for(agent);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "queue file not found");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(Error::IoError(format!(
                    "Failed to read queue file {}: {e}",
                    path.display()
                )))
            }
        };

        Ok(parse_tasks(&content)?
            .into_iter()
            .filter(|task| !task.done)
            .collect())
    }
}

/// Parse every checkbox line from a checklist.
pub(crate) fn parse_tasks(content: &str) -> Result<Vec<Task>> {
    let pattern = Regex::new(r"(?m)^\s*- \[( |x|X)\] (.+)$")
        .map_err(|e| Error::ParseError(format!("Invalid checklist pattern: {e}")))?;

    Ok(pattern
        .captures_iter(content)
        .filter_map(|caps| {
            let mark = caps.get(1)?.as_str();
            let text = caps.get(2)?.as_str().trim();
            Some(Task {
                text: text.to_string(),
                done: !mark.eq_ignore_ascii_case(" "),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_missing_queue_yields_empty_list() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::IoError(e.to_string()))?;
        let tasks = TaskList::new(dir.path());

        let pending = tasks.pending("alpha").await?;
        assert!(pending.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_pending_skips_checked_items() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::IoError(e.to_string()))?;
        let tasks = TaskList::new(dir.path());
        tokio::fs::write(
            tasks.path_for("alpha"),
            "# Alpha queue\n\
             - [x] design the schema\n\
             - [ ] build the avionics module\n\
             - [ ] write the firmware guide\n\
             not a task line\n",
        )
        .await
        .map_err(|e| Error::IoError(e.to_string()))?;

        let pending = tasks.pending("alpha").await?;
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].text, "build the avionics module");
        Ok(())
    }

    #[tokio::test]
    async fn test_queue_file_name_is_lowercased() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::IoError(e.to_string()))?;
        let tasks = TaskList::new(dir.path());
        tokio::fs::write(tasks.path_for("alpha"), "- [ ] one thing\n")
            .await
            .map_err(|e| Error::IoError(e.to_string()))?;

        let pending = tasks.pending("ALPHA").await?;
        assert_eq!(pending.len(), 1);
        Ok(())
    }

    #[test]
    fn test_parse_handles_uppercase_check_marks() -> Result<()> {
        let parsed = parse_tasks("- [X] shouted done\n- [ ] still open\n")?;
        assert_eq!(parsed.len(), 2);
        assert!(parsed[0].done);
        assert!(!parsed[1].done);
        Ok(())
    }

    mod properties {
        use proptest::prelude::*;

        use crate::tasks::parse_tasks;

        fn task_text() -> impl Strategy<Value = String> {
            "[a-zA-Z0-9 ]{1,40}".prop_map(|s| s.trim().to_string()).prop_filter(
                "non-empty after trim",
                |s| !s.is_empty(),
            )
        }

        proptest! {
            #[test]
            fn parsed_count_matches_checkbox_lines(
                entries in prop::collection::vec((any::<bool>(), task_text()), 0..20)
            ) {
                let content: String = entries
                    .iter()
                    .map(|(done, text)| {
                        format!("- [{}] {text}\n", if *done { 'x' } else { ' ' })
                    })
                    .collect();

                let parsed = parse_tasks(&content).ok();
                prop_assert!(parsed.is_some());
                let parsed = parsed.unwrap_or_default();

                prop_assert_eq!(parsed.len(), entries.len());
                let open = entries.iter().filter(|(done, _)| !done).count();
                prop_assert_eq!(parsed.iter().filter(|t| !t.done).count(), open);
            }
        }
    }
}
