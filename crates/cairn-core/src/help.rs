//! Help escalation queue, layered on the activity log.
//!
//! Discovery is pull-based: the target agent only learns of a request at its
//! next session bootstrap or check-in. Resolution is event-sourced - a
//! `Resolved` record referencing the request id is appended, and "still
//! open" is derived by anti-joining against those records. The original
//! `Help` row is never touched.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::activity::{
    ActionDetail, ActionKind, ActivityLog, ActivityStatus, HelpPriority, NewActivity,
};
use crate::db::parse_timestamp;
use crate::{Error, Result};

/// An open help request, as seen by the agent it is addressed to.
#[derive(Debug, Clone, Serialize)]
pub struct HelpRequest {
    /// Id of the underlying activity record.
    pub id: i64,
    /// Blocked agent asking for help.
    pub agent: String,
    /// What is needed.
    pub reason: String,
    /// Agent whose intervention is requested.
    pub help_from: String,
    /// Urgency.
    pub priority: HelpPriority,
    /// When the request was posted.
    pub created_at: DateTime<Utc>,
}

const UNRESOLVED_FILTER: &str = "h.kind = 'help'
       AND json_extract(h.detail, '$.help_from') = ?1
       AND h.created_at >= ?2
       AND NOT EXISTS (
           SELECT 1 FROM activity_log r
           WHERE r.kind = 'resolved'
             AND json_extract(r.detail, '$.request_id') = h.id
       )";

/// Help escalation queue backed by the activity log.
#[derive(Debug, Clone)]
pub struct HelpQueue {
    db: SqlitePool,
    activity: ActivityLog,
}

impl HelpQueue {
    /// Create a new queue over the given pool.
    #[must_use]
    pub fn new(db: SqlitePool) -> Self {
        let activity = ActivityLog::new(db.clone());
        Self { db, activity }
    }

    /// Post a help request, returning its record id for later resolution.
    pub async fn request(
        &self,
        from_agent: &str,
        session_id: &str,
        to_agent: &str,
        reason: &str,
        priority: HelpPriority,
    ) -> Result<i64> {
        let id = self
            .activity
            .append(
                NewActivity::new(
                    from_agent,
                    ActionKind::Help,
                    ActivityStatus::Blocked,
                    session_id,
                    reason,
                )
                .with_detail(ActionDetail::Help {
                    help_from: to_agent.to_string(),
                    priority,
                }),
            )
            .await?;

        tracing::info!(
            from = from_agent,
            to = to_agent,
            priority = priority.as_str(),
            request_id = id,
            "help requested"
        );
        Ok(id)
    }

    /// Resolve a help request by appending a `Resolved` record.
    ///
    /// Returns `NotFound` if the id does not name a help request and
    /// `AlreadyResolved` if a resolution record already exists.
    pub async fn resolve(
        &self,
        by_agent: &str,
        session_id: &str,
        request_id: i64,
        resolution: &str,
    ) -> Result<()> {
        let original = self
            .activity
            .get(request_id)
            .await?
            .filter(|record| record.kind == ActionKind::Help)
            .ok_or_else(|| Error::NotFound(format!("No help request #{request_id}")))?;

        let resolved: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM activity_log
             WHERE kind = 'resolved' AND json_extract(detail, '$.request_id') = ?1",
        )
        .bind(request_id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| Error::DatabaseError(format!("Failed to check resolution: {e}")))?;

        if resolved.is_some() {
            return Err(Error::AlreadyResolved { request_id });
        }

        self.activity
            .append(
                NewActivity::new(
                    by_agent,
                    ActionKind::Resolved,
                    ActivityStatus::Resolved,
                    session_id,
                    resolution,
                )
                .with_detail(ActionDetail::Resolution { request_id }),
            )
            .await?;

        tracing::info!(
            by = by_agent,
            for_agent = %original.agent,
            request_id,
            "help request resolved"
        );
        Ok(())
    }

    /// Open help requests addressed to `agent`, posted at or after `since`.
    pub async fn unresolved_for(
        &self,
        agent: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<HelpRequest>> {
        let sql = format!(
            "SELECT h.id, h.agent, h.message, h.detail, h.created_at
             FROM activity_log h
             WHERE {UNRESOLVED_FILTER}
             ORDER BY h.id DESC"
        );
        let rows: Vec<(i64, String, String, String, String)> = sqlx::query_as(&sql)
            .bind(agent)
            .bind(since.to_rfc3339())
            .fetch_all(&self.db)
            .await
            .map_err(|e| Error::DatabaseError(format!("Failed to list help requests: {e}")))?;

        rows.into_iter()
            .map(|(id, from_agent, reason, detail, created_at)| {
                let detail: ActionDetail = serde_json::from_str(&detail)?;
                let ActionDetail::Help {
                    help_from,
                    priority,
                } = detail
                else {
                    return Err(Error::ParseError(format!(
                        "Record #{id} is not a help request"
                    )));
                };
                Ok(HelpRequest {
                    id,
                    agent: from_agent,
                    reason,
                    help_from,
                    priority,
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }

    /// Number of open help requests addressed to `agent` since `since`.
    pub async fn pending_count(&self, agent: &str, since: DateTime<Utc>) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM activity_log h
             WHERE {UNRESOLVED_FILTER}"
        );
        let (count,): (i64,) = sqlx::query_as(&sql)
            .bind(agent)
            .bind(since.to_rfc3339())
            .fetch_one(&self.db)
            .await
            .map_err(|e| Error::DatabaseError(format!("Failed to count help requests: {e}")))?;

        Ok(u64::try_from(count).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;

    async fn setup() -> Result<(HelpQueue, ActivityLog)> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;
        let queue = HelpQueue::new(pool.clone());
        let log = ActivityLog::new(pool);
        log.init().await?;
        Ok((queue, log))
    }

    fn day_ago() -> DateTime<Utc> {
        Utc::now() - chrono::Duration::hours(24)
    }

    #[tokio::test]
    async fn test_request_surfaces_for_target_agent() -> Result<()> {
        let (queue, _log) = setup().await?;
        let id = queue
            .request("gamma", "gamma-1", "alpha", "schema ambiguity", HelpPriority::High)
            .await?;

        let open = queue.unresolved_for("alpha", day_ago()).await?;
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, id);
        assert_eq!(open[0].agent, "gamma");
        assert_eq!(open[0].priority, HelpPriority::High);
        Ok(())
    }

    #[tokio::test]
    async fn test_request_not_visible_to_other_agents() -> Result<()> {
        let (queue, _log) = setup().await?;
        queue
            .request("gamma", "gamma-1", "alpha", "schema ambiguity", HelpPriority::Medium)
            .await?;

        let open = queue.unresolved_for("beta", day_ago()).await?;
        assert!(open.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_closes_request() -> Result<()> {
        let (queue, _log) = setup().await?;
        let id = queue
            .request("gamma", "gamma-1", "alpha", "schema ambiguity", HelpPriority::High)
            .await?;

        queue
            .resolve("alpha", "alpha-1", id, "clarified column name")
            .await?;

        let open = queue.unresolved_for("alpha", day_ago()).await?;
        assert!(open.is_empty());
        assert_eq!(queue.pending_count("alpha", day_ago()).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_twice_is_rejected() -> Result<()> {
        let (queue, _log) = setup().await?;
        let id = queue
            .request("gamma", "gamma-1", "alpha", "schema ambiguity", HelpPriority::Low)
            .await?;

        queue.resolve("alpha", "alpha-1", id, "done").await?;
        let result = queue.resolve("alpha", "alpha-1", id, "done again").await;

        assert!(matches!(
            result,
            Err(Error::AlreadyResolved { request_id }) if request_id == id
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_unknown_id_is_not_found() -> Result<()> {
        let (queue, _log) = setup().await?;
        let result = queue.resolve("alpha", "alpha-1", 999, "nothing there").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_non_help_record_is_not_found() -> Result<()> {
        let (queue, log) = setup().await?;
        let startup_id = log
            .append(NewActivity::new(
                "alpha",
                ActionKind::Startup,
                ActivityStatus::Ready,
                "alpha-1",
                "alpha online",
            ))
            .await?;

        let result = queue.resolve("alpha", "alpha-1", startup_id, "bogus").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_window_excludes_stale_requests() -> Result<()> {
        let (queue, _log) = setup().await?;
        queue
            .request("gamma", "gamma-1", "alpha", "old request", HelpPriority::Low)
            .await?;

        let future = Utc::now() + chrono::Duration::hours(1);
        let open = queue.unresolved_for("alpha", future).await?;
        assert!(open.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_pending_count_tracks_open_requests() -> Result<()> {
        let (queue, _log) = setup().await?;
        let first = queue
            .request("gamma", "gamma-1", "alpha", "first", HelpPriority::Medium)
            .await?;
        queue
            .request("beta", "beta-1", "alpha", "second", HelpPriority::Medium)
            .await?;

        assert_eq!(queue.pending_count("alpha", day_ago()).await?, 2);

        queue.resolve("alpha", "alpha-1", first, "handled").await?;
        assert_eq!(queue.pending_count("alpha", day_ago()).await?, 1);
        Ok(())
    }
}
