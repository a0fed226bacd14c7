//! Append-only activity log, the single source of truth for coordination.
//!
//! Records are created once and never mutated. Everything the other
//! components know - who holds what, who is blocked on whom, which help
//! requests are still open - is derived by querying this log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::parse_timestamp;
use crate::{Error, Result};

/// What an activity record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Agent came online and announced a new session
    Startup,
    /// Agent took a lease on a resource
    Claim,
    /// Heartbeat while working on a resource
    Progress,
    /// Terminal record for a resource or a resolved request
    Complete,
    /// Agent is blocked and asking a peer for intervention
    Help,
    /// Resolution of an earlier help request
    Resolved,
}

impl ActionKind {
    /// Stable string form used in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Claim => "claim",
            Self::Progress => "progress",
            Self::Complete => "complete",
            Self::Help => "help",
            Self::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "startup" => Ok(Self::Startup),
            "claim" => Ok(Self::Claim),
            "progress" => Ok(Self::Progress),
            "complete" => Ok(Self::Complete),
            "help" => Ok(Self::Help),
            "resolved" => Ok(Self::Resolved),
            other => Err(Error::ParseError(format!("Unknown action kind: {other}"))),
        }
    }
}

/// Status carried by an activity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    /// Online, not yet working
    Ready,
    /// Actively holding a lease
    Working,
    /// Terminal
    Done,
    /// Blocked, waiting for a peer
    Blocked,
    /// Waiting on an external event
    Waiting,
    /// Help request has been answered
    Resolved,
}

impl ActivityStatus {
    /// Stable string form used in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Working => "working",
            Self::Done => "done",
            Self::Blocked => "blocked",
            Self::Waiting => "waiting",
            Self::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ActivityStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ready" => Ok(Self::Ready),
            "working" => Ok(Self::Working),
            "done" => Ok(Self::Done),
            "blocked" => Ok(Self::Blocked),
            "waiting" => Ok(Self::Waiting),
            "resolved" => Ok(Self::Resolved),
            other => Err(Error::ParseError(format!("Unknown status: {other}"))),
        }
    }
}

/// Priority attached to a help request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HelpPriority {
    /// Can wait for the peer's next session
    Low,
    /// Default
    Medium,
    /// Peer should pause current work
    High,
}

impl HelpPriority {
    /// Stable string form used in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for HelpPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for HelpPriority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(Error::ParseError(format!("Unknown priority: {other}"))),
        }
    }
}

/// Typed per-kind payload, serialized as tagged JSON into a single column.
///
/// Each action kind's required fields are statically known instead of living
/// in an open string-keyed map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionDetail {
    /// No payload
    None,
    /// Advisory estimate attached to a claim. Does NOT feed the lease
    /// deadline; the actual window is fixed by configuration.
    Claim {
        /// Requested working time in minutes.
        requested_minutes: i64,
    },
    /// Heartbeat payload
    Progress {
        /// Progress percentage (0-100).
        percent: u8,
    },
    /// Help request payload
    Help {
        /// Agent whose intervention is requested.
        help_from: String,
        /// Urgency of the request.
        priority: HelpPriority,
    },
    /// Resolution payload, referencing the original help request
    Resolution {
        /// Id of the resolved help request.
        request_id: i64,
    },
    /// Free-form outcome attached to a release
    Outcome {
        /// Caller-supplied result summary.
        summary: serde_json::Value,
    },
}

/// A persisted activity record.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityRecord {
    /// Store-assigned monotonically increasing id.
    pub id: i64,
    /// Originating process identity.
    pub agent: String,
    /// What this record describes.
    pub kind: ActionKind,
    /// Contended unit of work, if any.
    pub resource: Option<String>,
    /// Status at append time.
    pub status: ActivityStatus,
    /// Groups all records from one process run.
    pub session_id: String,
    /// Human-readable note.
    pub message: String,
    /// Typed per-kind payload.
    pub detail: ActionDetail,
    /// Lease validity lower bound, if this record carries one.
    pub check_in_time: Option<DateTime<Utc>>,
    /// Lease validity upper bound, if this record carries one.
    pub deadline: Option<DateTime<Utc>>,
    /// Append time.
    pub created_at: DateTime<Utc>,
}

/// A record about to be appended.
#[derive(Debug, Clone)]
pub struct NewActivity {
    /// Originating process identity.
    pub agent: String,
    /// What this record describes.
    pub kind: ActionKind,
    /// Contended unit of work, if any.
    pub resource: Option<String>,
    /// Status at append time.
    pub status: ActivityStatus,
    /// Groups all records from one process run.
    pub session_id: String,
    /// Human-readable note.
    pub message: String,
    /// Typed per-kind payload.
    pub detail: ActionDetail,
    /// Lease validity lower bound, if this record carries one.
    pub check_in_time: Option<DateTime<Utc>>,
    /// Lease validity upper bound, if this record carries one.
    pub deadline: Option<DateTime<Utc>>,
}

impl NewActivity {
    /// Create a new record with no resource and no payload.
    #[must_use]
    pub fn new(
        agent: impl Into<String>,
        kind: ActionKind,
        status: ActivityStatus,
        session_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            agent: agent.into(),
            kind,
            resource: None,
            status,
            session_id: session_id.into(),
            message: message.into(),
            detail: ActionDetail::None,
            check_in_time: None,
            deadline: None,
        }
    }

    /// Set the contended resource.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Set the typed payload.
    #[must_use]
    pub fn with_detail(mut self, detail: ActionDetail) -> Self {
        self.detail = detail;
        self
    }

    /// Set the lease validity bounds.
    #[must_use]
    pub const fn with_lease_window(
        mut self,
        check_in_time: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Self {
        self.check_in_time = Some(check_in_time);
        self.deadline = Some(deadline);
        self
    }
}

/// Filter for querying the log. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    /// Restrict to one agent.
    pub agent: Option<String>,
    /// Restrict to one resource.
    pub resource: Option<String>,
    /// Restrict to one action kind.
    pub kind: Option<ActionKind>,
    /// Restrict to one status.
    pub status: Option<ActivityStatus>,
    /// Only records created at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Cap the number of returned records.
    pub limit: Option<u32>,
}

impl ActivityFilter {
    /// Create an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one agent.
    #[must_use]
    pub fn agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    /// Restrict to one resource.
    #[must_use]
    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Restrict to one action kind.
    #[must_use]
    pub const fn kind(mut self, kind: ActionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Restrict to one status.
    #[must_use]
    pub const fn status(mut self, status: ActivityStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Only records created at or after this instant.
    #[must_use]
    pub const fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Cap the number of returned records.
    #[must_use]
    pub const fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

type ActivityRow = (
    i64,
    String,
    String,
    Option<String>,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
);

const SELECT_COLUMNS: &str = "SELECT id, agent, kind, resource, status, session_id, message, \
     detail, check_in_time, deadline, created_at FROM activity_log";

/// Append-only activity log backed by `SQLite`.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    db: SqlitePool,
}

impl ActivityLog {
    /// Create a new log over the given pool.
    #[must_use]
    pub const fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Initialize the activity log table.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS activity_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                agent TEXT NOT NULL,
                kind TEXT NOT NULL,
                resource TEXT,
                status TEXT NOT NULL,
                session_id TEXT NOT NULL,
                message TEXT NOT NULL,
                detail TEXT NOT NULL,
                check_in_time TEXT,
                deadline TEXT,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.db)
        .await
        .map_err(|e| Error::DatabaseError(format!("Failed to create activity_log: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_activity_resource ON activity_log(resource)")
            .execute(&self.db)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_activity_agent ON activity_log(agent)")
            .execute(&self.db)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_activity_kind ON activity_log(kind)")
            .execute(&self.db)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        Ok(())
    }

    /// Append a record, returning its store-assigned id.
    pub async fn append(&self, record: NewActivity) -> Result<i64> {
        let detail = serde_json::to_string(&record.detail)?;
        let result = sqlx::query(
            "INSERT INTO activity_log (
                agent, kind, resource, status, session_id, message,
                detail, check_in_time, deadline, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&record.agent)
        .bind(record.kind.as_str())
        .bind(&record.resource)
        .bind(record.status.as_str())
        .bind(&record.session_id)
        .bind(&record.message)
        .bind(&detail)
        .bind(record.check_in_time.map(|t| t.to_rfc3339()))
        .bind(record.deadline.map(|t| t.to_rfc3339()))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await
        .map_err(|e| Error::DatabaseError(format!("Failed to append activity: {e}")))?;

        Ok(result.last_insert_rowid())
    }

    /// Query records matching a filter, newest first.
    pub async fn query(&self, filter: &ActivityFilter) -> Result<Vec<ActivityRecord>> {
        let mut sql = String::from(SELECT_COLUMNS);
        sql.push_str(" WHERE 1=1");
        if filter.agent.is_some() {
            sql.push_str(" AND agent = ?");
        }
        if filter.resource.is_some() {
            sql.push_str(" AND resource = ?");
        }
        if filter.kind.is_some() {
            sql.push_str(" AND kind = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.since.is_some() {
            sql.push_str(" AND created_at >= ?");
        }
        sql.push_str(" ORDER BY id DESC");
        if filter.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query_as::<_, ActivityRow>(&sql);
        if let Some(agent) = &filter.agent {
            query = query.bind(agent);
        }
        if let Some(resource) = &filter.resource {
            query = query.bind(resource);
        }
        if let Some(kind) = filter.kind {
            query = query.bind(kind.as_str());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(since) = filter.since {
            query = query.bind(since.to_rfc3339());
        }
        if let Some(limit) = filter.limit {
            query = query.bind(i64::from(limit));
        }

        let rows = query
            .fetch_all(&self.db)
            .await
            .map_err(|e| Error::DatabaseError(format!("Failed to query activity: {e}")))?;

        rows.into_iter().map(parse_row).collect()
    }

    /// Fetch a single record by id.
    pub async fn get(&self, id: i64) -> Result<Option<ActivityRecord>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        let row = sqlx::query_as::<_, ActivityRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| Error::DatabaseError(format!("Failed to fetch activity: {e}")))?;

        row.map(parse_row).transpose()
    }
}

fn parse_row(row: ActivityRow) -> Result<ActivityRecord> {
    let (
        id,
        agent,
        kind,
        resource,
        status,
        session_id,
        message,
        detail,
        check_in_time,
        deadline,
        created_at,
    ) = row;

    Ok(ActivityRecord {
        id,
        agent,
        kind: kind.parse()?,
        resource,
        status: status.parse()?,
        session_id,
        message,
        detail: serde_json::from_str(&detail)?,
        check_in_time: check_in_time.as_deref().map(parse_timestamp).transpose()?,
        deadline: deadline.as_deref().map(parse_timestamp).transpose()?,
        created_at: parse_timestamp(&created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;

    async fn setup() -> Result<ActivityLog> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;
        let log = ActivityLog::new(pool);
        log.init().await?;
        Ok(log)
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_ids() -> Result<()> {
        let log = setup().await?;
        let first = log
            .append(NewActivity::new(
                "alpha",
                ActionKind::Startup,
                ActivityStatus::Ready,
                "alpha-1",
                "alpha online",
            ))
            .await?;
        let second = log
            .append(NewActivity::new(
                "beta",
                ActionKind::Startup,
                ActivityStatus::Ready,
                "beta-1",
                "beta online",
            ))
            .await?;
        assert!(second > first);
        Ok(())
    }

    #[tokio::test]
    async fn test_query_newest_first() -> Result<()> {
        let log = setup().await?;
        for n in 0..3 {
            log.append(NewActivity::new(
                "alpha",
                ActionKind::Progress,
                ActivityStatus::Working,
                "alpha-1",
                format!("step {n}"),
            ))
            .await?;
        }

        let records = log.query(&ActivityFilter::new()).await?;
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].message, "step 2");
        assert_eq!(records[2].message, "step 0");
        Ok(())
    }

    #[tokio::test]
    async fn test_filter_by_agent_kind_and_resource() -> Result<()> {
        let log = setup().await?;
        log.append(
            NewActivity::new(
                "alpha",
                ActionKind::Claim,
                ActivityStatus::Working,
                "alpha-1",
                "claimed",
            )
            .with_resource("modules/avionics"),
        )
        .await?;
        log.append(NewActivity::new(
            "beta",
            ActionKind::Startup,
            ActivityStatus::Ready,
            "beta-1",
            "online",
        ))
        .await?;

        let claims = log
            .query(
                &ActivityFilter::new()
                    .agent("alpha")
                    .kind(ActionKind::Claim)
                    .resource("modules/avionics"),
            )
            .await?;
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].agent, "alpha");

        let none = log
            .query(&ActivityFilter::new().agent("beta").kind(ActionKind::Claim))
            .await?;
        assert!(none.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_detail_survives_storage() -> Result<()> {
        let log = setup().await?;
        let id = log
            .append(
                NewActivity::new(
                    "gamma",
                    ActionKind::Help,
                    ActivityStatus::Blocked,
                    "gamma-1",
                    "schema ambiguity",
                )
                .with_detail(ActionDetail::Help {
                    help_from: "alpha".into(),
                    priority: HelpPriority::High,
                }),
            )
            .await?;

        let record = log
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound("record".into()))?;
        assert_eq!(
            record.detail,
            ActionDetail::Help {
                help_from: "alpha".into(),
                priority: HelpPriority::High,
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_since_window_excludes_old_records() -> Result<()> {
        let log = setup().await?;
        log.append(NewActivity::new(
            "alpha",
            ActionKind::Startup,
            ActivityStatus::Ready,
            "alpha-1",
            "online",
        ))
        .await?;

        let future = Utc::now() + chrono::Duration::hours(1);
        let records = log.query(&ActivityFilter::new().since(future)).await?;
        assert!(records.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_limit_caps_results() -> Result<()> {
        let log = setup().await?;
        for n in 0..5 {
            log.append(NewActivity::new(
                "alpha",
                ActionKind::Progress,
                ActivityStatus::Working,
                "alpha-1",
                format!("step {n}"),
            ))
            .await?;
        }

        let records = log.query(&ActivityFilter::new().limit(2)).await?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message, "step 4");
        Ok(())
    }
}
