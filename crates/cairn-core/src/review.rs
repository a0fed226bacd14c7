//! Supervisory review data: agent-reported errors and technical decisions.
//!
//! Both are data for later human review, not exceptions. Claim conflicts
//! land here too, so the supervisor sees contention patterns without any
//! agent having failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::parse_timestamp;
use crate::{Error, Result};

/// Category of an agent-reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Lost a claim race or found a resource held
    Conflict,
    /// Blocked on another agent's unfinished work
    Dependency,
    /// The agent's own tooling or output failed
    CodeError,
    /// An external operation did not finish in time
    Timeout,
}

impl ErrorKind {
    /// Stable string form used in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Conflict => "conflict",
            Self::Dependency => "dependency",
            Self::CodeError => "code_error",
            Self::Timeout => "timeout",
        }
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "conflict" => Ok(Self::Conflict),
            "dependency" => Ok(Self::Dependency),
            "code_error" => Ok(Self::CodeError),
            "timeout" => Ok(Self::Timeout),
            other => Err(Error::ParseError(format!("Unknown error kind: {other}"))),
        }
    }
}

/// Severity of an agent-reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational
    Low,
    /// Default
    Medium,
    /// Needs attention this session
    High,
    /// Work cannot continue
    Critical,
}

impl Severity {
    /// Stable string form used in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(Error::ParseError(format!("Unknown severity: {other}"))),
        }
    }
}

/// Whether a reported error has been dealt with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    /// Awaiting review
    Unresolved,
    /// Reviewed and closed
    Resolved,
}

impl ResolutionStatus {
    /// Stable string form used in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unresolved => "unresolved",
            Self::Resolved => "resolved",
        }
    }
}

impl std::str::FromStr for ResolutionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unresolved" => Ok(Self::Unresolved),
            "resolved" => Ok(Self::Resolved),
            other => Err(Error::ParseError(format!(
                "Unknown resolution status: {other}"
            ))),
        }
    }
}

/// Blast radius of a technical decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionImpact {
    /// Local, easily reversed
    Low,
    /// Default
    Medium,
    /// Shapes other agents' work
    High,
}

impl DecisionImpact {
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

impl std::str::FromStr for DecisionImpact {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(Error::ParseError(format!(
                "Unknown decision impact: {other}"
            ))),
        }
    }
}

/// Review state of a technical decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    /// Awaiting out-of-band review
    Proposed,
    /// Approved
    Approved,
    /// Rejected
    Rejected,
}

impl DecisionStatus {
    /// Stable string form used in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for DecisionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "proposed" => Ok(Self::Proposed),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(Error::ParseError(format!(
                "Unknown decision status: {other}"
            ))),
        }
    }
}

/// A persisted agent-reported error.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    /// Store-assigned id.
    pub id: i64,
    /// Reporting agent.
    pub agent: String,
    /// Error category.
    pub kind: ErrorKind,
    /// What happened.
    pub message: String,
    /// Optional captured backtrace.
    pub stack_trace: Option<String>,
    /// How bad it is.
    pub severity: Severity,
    /// Review state.
    pub resolution: ResolutionStatus,
    /// Append time.
    pub created_at: DateTime<Utc>,
}

/// An error report about to be appended.
#[derive(Debug, Clone)]
pub struct NewErrorReport {
    /// Reporting agent.
    pub agent: String,
    /// Error category.
    pub kind: ErrorKind,
    /// What happened.
    pub message: String,
    /// Optional captured backtrace.
    pub stack_trace: Option<String>,
    /// How bad it is.
    pub severity: Severity,
}

/// A persisted technical decision.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    /// Store-assigned id.
    pub id: i64,
    /// Deciding agent.
    pub agent: String,
    /// Decision category (architecture, api_design, data_model, ...).
    pub kind: String,
    /// The decision made.
    pub decision: String,
    /// Why.
    pub rationale: String,
    /// Alternatives considered, if recorded.
    pub alternatives: Option<String>,
    /// Blast radius.
    pub impact: DecisionImpact,
    /// Review state.
    pub status: DecisionStatus,
    /// Append time.
    pub created_at: DateTime<Utc>,
}

/// A decision about to be recorded. Always enters as `Proposed`.
#[derive(Debug, Clone)]
pub struct NewDecision {
    /// Deciding agent.
    pub agent: String,
    /// Decision category.
    pub kind: String,
    /// The decision made.
    pub decision: String,
    /// Why.
    pub rationale: String,
    /// Alternatives considered.
    pub alternatives: Option<String>,
    /// Blast radius.
    pub impact: DecisionImpact,
}

/// Review log backed by `SQLite`.
#[derive(Debug, Clone)]
pub struct ReviewLog {
    db: SqlitePool,
}

impl ReviewLog {
    /// Create a new review log over the given pool.
    #[must_use]
    pub const fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Initialize the error and decision tables.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS error_reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                agent TEXT NOT NULL,
                kind TEXT NOT NULL,
                message TEXT NOT NULL,
                stack_trace TEXT,
                severity TEXT NOT NULL,
                resolution TEXT NOT NULL DEFAULT 'unresolved',
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.db)
        .await
        .map_err(|e| Error::DatabaseError(format!("Failed to create error_reports: {e}")))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS technical_decisions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                agent TEXT NOT NULL,
                kind TEXT NOT NULL,
                decision TEXT NOT NULL,
                rationale TEXT NOT NULL,
                alternatives TEXT,
                impact TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'proposed',
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.db)
        .await
        .map_err(|e| Error::DatabaseError(format!("Failed to create technical_decisions: {e}")))?;

        Ok(())
    }

    /// Append an error report, returning its id.
    pub async fn report_error(&self, report: NewErrorReport) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO error_reports (agent, kind, message, stack_trace, severity, resolution, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'unresolved', ?6)",
        )
        .bind(&report.agent)
        .bind(report.kind.as_str())
        .bind(&report.message)
        .bind(&report.stack_trace)
        .bind(report.severity.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await
        .map_err(|e| Error::DatabaseError(format!("Failed to report error: {e}")))?;

        tracing::warn!(
            agent = %report.agent,
            kind = report.kind.as_str(),
            severity = report.severity.as_str(),
            "error reported: {}",
            report.message
        );
        Ok(result.last_insert_rowid())
    }

    /// Record a technical decision as proposed, returning its id.
    pub async fn record_decision(&self, decision: NewDecision) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO technical_decisions (agent, kind, decision, rationale, alternatives, impact, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'proposed', ?7)",
        )
        .bind(&decision.agent)
        .bind(&decision.kind)
        .bind(&decision.decision)
        .bind(&decision.rationale)
        .bind(&decision.alternatives)
        .bind(decision.impact.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await
        .map_err(|e| Error::DatabaseError(format!("Failed to record decision: {e}")))?;

        Ok(result.last_insert_rowid())
    }

    /// All error reports still awaiting review, newest first.
    pub async fn unresolved_errors(&self) -> Result<Vec<ErrorReport>> {
        let rows: Vec<(i64, String, String, String, Option<String>, String, String, String)> =
            sqlx::query_as(
                "SELECT id, agent, kind, message, stack_trace, severity, resolution, created_at
                 FROM error_reports WHERE resolution = 'unresolved' ORDER BY id DESC",
            )
            .fetch_all(&self.db)
            .await
            .map_err(|e| Error::DatabaseError(format!("Failed to list errors: {e}")))?;

        rows.into_iter()
            .map(
                |(id, agent, kind, message, stack_trace, severity, resolution, created_at)| {
                    Ok(ErrorReport {
                        id,
                        agent,
                        kind: kind.parse()?,
                        message,
                        stack_trace,
                        severity: severity.parse()?,
                        resolution: resolution.parse()?,
                        created_at: parse_timestamp(&created_at)?,
                    })
                },
            )
            .collect()
    }

    /// All decisions still awaiting review, newest first.
    pub async fn proposed_decisions(&self) -> Result<Vec<Decision>> {
        let rows: Vec<(i64, String, String, String, String, Option<String>, String, String, String)> =
            sqlx::query_as(
                "SELECT id, agent, kind, decision, rationale, alternatives, impact, status, created_at
                 FROM technical_decisions WHERE status = 'proposed' ORDER BY id DESC",
            )
            .fetch_all(&self.db)
            .await
            .map_err(|e| Error::DatabaseError(format!("Failed to list decisions: {e}")))?;

        rows.into_iter()
            .map(
                |(id, agent, kind, decision, rationale, alternatives, impact, status, created_at)| {
                    Ok(Decision {
                        id,
                        agent,
                        kind,
                        decision,
                        rationale,
                        alternatives,
                        impact: impact.parse()?,
                        status: status.parse()?,
                        created_at: parse_timestamp(&created_at)?,
                    })
                },
            )
            .collect()
    }
}
