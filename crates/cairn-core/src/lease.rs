//! Lease management: claim, heartbeat, release, staleness expiry.
//!
//! Mutual exclusion is decided by the store in a single atomic statement:
//! the lease row insert either lands (new claim, same-holder refresh, or
//! takeover of an expired lease) or is rejected by the upsert guard. There
//! is no client-side check-then-act window.
//!
//! Every transition is also appended to the activity log, so the log stays
//! a complete audit trail even though the live lease table is mutable.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::activity::{ActionDetail, ActionKind, ActivityLog, ActivityStatus, NewActivity};
use crate::db::parse_timestamp;
use crate::help::HelpQueue;
use crate::review::{ErrorKind, NewErrorReport, ReviewLog, Severity};
use crate::{Error, Result};

/// Default lease window in seconds (10 minutes). A lease with no heartbeat
/// for longer than this is reclaimable.
const DEFAULT_LEASE_WINDOW_SECS: i64 = 600;

/// Default window for the check-in help scan (1 hour).
const DEFAULT_HELP_SCAN_SECS: i64 = 3600;

/// A live lease on a resource.
#[derive(Debug, Clone, Serialize)]
pub struct Lease {
    /// The contended resource.
    pub resource: String,
    /// The agent holding the lease.
    pub holder: String,
    /// Session the lease belongs to.
    pub session_id: String,
    /// When the lease was acquired or last taken over.
    pub acquired_at: DateTime<Utc>,
    /// When the lease expires without a heartbeat.
    pub deadline: DateTime<Utc>,
    /// The holder's advisory estimate in minutes. Never feeds the deadline;
    /// kept separate so the estimate-vs-window gap stays visible.
    pub requested_minutes: i64,
}

/// Result of a claim attempt. Conflicts are expected vocabulary, not errors.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClaimOutcome {
    /// The claim landed; the caller now holds the lease.
    Granted {
        /// The acquired lease.
        lease: Lease,
    },
    /// Another agent holds a live lease.
    Conflict {
        /// Current holder.
        holder: String,
        /// When the holder's lease expires.
        deadline: DateTime<Utc>,
    },
}

impl ClaimOutcome {
    /// Whether the claim landed.
    #[must_use]
    pub const fn is_granted(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }
}

/// Current lease state of a resource.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LeaseState {
    /// No lease row exists.
    Free,
    /// A live lease exists.
    Held {
        /// Current holder.
        holder: String,
        /// When the lease expires.
        deadline: DateTime<Utc>,
    },
    /// A lease row exists but its deadline has passed; the resource is
    /// reclaimable.
    Expired {
        /// Last holder.
        holder: String,
        /// When the lease expired.
        deadline: DateTime<Utc>,
    },
}

/// Result of a heartbeat.
#[derive(Debug, Clone, Serialize)]
pub struct CheckIn {
    /// The refreshed lease deadline.
    pub deadline: DateTime<Utc>,
    /// Open help requests addressed to the caller.
    pub pending_help: u64,
}

impl CheckIn {
    /// Whether the caller should yield to a blocked peer.
    #[must_use]
    pub const fn should_pause(&self) -> bool {
        self.pending_help > 0
    }
}

/// Manages resource leases backed by `SQLite`.
#[derive(Debug, Clone)]
pub struct LeaseManager {
    db: SqlitePool,
    window: Duration,
    help_window: Duration,
    activity: ActivityLog,
    review: ReviewLog,
    help: HelpQueue,
}

impl LeaseManager {
    /// Create a new `LeaseManager` with default windows.
    #[must_use]
    pub fn new(db: SqlitePool) -> Self {
        Self::with_windows(
            db,
            Duration::seconds(DEFAULT_LEASE_WINDOW_SECS),
            Duration::seconds(DEFAULT_HELP_SCAN_SECS),
        )
    }

    /// Create a new `LeaseManager` with custom lease and help-scan windows.
    #[must_use]
    pub fn with_windows(db: SqlitePool, window: Duration, help_window: Duration) -> Self {
        let activity = ActivityLog::new(db.clone());
        let review = ReviewLog::new(db.clone());
        let help = HelpQueue::new(db.clone());
        Self {
            db,
            window,
            help_window,
            activity,
            review,
            help,
        }
    }

    /// Initialize the leases table.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS leases (
                resource TEXT PRIMARY KEY,
                holder TEXT NOT NULL,
                session_id TEXT NOT NULL,
                acquired_at TEXT NOT NULL,
                deadline TEXT NOT NULL,
                requested_minutes INTEGER NOT NULL
            )",
        )
        .execute(&self.db)
        .await
        .map_err(|e| Error::DatabaseError(format!("Failed to create leases table: {e}")))?;

        Ok(())
    }

    /// Attempt to claim a resource.
    ///
    /// `requested_minutes` is an advisory estimate recorded with the claim;
    /// the actual lease deadline is `now + lease window` regardless.
    ///
    /// A conflict is returned as a value and also recorded as an error
    /// report for supervisory review.
    pub async fn claim(
        &self,
        agent: &str,
        session_id: &str,
        resource: &str,
        requested_minutes: i64,
    ) -> Result<ClaimOutcome> {
        loop {
            let now = Utc::now();
            let deadline = now + self.window;

            // The store decides in one statement: a fresh insert, a refresh
            // by the current holder, or a takeover of an expired lease all
            // land; anything else is rejected by the WHERE guard.
            let result = sqlx::query(
                "INSERT INTO leases (resource, holder, session_id, acquired_at, deadline, requested_minutes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(resource) DO UPDATE SET
                     holder = excluded.holder,
                     session_id = excluded.session_id,
                     acquired_at = excluded.acquired_at,
                     deadline = excluded.deadline,
                     requested_minutes = excluded.requested_minutes
                 WHERE leases.holder = excluded.holder
                    OR leases.deadline < excluded.acquired_at",
            )
            .bind(resource)
            .bind(agent)
            .bind(session_id)
            .bind(now.to_rfc3339())
            .bind(deadline.to_rfc3339())
            .bind(requested_minutes)
            .execute(&self.db)
            .await
            .map_err(|e| Error::DatabaseError(format!("Failed to claim resource: {e}")))?;

            if result.rows_affected() > 0 {
                let lease = Lease {
                    resource: resource.to_string(),
                    holder: agent.to_string(),
                    session_id: session_id.to_string(),
                    acquired_at: now,
                    deadline,
                    requested_minutes,
                };

                self.activity
                    .append(
                        NewActivity::new(
                            agent,
                            ActionKind::Claim,
                            ActivityStatus::Working,
                            session_id,
                            format!("Claimed {resource} (estimate {requested_minutes} min)"),
                        )
                        .with_resource(resource)
                        .with_detail(ActionDetail::Claim { requested_minutes })
                        .with_lease_window(now, deadline),
                    )
                    .await?;

                tracing::info!(agent, resource, %deadline, "lease granted");
                return Ok(ClaimOutcome::Granted { lease });
            }

            // Rejected: read the holder for the conflict report. If the row
            // vanished between the write and this read, the holder released
            // in the meantime; take another pass.
            let existing: Option<(String, String)> =
                sqlx::query_as("SELECT holder, deadline FROM leases WHERE resource = ?1")
                    .bind(resource)
                    .fetch_optional(&self.db)
                    .await
                    .map_err(|e| Error::DatabaseError(format!("Failed to read lease: {e}")))?;

            if let Some((holder, deadline_str)) = existing {
                let holder_deadline = parse_timestamp(&deadline_str)?;
                self.review
                    .report_error(NewErrorReport {
                        agent: agent.to_string(),
                        kind: ErrorKind::Conflict,
                        message: format!(
                            "Attempted to claim {resource} but already claimed by {holder}"
                        ),
                        stack_trace: None,
                        severity: Severity::Medium,
                    })
                    .await?;

                tracing::warn!(agent, resource, holder = %holder, "claim conflict");
                return Ok(ClaimOutcome::Conflict {
                    holder,
                    deadline: holder_deadline,
                });
            }
        }
    }

    /// Heartbeat: refresh the lease deadline and report progress.
    ///
    /// Returns `NotLeaseHolder` if another agent holds the lease and
    /// `NotFound` if there is no live lease on the resource. The returned
    /// `CheckIn` carries the count of open help requests addressed to the
    /// caller; a non-zero count is the signal to yield to a blocked peer.
    pub async fn check_in(
        &self,
        agent: &str,
        session_id: &str,
        resource: &str,
        percent: u8,
        message: &str,
    ) -> Result<CheckIn> {
        let now = Utc::now();
        let new_deadline = now + self.window;

        let existing: Option<(String,)> = sqlx::query_as(
            "SELECT holder FROM leases WHERE resource = ?1 AND deadline >= ?2",
        )
        .bind(resource)
        .bind(now.to_rfc3339())
        .fetch_optional(&self.db)
        .await
        .map_err(|e| Error::DatabaseError(format!("Failed to read lease: {e}")))?;

        match existing {
            Some((holder,)) if holder == agent => {
                sqlx::query(
                    "UPDATE leases SET deadline = ?1 WHERE resource = ?2 AND holder = ?3",
                )
                .bind(new_deadline.to_rfc3339())
                .bind(resource)
                .bind(agent)
                .execute(&self.db)
                .await
                .map_err(|e| Error::DatabaseError(format!("Failed to refresh lease: {e}")))?;
            }
            Some(_) => {
                return Err(Error::NotLeaseHolder {
                    resource: resource.to_string(),
                    agent: agent.to_string(),
                })
            }
            None => {
                return Err(Error::NotFound(format!(
                    "No active lease on '{resource}'"
                )))
            }
        }

        self.activity
            .append(
                NewActivity::new(
                    agent,
                    ActionKind::Progress,
                    ActivityStatus::Working,
                    session_id,
                    message,
                )
                .with_resource(resource)
                .with_detail(ActionDetail::Progress {
                    percent: percent.min(100),
                })
                .with_lease_window(now, new_deadline),
            )
            .await?;

        let pending_help = self
            .help
            .pending_count(agent, now - self.help_window)
            .await?;

        if pending_help > 0 {
            tracing::warn!(
                agent,
                resource,
                pending_help,
                "open help requests waiting; consider pausing current work"
            );
        }

        Ok(CheckIn {
            deadline: new_deadline,
            pending_help,
        })
    }

    /// Release a resource with a terminal outcome record.
    ///
    /// Idempotent: releasing a resource that is not held (or held by
    /// someone else after expiry takeover) only appends the outcome record.
    pub async fn release(
        &self,
        agent: &str,
        session_id: &str,
        resource: &str,
        outcome_message: &str,
        summary: Option<serde_json::Value>,
    ) -> Result<()> {
        let result = sqlx::query("DELETE FROM leases WHERE resource = ?1 AND holder = ?2")
            .bind(resource)
            .bind(agent)
            .execute(&self.db)
            .await
            .map_err(|e| Error::DatabaseError(format!("Failed to release lease: {e}")))?;

        if result.rows_affected() == 0 {
            tracing::debug!(agent, resource, "release without a live lease");
        }

        let detail = summary.map_or(ActionDetail::None, |summary| ActionDetail::Outcome {
            summary,
        });

        self.activity
            .append(
                NewActivity::new(
                    agent,
                    ActionKind::Complete,
                    ActivityStatus::Done,
                    session_id,
                    outcome_message,
                )
                .with_resource(resource)
                .with_detail(detail),
            )
            .await?;

        tracing::info!(agent, resource, "lease released");
        Ok(())
    }

    /// All live (unexpired) leases, optionally excluding one agent's own.
    pub async fn active_leases(&self, exclude_agent: Option<&str>) -> Result<Vec<Lease>> {
        let now = Utc::now().to_rfc3339();
        let mut sql = String::from(
            "SELECT resource, holder, session_id, acquired_at, deadline, requested_minutes
             FROM leases WHERE deadline >= ?1",
        );
        if exclude_agent.is_some() {
            sql.push_str(" AND holder != ?2");
        }
        sql.push_str(" ORDER BY acquired_at DESC");

        let mut query = sqlx::query_as::<_, (String, String, String, String, String, i64)>(&sql)
            .bind(&now);
        if let Some(agent) = exclude_agent {
            query = query.bind(agent);
        }

        let rows = query
            .fetch_all(&self.db)
            .await
            .map_err(|e| Error::DatabaseError(format!("Failed to list leases: {e}")))?;

        rows.into_iter().map(parse_lease_row).collect()
    }

    /// Current lease state of a resource.
    pub async fn lease_state(&self, resource: &str) -> Result<LeaseState> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT holder, deadline FROM leases WHERE resource = ?1")
                .bind(resource)
                .fetch_optional(&self.db)
                .await
                .map_err(|e| Error::DatabaseError(format!("Failed to read lease: {e}")))?;

        match row {
            None => Ok(LeaseState::Free),
            Some((holder, deadline_str)) => {
                let deadline = parse_timestamp(&deadline_str)?;
                if deadline >= Utc::now() {
                    Ok(LeaseState::Held { holder, deadline })
                } else {
                    Ok(LeaseState::Expired { holder, deadline })
                }
            }
        }
    }

    /// Delete leases past their deadline, returning how many were removed.
    ///
    /// Claim already reclaims lazily; this formalizes expiry for operators
    /// who want abandoned rows gone without waiting for the next claim.
    pub async fn sweep_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM leases WHERE deadline < ?1")
            .bind(Utc::now().to_rfc3339())
            .execute(&self.db)
            .await
            .map_err(|e| Error::DatabaseError(format!("Failed to sweep leases: {e}")))?;

        let swept = result.rows_affected();
        if swept > 0 {
            tracing::info!(swept, "expired leases removed");
        }
        Ok(swept)
    }
}

fn parse_lease_row(row: (String, String, String, String, String, i64)) -> Result<Lease> {
    let (resource, holder, session_id, acquired_str, deadline_str, requested_minutes) = row;
    Ok(Lease {
        resource,
        holder,
        session_id,
        acquired_at: parse_timestamp(&acquired_str)?,
        deadline: parse_timestamp(&deadline_str)?,
        requested_minutes,
    })
}

#[cfg(test)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;
    use crate::activity::HelpPriority;

    async fn test_pool() -> Result<SqlitePool> {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))
    }

    async fn setup() -> Result<(LeaseManager, SqlitePool)> {
        let pool = test_pool().await?;
        let mgr = LeaseManager::new(pool.clone());
        mgr.init().await?;
        ActivityLog::new(pool.clone()).init().await?;
        ReviewLog::new(pool.clone()).init().await?;
        Ok((mgr, pool))
    }

    async fn setup_with_window(secs: i64) -> Result<(LeaseManager, SqlitePool)> {
        let pool = test_pool().await?;
        let mgr = LeaseManager::with_windows(
            pool.clone(),
            Duration::seconds(secs),
            Duration::seconds(DEFAULT_HELP_SCAN_SECS),
        );
        mgr.init().await?;
        ActivityLog::new(pool.clone()).init().await?;
        ReviewLog::new(pool.clone()).init().await?;
        Ok((mgr, pool))
    }

    #[tokio::test]
    async fn test_claim_free_resource_granted() -> Result<()> {
        let (mgr, _pool) = setup().await?;
        let outcome = mgr.claim("alpha", "alpha-1", "modules/avionics", 30).await?;

        assert!(outcome.is_granted());
        let state = mgr.lease_state("modules/avionics").await?;
        assert!(matches!(state, LeaseState::Held { holder, .. } if holder == "alpha"));
        Ok(())
    }

    #[tokio::test]
    async fn test_claim_held_resource_conflicts() -> Result<()> {
        let (mgr, _pool) = setup().await?;
        let _ = mgr.claim("alpha", "alpha-1", "modules/avionics", 30).await?;
        let outcome = mgr.claim("beta", "beta-1", "modules/avionics", 15).await?;

        assert!(
            matches!(outcome, ClaimOutcome::Conflict { holder, .. } if holder == "alpha")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_conflict_is_recorded_for_review() -> Result<()> {
        let (mgr, pool) = setup().await?;
        let _ = mgr.claim("alpha", "alpha-1", "modules/avionics", 30).await?;
        let _ = mgr.claim("beta", "beta-1", "modules/avionics", 15).await?;

        let errors = ReviewLog::new(pool).unresolved_errors().await?;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].agent, "beta");
        assert_eq!(errors[0].kind, ErrorKind::Conflict);
        assert!(errors[0].message.contains("alpha"));
        Ok(())
    }

    #[tokio::test]
    async fn test_reclaim_by_holder_refreshes() -> Result<()> {
        let (mgr, _pool) = setup().await?;
        let first = mgr.claim("alpha", "alpha-1", "modules/avionics", 30).await?;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let second = mgr.claim("alpha", "alpha-1", "modules/avionics", 30).await?;

        let (ClaimOutcome::Granted { lease: a }, ClaimOutcome::Granted { lease: b }) =
            (first, second)
        else {
            return Err(Error::NotFound("expected grants".into()));
        };
        assert!(b.deadline > a.deadline);
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_lease_is_reclaimable() -> Result<()> {
        let (mgr, _pool) = setup_with_window(0).await?;
        let _ = mgr.claim("alpha", "alpha-1", "modules/avionics", 30).await?;

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let outcome = mgr.claim("beta", "beta-1", "modules/avionics", 15).await?;
        assert!(outcome.is_granted());

        let state = mgr.lease_state("modules/avionics").await?;
        assert!(matches!(state, LeaseState::Expired { holder, .. } if holder == "beta"));
        Ok(())
    }

    #[tokio::test]
    async fn test_check_in_extends_deadline() -> Result<()> {
        let (mgr, _pool) = setup().await?;
        let outcome = mgr.claim("alpha", "alpha-1", "modules/avionics", 30).await?;
        let ClaimOutcome::Granted { lease } = outcome else {
            return Err(Error::NotFound("expected grant".into()));
        };

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let check_in = mgr
            .check_in("alpha", "alpha-1", "modules/avionics", 40, "halfway there")
            .await?;
        assert!(check_in.deadline > lease.deadline);
        assert!(!check_in.should_pause());
        Ok(())
    }

    #[tokio::test]
    async fn test_check_in_by_non_holder_fails() -> Result<()> {
        let (mgr, _pool) = setup().await?;
        let _ = mgr.claim("alpha", "alpha-1", "modules/avionics", 30).await?;

        let result = mgr
            .check_in("beta", "beta-1", "modules/avionics", 10, "sneaky")
            .await;
        assert!(matches!(
            result,
            Err(Error::NotLeaseHolder { agent, .. }) if agent == "beta"
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_check_in_without_lease_fails() -> Result<()> {
        let (mgr, _pool) = setup().await?;
        let result = mgr
            .check_in("alpha", "alpha-1", "modules/avionics", 10, "working")
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_check_in_surfaces_pending_help() -> Result<()> {
        let (mgr, pool) = setup().await?;
        let _ = mgr.claim("alpha", "alpha-1", "modules/avionics", 30).await?;

        HelpQueue::new(pool)
            .request("gamma", "gamma-1", "alpha", "schema ambiguity", HelpPriority::High)
            .await?;

        let check_in = mgr
            .check_in("alpha", "alpha-1", "modules/avionics", 50, "progress")
            .await?;
        assert_eq!(check_in.pending_help, 1);
        assert!(check_in.should_pause());
        Ok(())
    }

    #[tokio::test]
    async fn test_release_frees_resource() -> Result<()> {
        let (mgr, _pool) = setup().await?;
        let _ = mgr.claim("alpha", "alpha-1", "modules/avionics", 30).await?;
        mgr.release("alpha", "alpha-1", "modules/avionics", "created module", None)
            .await?;

        let outcome = mgr.claim("beta", "beta-1", "modules/avionics", 15).await?;
        assert!(outcome.is_granted());
        Ok(())
    }

    #[tokio::test]
    async fn test_release_is_idempotent() -> Result<()> {
        let (mgr, _pool) = setup().await?;
        let _ = mgr.claim("alpha", "alpha-1", "modules/avionics", 30).await?;

        mgr.release("alpha", "alpha-1", "modules/avionics", "done", None)
            .await?;
        mgr.release("alpha", "alpha-1", "modules/avionics", "done again", None)
            .await?;

        let outcome = mgr.claim("beta", "beta-1", "modules/avionics", 15).await?;
        assert!(outcome.is_granted());
        Ok(())
    }

    #[tokio::test]
    async fn test_release_does_not_steal_reclaimed_lease() -> Result<()> {
        let (mgr, _pool) = setup_with_window(0).await?;
        let _ = mgr.claim("alpha", "alpha-1", "modules/avionics", 30).await?;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        // Beta takes over the expired lease; alpha's stale release must not
        // delete beta's row.
        let _ = mgr.claim("beta", "beta-1", "modules/avionics", 15).await?;
        mgr.release("alpha", "alpha-1", "modules/avionics", "stale release", None)
            .await?;

        let state = mgr.lease_state("modules/avionics").await?;
        assert!(matches!(state, LeaseState::Expired { holder, .. } if holder == "beta"));
        Ok(())
    }

    #[tokio::test]
    async fn test_active_leases_excludes_caller_and_expired() -> Result<()> {
        let (mgr, _pool) = setup().await?;
        let _ = mgr.claim("alpha", "alpha-1", "modules/avionics", 30).await?;
        let _ = mgr.claim("beta", "beta-1", "modules/firmware", 20).await?;

        let others = mgr.active_leases(Some("alpha")).await?;
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].holder, "beta");

        let all = mgr.active_leases(None).await?;
        assert_eq!(all.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_leases() -> Result<()> {
        let (mgr, _pool) = setup_with_window(0).await?;
        let _ = mgr.claim("alpha", "alpha-1", "modules/avionics", 30).await?;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let swept = mgr.sweep_expired().await?;
        assert_eq!(swept, 1);

        let state = mgr.lease_state("modules/avionics").await?;
        assert!(matches!(state, LeaseState::Free));
        Ok(())
    }

    #[tokio::test]
    async fn test_requested_minutes_does_not_extend_deadline() -> Result<()> {
        let (mgr, _pool) = setup().await?;
        let outcome = mgr
            .claim("alpha", "alpha-1", "modules/avionics", 24 * 60)
            .await?;
        let ClaimOutcome::Granted { lease } = outcome else {
            return Err(Error::NotFound("expected grant".into()));
        };

        // A day-long estimate still gets the fixed ten-minute window.
        assert_eq!(lease.requested_minutes, 24 * 60);
        assert!(lease.deadline <= lease.acquired_at + Duration::seconds(DEFAULT_LEASE_WINDOW_SECS));
        Ok(())
    }
}
