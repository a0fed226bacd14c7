//! The per-process entry point to the coordination core.
//!
//! One `CoordinationClient` is constructed per process run and owns the
//! store handle; consumers never touch the store directly and nothing here
//! is global.

use sqlx::SqlitePool;

use crate::activity::{ActivityFilter, ActivityLog, ActivityRecord, HelpPriority};
use crate::board::{MessageBoard, SessionSummary};
use crate::config::Config;
use crate::db;
use crate::help::{HelpQueue, HelpRequest};
use crate::lease::{CheckIn, ClaimOutcome, Lease, LeaseManager, LeaseState};
use crate::registry::{CapabilityProfile, CapabilityRegistry};
use crate::review::{NewDecision, NewErrorReport, ReviewLog};
use crate::session::{self, SessionContext};
use crate::tasks::TaskList;
use crate::Result;

/// Coordination client: one per process, owning the store handle.
#[derive(Debug, Clone)]
pub struct CoordinationClient {
    config: Config,
    activity: ActivityLog,
    registry: CapabilityRegistry,
    leases: LeaseManager,
    help: HelpQueue,
    review: ReviewLog,
    board: MessageBoard,
    tasks: TaskList,
}

impl CoordinationClient {
    /// Open (or create) the configured database and initialize the schema.
    pub async fn connect(config: Config) -> Result<Self> {
        config.validate()?;
        let pool = db::create_pool(&config.database_path).await?;
        Self::with_pool(config, pool).await
    }

    /// Build a client over an existing pool. Used by tests and embedders
    /// that manage their own connection.
    pub async fn with_pool(config: Config, pool: SqlitePool) -> Result<Self> {
        let activity = ActivityLog::new(pool.clone());
        activity.init().await?;

        let registry = CapabilityRegistry::new(pool.clone());
        registry.init().await?;

        let leases = LeaseManager::with_windows(
            pool.clone(),
            config.lease_window(),
            config.help_scan_window(),
        );
        leases.init().await?;

        let review = ReviewLog::new(pool.clone());
        review.init().await?;

        let help = HelpQueue::new(pool);
        let board = MessageBoard::new(&config.board_path);
        let tasks = TaskList::new(&config.queue_dir);

        Ok(Self {
            config,
            activity,
            registry,
            leases,
            help,
            review,
            board,
            tasks,
        })
    }

    /// Run the startup sequence for an agent.
    pub async fn bootstrap_session(&self, agent: &str) -> Result<SessionContext> {
        session::bootstrap(
            &self.activity,
            &self.registry,
            &self.leases,
            &self.help,
            &self.board,
            &self.tasks,
            agent,
            self.config.help_window(),
        )
        .await
    }

    /// Attempt to claim a resource before working on it.
    pub async fn claim(
        &self,
        agent: &str,
        session_id: &str,
        resource: &str,
        requested_minutes: i64,
    ) -> Result<ClaimOutcome> {
        self.leases
            .claim(agent, session_id, resource, requested_minutes)
            .await
    }

    /// Heartbeat while working on a resource.
    pub async fn check_in(
        &self,
        agent: &str,
        session_id: &str,
        resource: &str,
        percent: u8,
        message: &str,
    ) -> Result<CheckIn> {
        self.leases
            .check_in(agent, session_id, resource, percent, message)
            .await
    }

    /// Release a resource with an outcome record.
    pub async fn release(
        &self,
        agent: &str,
        session_id: &str,
        resource: &str,
        outcome_message: &str,
        summary: Option<serde_json::Value>,
    ) -> Result<()> {
        self.leases
            .release(agent, session_id, resource, outcome_message, summary)
            .await
    }

    /// Post a help request to a peer.
    pub async fn request_help(
        &self,
        from_agent: &str,
        session_id: &str,
        to_agent: &str,
        reason: &str,
        priority: HelpPriority,
    ) -> Result<i64> {
        self.help
            .request(from_agent, session_id, to_agent, reason, priority)
            .await
    }

    /// Resolve a peer's help request.
    pub async fn resolve_help(
        &self,
        by_agent: &str,
        session_id: &str,
        request_id: i64,
        resolution: &str,
    ) -> Result<()> {
        self.help
            .resolve(by_agent, session_id, request_id, resolution)
            .await
    }

    /// Open help requests addressed to an agent.
    pub async fn pending_help(&self, agent: &str) -> Result<Vec<HelpRequest>> {
        self.help
            .unresolved_for(agent, chrono::Utc::now() - self.config.help_window())
            .await
    }

    /// Report an error for supervisory review.
    pub async fn report_error(&self, report: NewErrorReport) -> Result<i64> {
        self.review.report_error(report).await
    }

    /// Record a technical decision as proposed.
    pub async fn record_decision(&self, decision: NewDecision) -> Result<i64> {
        self.review.record_decision(decision).await
    }

    /// Append an end-of-session summary to the message board.
    pub async fn write_summary(&self, summary: &SessionSummary) -> Result<()> {
        self.board.append_summary(summary).await
    }

    /// Query the activity log.
    pub async fn activity_log(&self, filter: &ActivityFilter) -> Result<Vec<ActivityRecord>> {
        self.activity.query(filter).await
    }

    /// All live leases.
    pub async fn active_leases(&self) -> Result<Vec<Lease>> {
        self.leases.active_leases(None).await
    }

    /// Current lease state of a resource.
    pub async fn lease_state(&self, resource: &str) -> Result<LeaseState> {
        self.leases.lease_state(resource).await
    }

    /// Remove leases past their deadline.
    pub async fn sweep_expired(&self) -> Result<u64> {
        self.leases.sweep_expired().await
    }

    /// An agent's capability profile.
    pub async fn profile(&self, agent: &str) -> Result<CapabilityProfile> {
        self.registry.get_profile(agent).await
    }

    /// Administrative profile upsert.
    pub async fn set_profile(&self, profile: &CapabilityProfile) -> Result<()> {
        self.registry.set_profile(profile).await
    }

    /// The supervisory review log.
    #[must_use]
    pub const fn review(&self) -> &ReviewLog {
        &self.review
    }

    /// The client configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }
}
