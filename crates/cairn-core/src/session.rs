//! Session bootstrap: the startup sequence every agent runs once per
//! process.
//!
//! Aggregates everything an agent needs before picking work: its capability
//! profile, messages addressed to it, peers' live leases, open help
//! requests, and its pending task queue. Store failures abort startup;
//! missing collaborator files degrade to empty lists.

use chrono::{Duration, Utc};
use serde::Serialize;

use crate::activity::{ActionKind, ActivityLog, ActivityStatus, NewActivity};
use crate::board::MessageBoard;
use crate::help::{HelpQueue, HelpRequest};
use crate::lease::{Lease, LeaseManager};
use crate::registry::{CapabilityProfile, CapabilityRegistry};
use crate::tasks::{Task, TaskList};
use crate::{Error, Result};

/// Everything a freshly started agent knows about the world.
#[derive(Debug, Clone, Serialize)]
pub struct SessionContext {
    /// Identity of this process run.
    pub session_id: String,
    /// The agent's capability and supervision profile.
    pub profile: CapabilityProfile,
    /// Board lines addressed to this agent.
    pub messages: Vec<String>,
    /// Other agents' live leases. Informational, not authoritative - the
    /// claim operation is the only arbiter.
    pub active_leases: Vec<Lease>,
    /// Open help requests addressed to this agent.
    pub help_requests: Vec<HelpRequest>,
    /// Pending tasks from the agent's queue file.
    pub tasks: Vec<Task>,
}

/// Allocate a session id: agent name, timestamp, nanosecond suffix.
pub(crate) fn allocate_session_id(agent: &str) -> Result<String> {
    let now = Utc::now();
    let nanos = now
        .timestamp_nanos_opt()
        .ok_or_else(|| Error::ParseError("Failed to get timestamp nanos".into()))?;
    Ok(format!(
        "{agent}-{}-{:x}",
        now.format("%Y%m%d-%H%M%S"),
        nanos
    ))
}

/// Run the bootstrap sequence for `agent`.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn bootstrap(
    activity: &ActivityLog,
    registry: &CapabilityRegistry,
    leases: &LeaseManager,
    help: &HelpQueue,
    board: &MessageBoard,
    tasks: &TaskList,
    agent: &str,
    help_window: Duration,
) -> Result<SessionContext> {
    let session_id = allocate_session_id(agent)?;

    activity
        .append(NewActivity::new(
            agent,
            ActionKind::Startup,
            ActivityStatus::Ready,
            &session_id,
            format!("{agent} online - session {session_id}"),
        ))
        .await?;

    let profile = registry.get_profile(agent).await?;
    if profile.needs_review {
        tracing::info!(agent, "major decisions require review before acting");
    }

    let messages = board.messages_for(agent).await?;
    let active_leases = leases.active_leases(Some(agent)).await?;
    let help_requests = help
        .unresolved_for(agent, Utc::now() - help_window)
        .await?;
    let pending_tasks = tasks.pending(agent).await?;

    tracing::info!(
        agent,
        session_id = %session_id,
        messages = messages.len(),
        peer_leases = active_leases.len(),
        help_requests = help_requests.len(),
        tasks = pending_tasks.len(),
        "session bootstrap complete"
    );

    Ok(SessionContext {
        session_id,
        profile,
        messages,
        active_leases,
        help_requests,
        tasks: pending_tasks,
    })
}
