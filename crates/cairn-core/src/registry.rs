//! Capability registry: per-agent policy data.
//!
//! Profiles are written administratively and read once per session. They
//! inform operational conventions (an agent with `needs_review` records
//! decisions as proposals) but never gate coordination operations.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{Error, Result};

/// How autonomous an agent is allowed to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityLevel {
    /// Narrow, well-bounded tasks only
    Limited,
    /// Default
    Standard,
    /// Trusted with broad changes
    Advanced,
}

impl CapabilityLevel {
    /// Stable string form used in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Limited => "limited",
            Self::Standard => "standard",
            Self::Advanced => "advanced",
        }
    }
}

impl std::fmt::Display for CapabilityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CapabilityLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "limited" => Ok(Self::Limited),
            "standard" => Ok(Self::Standard),
            "advanced" => Ok(Self::Advanced),
            other => Err(Error::ParseError(format!(
                "Unknown capability level: {other}"
            ))),
        }
    }
}

/// How closely an agent's output is watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisionLevel {
    /// Spot checks
    Low,
    /// Default
    Normal,
    /// Every session reviewed
    High,
}

impl SupervisionLevel {
    /// Stable string form used in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for SupervisionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SupervisionLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            other => Err(Error::ParseError(format!(
                "Unknown supervision level: {other}"
            ))),
        }
    }
}

/// Per-agent capability and supervision profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityProfile {
    /// Agent identity this profile belongs to.
    pub agent: String,
    /// Autonomy level.
    pub capability: CapabilityLevel,
    /// Oversight level.
    pub supervision: SupervisionLevel,
    /// Whether major decisions require out-of-band approval.
    pub needs_review: bool,
}

impl CapabilityProfile {
    /// The profile assumed for agents with no registered entry.
    #[must_use]
    pub fn default_for(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            capability: CapabilityLevel::Standard,
            supervision: SupervisionLevel::Normal,
            needs_review: false,
        }
    }
}

/// Capability registry backed by `SQLite`.
#[derive(Debug, Clone)]
pub struct CapabilityRegistry {
    db: SqlitePool,
}

impl CapabilityRegistry {
    /// Create a new registry over the given pool.
    #[must_use]
    pub const fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Initialize the capabilities table.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS agent_capabilities (
                agent TEXT PRIMARY KEY,
                capability TEXT NOT NULL,
                supervision TEXT NOT NULL,
                needs_review INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.db)
        .await
        .map_err(|e| Error::DatabaseError(format!("Failed to create agent_capabilities: {e}")))?;

        Ok(())
    }

    /// Get an agent's profile, defaulting to standard/normal when absent.
    pub async fn get_profile(&self, agent: &str) -> Result<CapabilityProfile> {
        let row: Option<(String, String, bool)> = sqlx::query_as(
            "SELECT capability, supervision, needs_review
             FROM agent_capabilities WHERE agent = ?1",
        )
        .bind(agent)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| Error::DatabaseError(format!("Failed to fetch profile: {e}")))?;

        match row {
            Some((capability, supervision, needs_review)) => Ok(CapabilityProfile {
                agent: agent.to_string(),
                capability: capability.parse()?,
                supervision: supervision.parse()?,
                needs_review,
            }),
            None => Ok(CapabilityProfile::default_for(agent)),
        }
    }

    /// Administrative upsert of an agent's profile.
    pub async fn set_profile(&self, profile: &CapabilityProfile) -> Result<()> {
        sqlx::query(
            "INSERT INTO agent_capabilities (agent, capability, supervision, needs_review)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(agent) DO UPDATE SET
                 capability = ?2,
                 supervision = ?3,
                 needs_review = ?4",
        )
        .bind(&profile.agent)
        .bind(profile.capability.as_str())
        .bind(profile.supervision.as_str())
        .bind(profile.needs_review)
        .execute(&self.db)
        .await
        .map_err(|e| Error::DatabaseError(format!("Failed to set profile: {e}")))?;

        Ok(())
    }
}
