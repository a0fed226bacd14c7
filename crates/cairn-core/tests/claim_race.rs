//! Regression coverage for the claim race.
//!
//! A claim decided by a separate read and write would let two agents
//! polling in the same window both see "unclaimed" and both start working.
//! The claim is a single atomic upsert decided by the store; under
//! concurrent execution exactly one racer may win.

use cairn_core::{Config, CoordinationClient, Error, Result};
use tempfile::TempDir;

async fn file_backed_client(dir: &TempDir) -> Result<CoordinationClient> {
    let config = Config {
        database_path: dir.path().join("race.db"),
        board_path: dir.path().join("TEAM_BOARD.md"),
        queue_dir: dir.path().join("work_queues"),
        ..Config::default()
    };
    CoordinationClient::connect(config).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_grant_exactly_one_winner() -> Result<()> {
    let dir = TempDir::new().map_err(|e| Error::IoError(e.to_string()))?;
    let client = file_backed_client(&dir).await?;

    let mut handles = Vec::new();
    for n in 0..8 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let agent = format!("racer-{n}");
            let session = format!("racer-{n}-session");
            client.claim(&agent, &session, "modules/contended", 30).await
        }));
    }

    let mut granted = 0;
    let mut conflicts = 0;
    for handle in handles {
        let outcome = handle
            .await
            .map_err(|e| Error::DatabaseError(format!("task panicked: {e}")))??;
        if outcome.is_granted() {
            granted += 1;
        } else {
            conflicts += 1;
        }
    }

    assert_eq!(granted, 1, "exactly one racer may hold the lease");
    assert_eq!(conflicts, 7);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_racing_rounds_never_double_grant() -> Result<()> {
    let dir = TempDir::new().map_err(|e| Error::IoError(e.to_string()))?;
    let client = file_backed_client(&dir).await?;

    for round in 0..5 {
        let resource = format!("modules/round-{round}");

        let mut handles = Vec::new();
        for n in 0..4 {
            let client = client.clone();
            let resource = resource.clone();
            handles.push(tokio::spawn(async move {
                let agent = format!("racer-{n}");
                let session = format!("racer-{n}-session");
                client.claim(&agent, &session, &resource, 10).await
            }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            let outcome = handle
                .await
                .map_err(|e| Error::DatabaseError(format!("task panicked: {e}")))??;
            if outcome.is_granted() {
                winners.push(outcome);
            }
        }
        assert_eq!(winners.len(), 1, "round {round} must have a single winner");
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn winner_release_hands_over_cleanly_under_contention() -> Result<()> {
    let dir = TempDir::new().map_err(|e| Error::IoError(e.to_string()))?;
    let client = file_backed_client(&dir).await?;

    // Sequential claim/release cycles among racing agents: each cycle the
    // freed lease must be claimable again.
    for n in 0..3 {
        let agent = format!("agent-{n}");
        let session = format!("agent-{n}-session");

        let outcome = client.claim(&agent, &session, "modules/handoff", 10).await?;
        assert!(outcome.is_granted(), "cycle {n} claim should land");

        client
            .release(&agent, &session, "modules/handoff", "cycle done", None)
            .await?;
    }
    Ok(())
}
