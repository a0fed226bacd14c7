use anyhow::{anyhow, Result};
use cairn_core::{ClaimOutcome, CoordinationClient, LeaseState};
use clap::ArgMatches;

use super::required;

pub async fn handle_claim(
    client: &CoordinationClient,
    matches: &ArgMatches,
    json: bool,
) -> Result<()> {
    let resource = required(matches, "resource")?;
    let agent = required(matches, "agent")?;
    let session = required(matches, "session")?;
    let estimate = matches.get_one::<i64>("estimate").copied().unwrap_or(30);

    let outcome = client.claim(agent, session, resource, estimate).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match outcome {
        ClaimOutcome::Granted { lease } => {
            println!(
                "Claimed '{}' until {} (estimate {} min)",
                lease.resource,
                lease.deadline.format("%H:%M:%S"),
                lease.requested_minutes
            );
        }
        ClaimOutcome::Conflict { holder, deadline } => {
            println!(
                "Conflict: '{resource}' is held by {holder} until {}",
                deadline.format("%H:%M:%S")
            );
        }
    }
    Ok(())
}

pub async fn handle_check_in(
    client: &CoordinationClient,
    matches: &ArgMatches,
    json: bool,
) -> Result<()> {
    let resource = required(matches, "resource")?;
    let agent = required(matches, "agent")?;
    let session = required(matches, "session")?;
    let percent = matches.get_one::<u8>("percent").copied().unwrap_or(0);
    let message = required(matches, "message")?;

    let check_in = client
        .check_in(agent, session, resource, percent, message)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&check_in)?);
        return Ok(());
    }

    println!(
        "Checked in on '{resource}' at {percent}% - lease extended to {}",
        check_in.deadline.format("%H:%M:%S")
    );
    if check_in.should_pause() {
        println!(
            "{} help request(s) waiting for you - consider pausing current work",
            check_in.pending_help
        );
    }
    Ok(())
}

pub async fn handle_release(client: &CoordinationClient, matches: &ArgMatches) -> Result<()> {
    let resource = required(matches, "resource")?;
    let agent = required(matches, "agent")?;
    let session = required(matches, "session")?;
    let message = required(matches, "message")?;

    client.release(agent, session, resource, message, None).await?;
    println!("Released '{resource}' - {message}");
    Ok(())
}

pub async fn handle(client: &CoordinationClient, matches: &ArgMatches, json: bool) -> Result<()> {
    match matches.subcommand() {
        Some(("list", _)) => {
            let leases = client.active_leases().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&leases)?);
                return Ok(());
            }
            if leases.is_empty() {
                println!("No live leases");
                return Ok(());
            }
            for lease in leases {
                println!(
                    "{} held by {} until {} (estimate {} min)",
                    lease.resource,
                    lease.holder,
                    lease.deadline.format("%Y-%m-%d %H:%M:%S"),
                    lease.requested_minutes
                );
            }
            Ok(())
        }
        Some(("state", sub)) => {
            let resource = required(sub, "resource")?;
            let state = client.lease_state(resource).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&state)?);
                return Ok(());
            }
            match state {
                LeaseState::Free => println!("'{resource}' is free"),
                LeaseState::Held { holder, deadline } => println!(
                    "'{resource}' is held by {holder} until {}",
                    deadline.format("%H:%M:%S")
                ),
                LeaseState::Expired { holder, deadline } => println!(
                    "'{resource}' expired (last held by {holder}, deadline {})",
                    deadline.format("%H:%M:%S")
                ),
            }
            Ok(())
        }
        Some(("sweep", _)) => {
            let swept = client.sweep_expired().await?;
            println!("Removed {swept} expired lease(s)");
            Ok(())
        }
        _ => Err(anyhow!("Run 'cairn lease --help' for usage")),
    }
}
