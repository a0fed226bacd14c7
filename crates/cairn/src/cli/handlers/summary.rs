use anyhow::{anyhow, Result};
use cairn_core::{CoordinationClient, SessionSummary};
use clap::ArgMatches;

use super::{optional, required};

pub async fn handle(client: &CoordinationClient, matches: &ArgMatches) -> Result<()> {
    let summary = SessionSummary {
        agent: required(matches, "agent")?.to_string(),
        session_number: matches
            .get_one::<u32>("session-number")
            .copied()
            .ok_or_else(|| anyhow!("Missing --session-number"))?,
        completed: required(matches, "completed")?.to_string(),
        next_tasks: optional(matches, "next").to_string(),
        messages: optional(matches, "messages").to_string(),
        blockers: required(matches, "blockers")?.to_string(),
        metrics: optional(matches, "metrics").to_string(),
    };

    client.write_summary(&summary).await?;
    println!(
        "Summary for session #{} written to {}",
        summary.session_number,
        client.config().board_path.display()
    );
    Ok(())
}
