use anyhow::{anyhow, Result};
use cairn_core::CoordinationClient;
use clap::ArgMatches;

pub async fn handle(client: &CoordinationClient, matches: &ArgMatches, json: bool) -> Result<()> {
    match matches.subcommand() {
        Some(("errors", _)) => {
            let errors = client.review().unresolved_errors().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&errors)?);
                return Ok(());
            }
            if errors.is_empty() {
                println!("No unresolved errors");
                return Ok(());
            }
            for error in errors {
                println!(
                    "#{} {} [{}] {}: {}",
                    error.id,
                    error.created_at.format("%Y-%m-%d %H:%M"),
                    error.severity.as_str(),
                    error.agent,
                    error.message
                );
            }
            Ok(())
        }
        Some(("decisions", _)) => {
            let decisions = client.review().proposed_decisions().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&decisions)?);
                return Ok(());
            }
            if decisions.is_empty() {
                println!("No proposed decisions");
                return Ok(());
            }
            for decision in decisions {
                println!(
                    "#{} {} [{} impact] {} ({}): {}",
                    decision.id,
                    decision.created_at.format("%Y-%m-%d %H:%M"),
                    decision.impact.as_str(),
                    decision.agent,
                    decision.kind,
                    decision.decision
                );
            }
            Ok(())
        }
        _ => Err(anyhow!("Run 'cairn review --help' for usage")),
    }
}
