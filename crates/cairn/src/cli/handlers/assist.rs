use anyhow::{anyhow, Result};
use cairn_core::{CoordinationClient, HelpPriority};
use clap::ArgMatches;

use super::required;

pub async fn handle(client: &CoordinationClient, matches: &ArgMatches, json: bool) -> Result<()> {
    match matches.subcommand() {
        Some(("request", sub)) => {
            let agent = required(sub, "agent")?;
            let session = required(sub, "session")?;
            let to = required(sub, "to")?;
            let reason = required(sub, "reason")?;
            let priority: HelpPriority = required(sub, "priority")?.parse()?;

            let id = client
                .request_help(agent, session, to, reason, priority)
                .await?;

            if json {
                println!("{}", serde_json::json!({ "request_id": id }));
            } else {
                println!("Help requested from {to} (request #{id}, priority {priority})");
            }
            Ok(())
        }
        Some(("resolve", sub)) => {
            let id = sub
                .get_one::<i64>("id")
                .copied()
                .ok_or_else(|| anyhow!("Missing request id"))?;
            let agent = required(sub, "agent")?;
            let session = required(sub, "session")?;
            let message = required(sub, "message")?;

            client.resolve_help(agent, session, id, message).await?;
            println!("Resolved help request #{id}");
            Ok(())
        }
        Some(("list", sub)) => {
            let agent = required(sub, "agent")?;
            let requests = client.pending_help(agent).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&requests)?);
                return Ok(());
            }
            if requests.is_empty() {
                println!("No open help requests for {agent}");
                return Ok(());
            }
            for request in requests {
                println!(
                    "#{} from {} [{}] {}: {}",
                    request.id,
                    request.agent,
                    request.priority,
                    request.created_at.format("%Y-%m-%d %H:%M"),
                    request.reason
                );
            }
            Ok(())
        }
        _ => Err(anyhow!("Run 'cairn assist --help' for usage")),
    }
}
