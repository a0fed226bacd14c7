use anyhow::{anyhow, Result};
use cairn_core::CoordinationClient;
use clap::ArgMatches;

use super::required;

pub async fn handle(client: &CoordinationClient, matches: &ArgMatches, json: bool) -> Result<()> {
    match matches.subcommand() {
        Some(("start", sub)) => {
            let agent = required(sub, "agent")?;
            let context = client.bootstrap_session(agent).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&context)?);
                return Ok(());
            }

            println!("Session: {}", context.session_id);
            println!(
                "Profile: capability {}, supervision {}{}",
                context.profile.capability,
                context.profile.supervision,
                if context.profile.needs_review {
                    " (decisions need review)"
                } else {
                    ""
                }
            );
            println!("Messages for me: {}", context.messages.len());
            for message in &context.messages {
                println!("  {message}");
            }
            println!("Peer leases: {}", context.active_leases.len());
            for lease in &context.active_leases {
                println!("  {} held by {}", lease.resource, lease.holder);
            }
            println!("Help requests waiting: {}", context.help_requests.len());
            for request in &context.help_requests {
                println!(
                    "  #{} from {} [{}]: {}",
                    request.id, request.agent, request.priority, request.reason
                );
            }
            println!("Pending tasks: {}", context.tasks.len());
            if let Some(next) = context.tasks.first() {
                println!("  Next: {}", next.text);
            }
            Ok(())
        }
        _ => Err(anyhow!("Run 'cairn session --help' for usage")),
    }
}
