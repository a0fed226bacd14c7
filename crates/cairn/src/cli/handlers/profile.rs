use anyhow::{anyhow, Result};
use cairn_core::{CapabilityProfile, CoordinationClient};
use clap::ArgMatches;

use super::required;

pub async fn handle(client: &CoordinationClient, matches: &ArgMatches, json: bool) -> Result<()> {
    match matches.subcommand() {
        Some(("show", sub)) => {
            let agent = required(sub, "agent")?;
            let profile = client.profile(agent).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&profile)?);
                return Ok(());
            }
            println!("Agent: {}", profile.agent);
            println!("Capability: {}", profile.capability);
            println!("Supervision: {}", profile.supervision);
            println!("Needs review: {}", profile.needs_review);
            Ok(())
        }
        Some(("set", sub)) => {
            let agent = required(sub, "agent")?;
            let profile = CapabilityProfile {
                agent: agent.to_string(),
                capability: required(sub, "capability")?.parse()?,
                supervision: required(sub, "supervision")?.parse()?,
                needs_review: sub.get_flag("needs-review"),
            };

            client.set_profile(&profile).await?;
            println!("Profile updated for {agent}");
            Ok(())
        }
        _ => Err(anyhow!("Run 'cairn profile --help' for usage")),
    }
}
