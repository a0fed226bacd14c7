use anyhow::{anyhow, Result};
use cairn_core::{ActivityFilter, CoordinationClient};
use clap::ArgMatches;

pub async fn handle(client: &CoordinationClient, matches: &ArgMatches, json: bool) -> Result<()> {
    match matches.subcommand() {
        Some(("list", sub)) => {
            let mut filter = ActivityFilter::new();
            if let Some(agent) = sub.get_one::<String>("agent") {
                filter = filter.agent(agent);
            }
            if let Some(resource) = sub.get_one::<String>("resource") {
                filter = filter.resource(resource);
            }
            if let Some(kind) = sub.get_one::<String>("kind") {
                filter = filter.kind(kind.parse()?);
            }
            if let Some(mins) = sub.get_one::<i64>("since-mins") {
                filter = filter.since(chrono::Utc::now() - chrono::Duration::minutes(*mins));
            }
            if let Some(limit) = sub.get_one::<u32>("limit") {
                filter = filter.limit(*limit);
            }

            let records = client.activity_log(&filter).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
                return Ok(());
            }
            if records.is_empty() {
                println!("No matching activity");
                return Ok(());
            }
            for record in records {
                let resource = record.resource.as_deref().unwrap_or("-");
                println!(
                    "#{:<5} {} {:<9} {:<8} {:<12} {} | {}",
                    record.id,
                    record.created_at.format("%m-%d %H:%M:%S"),
                    record.kind,
                    record.status,
                    record.agent,
                    resource,
                    record.message
                );
            }
            Ok(())
        }
        _ => Err(anyhow!("Run 'cairn log --help' for usage")),
    }
}
