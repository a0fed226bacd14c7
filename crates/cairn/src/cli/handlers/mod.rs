use std::path::PathBuf;

use anyhow::{anyhow, Result};
use cairn_core::{Config, CoordinationClient};
use clap::ArgMatches;

mod assist;
mod lease;
mod log;
mod profile;
mod review;
mod session;
mod summary;

pub async fn dispatch(matches: &ArgMatches) -> Result<()> {
    let config_path = matches.get_one::<String>("config").map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    let client = CoordinationClient::connect(config).await?;
    let json = matches.get_flag("json");

    match matches.subcommand() {
        Some(("session", sub)) => session::handle(&client, sub, json).await,
        Some(("claim", sub)) => lease::handle_claim(&client, sub, json).await,
        Some(("checkin", sub)) => lease::handle_check_in(&client, sub, json).await,
        Some(("release", sub)) => lease::handle_release(&client, sub).await,
        Some(("lease", sub)) => lease::handle(&client, sub, json).await,
        Some(("assist", sub)) => assist::handle(&client, sub, json).await,
        Some(("log", sub)) => log::handle(&client, sub, json).await,
        Some(("profile", sub)) => profile::handle(&client, sub, json).await,
        Some(("review", sub)) => review::handle(&client, sub, json).await,
        Some(("summary", sub)) => summary::handle(&client, sub).await,
        Some((other, _)) => Err(anyhow!("Unknown command: {other}")),
        None => Err(anyhow!("A command is required; run 'cairn --help'")),
    }
}

/// Fetch a required string argument. Arguments marked `required(true)` are
/// always present; this keeps the lint wall intact without unwraps.
pub(crate) fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Missing required argument --{name}"))
}

/// Fetch an optional string argument, empty when absent.
pub(crate) fn optional<'a>(matches: &'a ArgMatches, name: &str) -> &'a str {
    matches.get_one::<String>(name).map_or("", String::as_str)
}
