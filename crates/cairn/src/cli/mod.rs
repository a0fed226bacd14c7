pub mod handlers;

use clap::{Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("cairn")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Shared-store coordination for autonomous agent fleets")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .global(true)
                .help("Path to a cairn.toml config file"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit JSON instead of human-readable output"),
        )
        .subcommand(cmd_session())
        .subcommand(cmd_claim())
        .subcommand(cmd_checkin())
        .subcommand(cmd_release())
        .subcommand(cmd_lease())
        .subcommand(cmd_assist())
        .subcommand(cmd_log())
        .subcommand(cmd_profile())
        .subcommand(cmd_review())
        .subcommand(cmd_summary())
}

fn arg_agent() -> Arg {
    Arg::new("agent")
        .long("agent")
        .value_name("NAME")
        .required(true)
        .help("Agent identity")
}

fn arg_session() -> Arg {
    Arg::new("session")
        .long("session")
        .value_name("ID")
        .required(true)
        .help("Session id from `cairn session start`")
}

fn cmd_session() -> Command {
    Command::new("session")
        .about("Agent sessions")
        .subcommand_required(true)
        .subcommand(
            Command::new("start")
                .about("Run the startup sequence and print the session context")
                .arg(arg_agent()),
        )
}

fn cmd_claim() -> Command {
    Command::new("claim")
        .about("Claim a resource before working on it")
        .arg(Arg::new("resource").required(true).help("Resource to claim"))
        .arg(arg_agent())
        .arg(arg_session())
        .arg(
            Arg::new("estimate")
                .long("estimate")
                .value_name("MINUTES")
                .value_parser(clap::value_parser!(i64))
                .default_value("30")
                .help("Advisory time estimate in minutes"),
        )
}

fn cmd_checkin() -> Command {
    Command::new("checkin")
        .about("Heartbeat while working on a claimed resource")
        .arg(Arg::new("resource").required(true).help("Claimed resource"))
        .arg(arg_agent())
        .arg(arg_session())
        .arg(
            Arg::new("percent")
                .long("percent")
                .value_name("0-100")
                .value_parser(clap::value_parser!(u8))
                .default_value("0")
                .help("Progress percentage"),
        )
        .arg(
            Arg::new("message")
                .long("message")
                .value_name("TEXT")
                .default_value("checking in")
                .help("Status message"),
        )
}

fn cmd_release() -> Command {
    Command::new("release")
        .about("Release a resource when done")
        .arg(Arg::new("resource").required(true).help("Resource to release"))
        .arg(arg_agent())
        .arg(arg_session())
        .arg(
            Arg::new("message")
                .long("message")
                .value_name("TEXT")
                .default_value("done")
                .help("Outcome description"),
        )
}

fn cmd_lease() -> Command {
    Command::new("lease")
        .about("Inspect and maintain leases")
        .subcommand_required(true)
        .subcommand(Command::new("list").about("List live leases"))
        .subcommand(
            Command::new("state")
                .about("Show the lease state of one resource")
                .arg(Arg::new("resource").required(true)),
        )
        .subcommand(Command::new("sweep").about("Remove leases past their deadline"))
}

fn cmd_assist() -> Command {
    Command::new("assist")
        .about("Help escalation between agents")
        .subcommand_required(true)
        .subcommand(
            Command::new("request")
                .about("Ask a peer for help")
                .arg(arg_agent())
                .arg(arg_session())
                .arg(
                    Arg::new("to")
                        .long("to")
                        .value_name("PEER")
                        .required(true)
                        .help("Agent whose help is needed"),
                )
                .arg(
                    Arg::new("reason")
                        .long("reason")
                        .value_name("TEXT")
                        .required(true)
                        .help("What is needed"),
                )
                .arg(
                    Arg::new("priority")
                        .long("priority")
                        .value_name("LEVEL")
                        .default_value("medium")
                        .help("low, medium or high"),
                ),
        )
        .subcommand(
            Command::new("resolve")
                .about("Resolve a peer's help request")
                .arg(
                    Arg::new("id")
                        .required(true)
                        .value_parser(clap::value_parser!(i64))
                        .help("Help request id"),
                )
                .arg(arg_agent())
                .arg(arg_session())
                .arg(
                    Arg::new("message")
                        .long("message")
                        .value_name("TEXT")
                        .required(true)
                        .help("How it was resolved"),
                ),
        )
        .subcommand(
            Command::new("list")
                .about("List open help requests addressed to an agent")
                .arg(arg_agent()),
        )
}

fn cmd_log() -> Command {
    Command::new("log")
        .about("The shared activity log")
        .subcommand_required(true)
        .subcommand(
            Command::new("list")
                .about("List activity records, newest first")
                .arg(Arg::new("agent").long("agent").value_name("NAME"))
                .arg(Arg::new("resource").long("resource").value_name("RESOURCE"))
                .arg(Arg::new("kind").long("kind").value_name("KIND"))
                .arg(
                    Arg::new("since-mins")
                        .long("since-mins")
                        .value_name("MINUTES")
                        .value_parser(clap::value_parser!(i64)),
                )
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .value_name("N")
                        .value_parser(clap::value_parser!(u32))
                        .default_value("50"),
                ),
        )
}

fn cmd_profile() -> Command {
    Command::new("profile")
        .about("Agent capability profiles")
        .subcommand_required(true)
        .subcommand(
            Command::new("show")
                .about("Show an agent's profile")
                .arg(Arg::new("agent").required(true)),
        )
        .subcommand(
            Command::new("set")
                .about("Set an agent's profile")
                .arg(Arg::new("agent").required(true))
                .arg(
                    Arg::new("capability")
                        .long("capability")
                        .value_name("LEVEL")
                        .default_value("standard")
                        .help("limited, standard or advanced"),
                )
                .arg(
                    Arg::new("supervision")
                        .long("supervision")
                        .value_name("LEVEL")
                        .default_value("normal")
                        .help("low, normal or high"),
                )
                .arg(
                    Arg::new("needs-review")
                        .long("needs-review")
                        .action(ArgAction::SetTrue)
                        .help("Major decisions require out-of-band approval"),
                ),
        )
}

fn cmd_review() -> Command {
    Command::new("review")
        .about("Supervisory review data")
        .subcommand_required(true)
        .subcommand(Command::new("errors").about("List unresolved agent-reported errors"))
        .subcommand(Command::new("decisions").about("List proposed technical decisions"))
}

fn cmd_summary() -> Command {
    Command::new("summary")
        .about("Append an end-of-session summary to the message board")
        .arg(arg_agent())
        .arg(
            Arg::new("session-number")
                .long("session-number")
                .value_name("N")
                .value_parser(clap::value_parser!(u32))
                .required(true),
        )
        .arg(
            Arg::new("completed")
                .long("completed")
                .value_name("TEXT")
                .required(true),
        )
        .arg(Arg::new("next").long("next").value_name("TEXT"))
        .arg(Arg::new("messages").long("messages").value_name("TEXT"))
        .arg(
            Arg::new("blockers")
                .long("blockers")
                .value_name("TEXT")
                .default_value("none"),
        )
        .arg(Arg::new("metrics").long("metrics").value_name("TEXT"))
}
