pub mod handlers;

use clap::{value_parser, Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("plansync")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Write coordination for shared group-order plans")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_name("PATH")
                .help("Config file (replaces ./plansync.toml)"),
        )
        .arg(
            Arg::new("database")
                .long("database")
                .global(true)
                .value_name("URL")
                .help("SQLite database url (overrides database_url)"),
        )
        .arg(
            Arg::new("pretty")
                .long("pretty")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Pretty-print JSON output"),
        )
        .subcommand(cmd_work())
        .subcommand(cmd_submit())
        .subcommand(cmd_queue())
        .subcommand(cmd_lock())
        .subcommand(cmd_doc())
}

fn cmd_work() -> Command {
    Command::new("work")
        .about("Run the worker pool until SIGINT/SIGTERM")
        .arg(
            Arg::new("concurrency")
                .long("concurrency")
                .short('n')
                .value_parser(value_parser!(usize))
                .help("Number of concurrent workers"),
        )
        .arg(
            Arg::new("shutdown-timeout-ms")
                .long("shutdown-timeout-ms")
                .value_parser(value_parser!(u64))
                .help("Give up on in-flight jobs after this long when stopping"),
        )
}

fn cmd_submit() -> Command {
    Command::new("submit")
        .about("Submit a plan update (JSON) to the queue")
        .arg(
            Arg::new("file")
                .long("file")
                .short('f')
                .required(true)
                .value_name("PATH")
                .help("Update JSON file, or '-' for stdin"),
        )
}

fn cmd_queue() -> Command {
    Command::new("queue")
        .about("Inspect the job queue")
        .subcommand_required(true)
        .subcommand(Command::new("stats").about("Count jobs by state"))
        .subcommand(
            Command::new("list")
                .about("List jobs")
                .arg(
                    Arg::new("status")
                        .long("status")
                        .value_parser(["waiting", "active", "completed", "failed"])
                        .help("Only jobs in this state"),
                )
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .value_parser(value_parser!(u32))
                        .default_value("50"),
                ),
        )
        .subcommand(
            Command::new("show").about("Show one job").arg(
                Arg::new("id")
                    .required(true)
                    .value_parser(value_parser!(i64)),
            ),
        )
        .subcommand(
            Command::new("reclaim")
                .about("Return stalled active jobs to the queue")
                .arg(
                    Arg::new("older-than-ms")
                        .long("older-than-ms")
                        .value_parser(value_parser!(u64))
                        .help("Stall threshold (default: worker.stall_after_ms)"),
                ),
        )
}

fn cmd_lock() -> Command {
    Command::new("lock")
        .about("Inspect plan locks")
        .subcommand_required(true)
        .subcommand(
            Command::new("show")
                .about("Show the current holder of a plan's lock")
                .arg(Arg::new("plan-id").required(true)),
        )
        .subcommand(
            Command::new("release")
                .about("Release a plan lock held by the given token")
                .arg(Arg::new("plan-id").required(true))
                .arg(Arg::new("token").long("token").required(true)),
        )
}

fn cmd_doc() -> Command {
    Command::new("doc")
        .about("Read and seed documents in the configured store")
        .subcommand_required(true)
        .subcommand(
            Command::new("show")
                .about("Show a document")
                .arg(Arg::new("id").required(true)),
        )
        .subcommand(
            Command::new("put")
                .about("Create or replace a document in the SQLite store")
                .arg(Arg::new("id").required(true))
                .arg(
                    Arg::new("file")
                        .long("file")
                        .short('f')
                        .required(true)
                        .value_name("PATH")
                        .help("Attributes JSON object, or '-' for stdin"),
                ),
        )
}
