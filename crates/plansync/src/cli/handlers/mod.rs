//! Translate parsed arguments into command options.

mod doc;
mod lock;
mod queue;

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::ArgMatches;

use crate::commands::{self, submit::SubmitOptions, work::WorkOptions, GlobalOptions};

pub async fn dispatch(matches: &ArgMatches) -> Result<()> {
    let global = global_options(matches);

    match matches.subcommand() {
        Some(("work", sub_m)) => handle_work(&global, sub_m).await,
        Some(("submit", sub_m)) => handle_submit(&global, sub_m).await,
        Some(("queue", sub_m)) => queue::handle(&global, sub_m).await,
        Some(("lock", sub_m)) => lock::handle(&global, sub_m).await,
        Some(("doc", sub_m)) => doc::handle(&global, sub_m).await,
        _ => anyhow::bail!("Unknown command. Run 'plansync --help' for usage."),
    }
}

fn global_options(matches: &ArgMatches) -> GlobalOptions {
    GlobalOptions {
        config: matches.get_one::<String>("config").map(PathBuf::from),
        database: matches.get_one::<String>("database").cloned(),
        pretty: matches.get_flag("pretty"),
    }
}

fn required(matches: &ArgMatches, name: &str) -> Result<String> {
    matches
        .get_one::<String>(name)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("<{name}> is required"))
}

async fn handle_work(global: &GlobalOptions, matches: &ArgMatches) -> Result<()> {
    let options = WorkOptions {
        concurrency: matches.get_one::<usize>("concurrency").copied(),
        shutdown_timeout: matches
            .get_one::<u64>("shutdown-timeout-ms")
            .map(|ms| Duration::from_millis(*ms)),
    };
    commands::work::run(global, &options).await
}

async fn handle_submit(global: &GlobalOptions, matches: &ArgMatches) -> Result<()> {
    let file = PathBuf::from(required(matches, "file")?);
    commands::submit::run(global, &SubmitOptions { file }).await
}
