use std::time::Duration;

use anyhow::Result;
use clap::ArgMatches;
use plansync_core::JobStatus;

use crate::commands::{
    queue::{run, QueueAction},
    GlobalOptions,
};

pub async fn handle(global: &GlobalOptions, matches: &ArgMatches) -> Result<()> {
    let action = match matches.subcommand() {
        Some(("stats", _)) => QueueAction::Stats,
        Some(("list", sub_m)) => QueueAction::List {
            status: sub_m
                .get_one::<String>("status")
                .map(|s| s.parse::<JobStatus>())
                .transpose()?,
            limit: sub_m.get_one::<u32>("limit").copied().unwrap_or(50),
        },
        Some(("show", sub_m)) => QueueAction::Show {
            id: sub_m
                .get_one::<i64>("id")
                .copied()
                .ok_or_else(|| anyhow::anyhow!("job id is required"))?,
        },
        Some(("reclaim", sub_m)) => QueueAction::Reclaim {
            older_than: sub_m
                .get_one::<u64>("older-than-ms")
                .map(|ms| Duration::from_millis(*ms)),
        },
        _ => anyhow::bail!("Unknown queue subcommand. Run 'plansync queue --help' for usage."),
    };
    run(global, &action).await
}
