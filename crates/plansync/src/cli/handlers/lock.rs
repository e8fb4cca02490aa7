use anyhow::Result;
use clap::ArgMatches;

use super::required;
use crate::commands::{
    lock::{run, LockAction},
    GlobalOptions,
};

pub async fn handle(global: &GlobalOptions, matches: &ArgMatches) -> Result<()> {
    let action = match matches.subcommand() {
        Some(("show", sub_m)) => LockAction::Show {
            plan_id: required(sub_m, "plan-id")?,
        },
        Some(("release", sub_m)) => LockAction::Release {
            plan_id: required(sub_m, "plan-id")?,
            token: required(sub_m, "token")?,
        },
        _ => anyhow::bail!("Unknown lock subcommand. Run 'plansync lock --help' for usage."),
    };
    run(global, &action).await
}
