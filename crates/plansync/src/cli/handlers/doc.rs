use std::path::PathBuf;

use anyhow::Result;
use clap::ArgMatches;

use super::required;
use crate::commands::{
    doc::{run, DocAction},
    GlobalOptions,
};

pub async fn handle(global: &GlobalOptions, matches: &ArgMatches) -> Result<()> {
    let action = match matches.subcommand() {
        Some(("show", sub_m)) => DocAction::Show {
            id: required(sub_m, "id")?,
        },
        Some(("put", sub_m)) => DocAction::Put {
            id: required(sub_m, "id")?,
            file: PathBuf::from(required(sub_m, "file")?),
        },
        _ => anyhow::bail!("Unknown doc subcommand. Run 'plansync doc --help' for usage."),
    };
    run(global, &action).await
}
