use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;
use config::Config;
use proposal_core::SyncDirection;

use crate::output;
use crate::runtime::Runtime;

#[derive(Args)]
pub struct BatchArgs {
    /// Proposal ids to sync; invalid ids are reported, not fatal
    #[arg(required = true, num_args = 1..)]
    pub ids: Vec<i64>,

    #[arg(long, short, default_value = "relational-to-document")]
    pub direction: SyncDirection,

    /// Output as JSON
    #[arg(long)]
    pub json: bool
}

pub async fn run(args: BatchArgs, config: Config) -> Result<()> {
    let runtime = Runtime::connect(config).await?;
    let summary = runtime
        .orchestrator()?
        .batch_sync_direction(&args.ids, args.direction)
        .await;

    if args.json {
        output::json(&summary)?;
    } else {
        output::header(&format!("Batch sync ({})", args.direction));
        output::field("Total", summary.total);
        output::field("Successful", summary.successful.to_string().green());
        output::field("Failed", summary.failed.to_string().red());

        if !summary.results.is_empty() {
            println!();
            for result in &summary.results {
                let marker = if result.degraded { "!".yellow() } else { "✓".green() };
                println!(
                    "  {} {:>8}  {}  {} difference(s)",
                    marker,
                    result.record_id,
                    result.operation,
                    result.differences.len()
                );
            }
        }

        if !summary.errors.is_empty() {
            println!();
            output::subheader("Failures");
            for error in &summary.errors {
                println!(
                    "  {} {:>8}  [{}] {}",
                    "✗".red(),
                    error.record_id,
                    error.kind,
                    error.message
                );
            }
            output::hint("Failures marked store_unavailable can be retried");
        }
    }

    if summary.failed > 0 {
        bail!("{} of {} proposals failed to sync", summary.failed, summary.total);
    }
    Ok(())
}
