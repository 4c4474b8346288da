use anyhow::{Result, bail};
use clap::Args;
use config::Config;
use proposal_core::ProposalId;

use crate::commands::sync::print_differences;
use crate::output;
use crate::runtime::Runtime;

#[derive(Args)]
pub struct ValidateArgs {
    /// Proposal id
    pub id: i64,

    /// Output as JSON
    #[arg(long)]
    pub json: bool
}

pub async fn run(args: ValidateArgs, config: Config) -> Result<()> {
    let id = ProposalId::new(args.id)?;
    let runtime = Runtime::connect(config).await?;
    let report = runtime.validator()?.validate_sync_integrity(id).await?;

    if args.json {
        output::json(&report)?;
    } else {
        output::header(&format!("Integrity of proposal {id}"));
        output::field("Relational", if report.relational_exists { "present" } else { "missing" });
        output::field("Document", if report.document_exists { "present" } else { "missing" });
        output::field("State", format!("{:?}", report.state));
        if report.degraded {
            output::warn("Document store not configured; integrity was not checked");
        } else {
            print_differences(&report.differences);
        }
        if !report.passed && !report.degraded {
            output::hint(&format!("Run `proposal-sync sync {id}` to repair the mirror"));
        }
    }

    if !report.passed {
        bail!("proposal {id} failed the integrity check");
    }
    Ok(())
}
