use anyhow::Result;
use clap::Args;
use colored::Colorize;
use config::Config;
use proposal_core::ProposalId;

use crate::output;
use crate::runtime::Runtime;

#[derive(Args)]
pub struct OrphansArgs {
    /// Only scan one organization's proposals
    #[arg(long)]
    pub organization: Option<i64>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool
}

pub async fn run(args: OrphansArgs, config: Config) -> Result<()> {
    let runtime = Runtime::connect(config).await?;
    let scan = runtime.validator()?.scan_orphans(args.organization).await?;

    if args.json {
        return output::json(&scan);
    }

    let scope = args
        .organization
        .map_or_else(|| "all organizations".to_string(), |org| format!("organization {org}"));
    output::header(&format!("Orphan scan ({scope})"));

    if scan.degraded {
        output::warn("Document store not configured; nothing was compared");
        return Ok(());
    }
    if scan.is_clean() {
        output::success("Every proposal is present in both stores");
        return Ok(());
    }

    print_ids("Missing from the document store", &scan.relational_only);
    print_ids("Missing from the relational store", &scan.document_only);
    if !scan.unparseable_document_ids.is_empty() {
        output::field(
            "Unparseable ids",
            scan.unparseable_document_ids.join(", ").red()
        );
    }
    if !scan.relational_only.is_empty() {
        output::hint("`proposal-sync batch <ids…>` recreates missing mirrors");
    }
    Ok(())
}

fn print_ids(label: &str, ids: &[ProposalId]) {
    if ids.is_empty() {
        return;
    }
    let joined: Vec<String> = ids.iter().map(ToString::to_string).collect();
    output::field(label, joined.join(", ").yellow());
}
