//! Sync command - one proposal in one direction

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use config::Config;
use proposal_core::{FieldDifference, ProposalId, SyncDirection, SyncOperation, SyncResult};

use crate::output;
use crate::runtime::Runtime;

#[derive(Args)]
pub struct SyncArgs {
    /// Proposal id (the relational primary key)
    pub id: i64,

    /// relational-to-document, document-to-relational or bidirectional
    #[arg(long, short, default_value = "relational-to-document")]
    pub direction: SyncDirection,

    /// Output as JSON
    #[arg(long)]
    pub json: bool
}

pub async fn run(args: SyncArgs, config: Config) -> Result<()> {
    let id = ProposalId::new(args.id)?;
    let runtime = Runtime::connect(config).await?;
    let result = runtime.orchestrator()?.sync(id, args.direction).await?;

    if args.json {
        return output::json(&result);
    }
    print_result(&result);
    Ok(())
}

pub(crate) fn print_result(result: &SyncResult) {
    output::header(&format!("Proposal {}", result.record_id));
    output::field("Direction", result.direction);
    output::field("Operation", operation_label(result.operation));
    output::field("At", result.timestamp.to_rfc3339());

    if result.degraded {
        output::warn("Document store not configured; nothing was synced");
        return;
    }

    print_differences(&result.differences);

    if let Some(resolution) = &result.resolution {
        println!();
        output::subheader(&format!("Resolved with {}", resolution.strategy));
        for field in &resolution.fields {
            println!(
                "  {} {} {} → {}",
                "~".yellow(),
                field.field,
                output::value(&field.old_value).dimmed(),
                output::value(&field.new_value)
            );
        }
    }
}

pub(crate) fn print_differences(differences: &[FieldDifference]) {
    if differences.is_empty() {
        output::success("No differences");
        return;
    }
    println!();
    output::subheader(&format!("{} difference(s)", differences.len()));
    for difference in differences {
        println!(
            "  {} {:<22} relational {}  document {}",
            "≠".red(),
            difference.field,
            output::value(&difference.relational_value),
            output::value(&difference.document_value)
        );
    }
}

fn operation_label(operation: SyncOperation) -> String {
    match operation {
        SyncOperation::Insert => operation.to_string().green().to_string(),
        SyncOperation::Update => operation.to_string().yellow().to_string(),
        SyncOperation::Noop => operation.to_string().dimmed().to_string()
    }
}
