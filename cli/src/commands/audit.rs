use anyhow::Result;
use clap::Args;
use colored::Colorize;
use config::Config;

use crate::output;
use crate::runtime::Runtime;

#[derive(Args)]
pub struct AuditArgs {
    /// Organization id
    pub organization_id: i64,

    /// Output as JSON
    #[arg(long)]
    pub json: bool
}

pub async fn run(args: AuditArgs, config: Config) -> Result<()> {
    let runtime = Runtime::connect(config).await?;
    let summary = runtime
        .auditor()
        .ensure_proposal_consistency(args.organization_id)
        .await?;

    if args.json {
        return output::json(&summary);
    }

    output::header(&format!("Organization {}", summary.organization_id));
    output::field(
        "Canonical name",
        format!("{} ({:?})", summary.canonical_name.cyan(), summary.name_source)
    );
    output::field("Relational count", summary.relational_count);
    output::field(
        "Document count",
        summary
            .document_count
            .map_or_else(|| "n/a".dimmed().to_string(), |count| count.to_string())
    );

    if !summary.name_mismatches.is_empty() {
        println!();
        output::subheader("Name mismatches");
        for mismatch in &summary.name_mismatches {
            println!(
                "  {} {:>8}  {}",
                "≠".red(),
                mismatch.record_id,
                mismatch.stored_name.as_deref().unwrap_or("(none)")
            );
        }
    }

    println!();
    if summary.consistent {
        output::success("Organization is consistent");
    } else {
        output::subheader("Recommendations");
    }
    for recommendation in &summary.recommendations {
        output::hint(recommendation);
    }
    Ok(())
}
