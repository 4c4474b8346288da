use anyhow::{Context, Result};
use clap::Args;
use config::Config;

use crate::output;
use crate::runtime::Runtime;

#[derive(Args)]
pub struct InitSchemaArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool
}

pub async fn run(args: InitSchemaArgs, config: Config) -> Result<()> {
    let runtime = Runtime::connect(config).await?;

    runtime
        .records
        .initialize_schema()
        .await
        .context("Failed to create PostgreSQL tables")?;
    if let Some(documents) = &runtime.documents {
        documents
            .ensure_indexes()
            .await
            .context("Failed to create MongoDB indexes")?;
    }

    let mirror_ready = runtime.documents.is_some();
    if args.json {
        return output::json(&serde_json::json!({
            "relational": "ready",
            "document": if mirror_ready { "ready" } else { "skipped" }
        }));
    }

    output::success("PostgreSQL tables ready");
    if mirror_ready {
        output::success("MongoDB indexes ready");
    } else {
        output::warn("MongoDB not configured; indexes skipped");
    }
    Ok(())
}
