use crate::cmd::activate::{print_settled, settle};
use crate::host::{runtime, Host};
use crate::output::print_json;
use anyhow::Context;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let host = Host::open(root, json)?;
    let orch = host.orchestrator()?;
    let rt = runtime()?;

    let current = orch
        .store()
        .current_profile()
        .context("failed to read profiles")?;
    let settled = rt.block_on(async {
        let report = orch.reactivate().await?;
        anyhow::Ok(settle(report).await)
    })?;

    if json {
        print_json(&serde_json::json!({
            "profile": current,
            "outcome": settled.outcome,
            "generation": settled.generation,
            "partial": settled.partial,
            "reconciliation": settled.reconciliation,
        }))?;
    } else if let Some(current) = current {
        print_settled(current.as_str(), &settled);
    }
    Ok(())
}
