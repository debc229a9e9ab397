use crate::host::{runtime, Host};
use crate::output::{print_json, print_table};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let host = Host::open(root, json)?;
    let orch = host.orchestrator()?;
    let rt = runtime()?;

    let report = rt.block_on(orch.reconcile_now())?;

    if json {
        return print_json(&report);
    }
    if report.aborted {
        println!("An activation is in progress; it will reconcile on its own.");
        return Ok(());
    }
    if !report.wrote_anything() && report.skipped.is_empty() && report.failed.is_empty() {
        println!("All saved selections already match the core.");
        return Ok(());
    }
    if report.seeded > 0 {
        println!("Recorded {} selection(s) from core state", report.seeded);
    }
    if !report.applied.is_empty() {
        let rows = report
            .applied
            .iter()
            .map(|r| vec![r.group.clone(), r.member.clone()])
            .collect();
        print_table(&["GROUP", "MEMBER"], rows);
    }
    if report.recorded > 0 {
        println!("Remembered {} more group(s) in the profile", report.recorded);
    }
    for group in &report.skipped {
        println!("Skipped {group}: saved member no longer exists");
    }
    for failure in &report.failed {
        println!("Failed {failure}");
    }
    Ok(())
}
