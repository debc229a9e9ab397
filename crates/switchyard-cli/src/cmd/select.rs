use crate::host::{runtime, Host};
use crate::output::print_json;
use std::path::Path;

pub fn run(
    root: &Path,
    group: &str,
    member: &str,
    previous: Option<&str>,
    no_save: bool,
    json: bool,
) -> anyhow::Result<()> {
    let host = Host::open(root, json)?;
    let orch = host.orchestrator()?;
    let rt = runtime()?;

    rt.block_on(orch.select(group, member, previous, !no_save))?;

    if json {
        print_json(&serde_json::json!({
            "group": group,
            "member": member,
            "saved": !no_save,
        }))?;
    } else {
        println!("Selected {member} in {group}");
    }
    Ok(())
}
