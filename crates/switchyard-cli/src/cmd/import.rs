use crate::host::{runtime, Host};
use crate::output::print_json;
use std::path::Path;
use switchyard_core::import::import_profile;
use switchyard_core::steps::StepRunner;
use switchyard_mihomo::HttpImporter;

pub fn run(root: &Path, url: &str, json: bool) -> anyhow::Result<()> {
    let host = Host::open(root, json)?;
    let importer = HttpImporter::new(&host.root, host.store.clone(), &host.config.controller);
    let runner = StepRunner::new(host.notifier.clone());
    let rt = runtime()?;

    let uid = rt.block_on(import_profile(
        &importer,
        &runner,
        host.notifier.as_ref(),
        url,
    ))?;

    if json {
        print_json(&serde_json::json!({ "uid": uid, "url": url.trim() }))?;
    } else {
        println!("Imported profile {uid}");
    }
    Ok(())
}
