use crate::host::{runtime, Host};
use crate::output::{print_json, print_table};
use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use switchyard_core::backend::ProxyGroup;

#[derive(Serialize)]
struct CoreStatus {
    url: String,
    reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    groups: Vec<ProxyGroup>,
}

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let host = Host::open(root, json)?;
    let doc = host.store.snapshot().context("failed to read profiles")?;
    let client = host.client()?;
    let rt = runtime()?;

    let core = rt.block_on(async {
        let url = client.base_url().to_string();
        let version = match client.version().await {
            Ok(v) => v.version,
            Err(e) => {
                tracing::debug!("controller unreachable: {e}");
                return CoreStatus {
                    url,
                    reachable: false,
                    version: None,
                    error: Some(e.to_string()),
                    groups: Vec::new(),
                };
            }
        };
        let (groups, error) = match client.groups().await {
            Ok(groups) => (groups, None),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };
        CoreStatus {
            url,
            reachable: true,
            version: Some(version),
            error,
            groups,
        }
    });

    if json {
        return print_json(&serde_json::json!({
            "current": doc.current,
            "profiles": doc.items,
            "core": core,
        }));
    }

    if doc.items.is_empty() {
        println!("No profiles. Import one with: switchyard import <url>");
    } else {
        let rows = doc
            .items
            .iter()
            .map(|item| {
                let marker = if doc.current.as_ref() == Some(&item.uid) {
                    "*"
                } else {
                    ""
                };
                vec![
                    marker.to_string(),
                    item.uid.to_string(),
                    item.name.clone(),
                    item.selected.len().to_string(),
                ]
            })
            .collect();
        print_table(&["", "UID", "NAME", "SELECTIONS"], rows);
    }

    println!();
    match &core.version {
        Some(version) => println!("Core: {version} at {}", core.url),
        None => println!(
            "Core: unreachable at {} ({})",
            core.url,
            core.error.as_deref().unwrap_or("unknown error")
        ),
    }
    if !core.groups.is_empty() {
        let rows = core
            .groups
            .iter()
            .map(|g| {
                vec![
                    g.name.clone(),
                    format!("{:?}", g.kind),
                    g.now.clone().unwrap_or_else(|| "-".to_string()),
                ]
            })
            .collect();
        print_table(&["GROUP", "KIND", "NOW"], rows);
    }
    Ok(())
}
