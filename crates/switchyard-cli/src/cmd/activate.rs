use crate::host::{runtime, Host};
use crate::output::print_json;
use serde::Serialize;
use std::path::Path;
use switchyard_core::reconcile::ReconcileReport;
use switchyard_core::{ActivateOptions, ActivationReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Outcome {
    NoOp,
    Duplicate,
    Superseded,
    Committed,
}

impl From<&ActivationReport> for Outcome {
    fn from(report: &ActivationReport) -> Self {
        match report {
            ActivationReport::NoOp => Outcome::NoOp,
            ActivationReport::Duplicate => Outcome::Duplicate,
            ActivationReport::Superseded => Outcome::Superseded,
            ActivationReport::Committed { .. } => Outcome::Committed,
        }
    }
}

/// An activation outcome with its reconciliation pass (if any) awaited.
#[derive(Serialize)]
pub(crate) struct Settled {
    pub outcome: Outcome,
    pub generation: Option<u64>,
    pub partial: bool,
    pub reconciliation: Option<ReconcileReport>,
}

/// Wait for the scheduled reconciliation so it runs before the process exits.
pub(crate) async fn settle(report: ActivationReport) -> Settled {
    let outcome = Outcome::from(&report);
    match report {
        ActivationReport::Committed {
            generation,
            partial,
            reconciliation,
        } => {
            let reconciliation = match reconciliation {
                Some(handle) => match handle.await {
                    Ok(pass) => Some(pass),
                    Err(e) => {
                        tracing::warn!("reconciliation task failed: {e}");
                        None
                    }
                },
                None => None,
            };
            Settled {
                outcome,
                generation: Some(generation),
                partial,
                reconciliation,
            }
        }
        _ => Settled {
            outcome,
            generation: None,
            partial: false,
            reconciliation: None,
        },
    }
}

pub(crate) fn print_settled(profile: &str, settled: &Settled) {
    match settled.outcome {
        Outcome::NoOp => println!("{profile} is already active (use --force to re-apply)"),
        Outcome::Duplicate => println!("{profile} is already being activated"),
        Outcome::Superseded => println!("Activation of {profile} was superseded"),
        Outcome::Committed => {
            let generation = settled.generation.unwrap_or_default();
            if settled.partial {
                println!("Activated {profile} (generation {generation}) with warnings");
            } else {
                println!("Activated {profile} (generation {generation})");
            }
            if let Some(pass) = &settled.reconciliation {
                if !pass.applied.is_empty() {
                    println!("Re-applied {} saved selection(s)", pass.applied.len());
                }
                if pass.seeded > 0 {
                    println!("Recorded {} selection(s) from core state", pass.seeded);
                }
                if pass.recorded > 0 {
                    println!("Remembered {} more group(s) in the profile", pass.recorded);
                }
                for group in &pass.skipped {
                    println!("Skipped {group}: saved member no longer exists");
                }
            }
        }
    }
}

pub fn run(root: &Path, profile: &str, force: bool, quiet: bool, json: bool) -> anyhow::Result<()> {
    let host = Host::open(root, json)?;
    let orch = host.orchestrator()?;
    let rt = runtime()?;

    let settled = rt.block_on(async {
        let report = orch
            .activate(
                profile,
                ActivateOptions {
                    force,
                    notify_success: !quiet,
                },
            )
            .await?;
        anyhow::Ok(settle(report).await)
    })?;

    if json {
        #[derive(Serialize)]
        struct ActivateOutput<'a> {
            profile: &'a str,
            #[serde(flatten)]
            settled: &'a Settled,
        }
        print_json(&ActivateOutput {
            profile,
            settled: &settled,
        })?;
    } else {
        print_settled(profile, &settled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn settled_outcome_serializes_snake_case() {
        let settled = settle(ActivationReport::NoOp).await;
        let value = serde_json::to_value(&settled).unwrap();
        assert_eq!(value["outcome"], "no_op");
        assert_eq!(value["generation"], serde_json::Value::Null);

        let settled = settle(ActivationReport::Committed {
            generation: 4,
            partial: true,
            reconciliation: None,
        })
        .await;
        assert_eq!(settled.outcome, Outcome::Committed);
        let value = serde_json::to_value(&settled).unwrap();
        assert_eq!(value["outcome"], "committed");
        assert_eq!(value["partial"], true);
        assert_eq!(value["generation"], 4);
    }
}
