use crate::host::{runtime, Host};
use crate::output::print_json;
use async_trait::async_trait;
use clap::Subcommand;
use std::path::Path;
use std::sync::Arc;
use switchyard_core::config::ServiceConfig;
use switchyard_core::service::{ServiceControl, ServiceManager, ServiceOperation, ServiceOutcome};

#[derive(Subcommand)]
pub enum ServiceSubcommand {
    /// Install the background service that runs the core
    Install,
    /// Reinstall the service and restart the core
    Reinstall,
    /// Stop the core and remove the service
    Uninstall,
}

impl ServiceSubcommand {
    fn operation(&self) -> ServiceOperation {
        match self {
            ServiceSubcommand::Install => ServiceOperation::Install,
            ServiceSubcommand::Reinstall => ServiceOperation::Reinstall,
            ServiceSubcommand::Uninstall => ServiceOperation::Uninstall,
        }
    }
}

// ---------------------------------------------------------------------------
// CommandControl: runs the argv lists from `service:` in config.yaml
// ---------------------------------------------------------------------------

struct CommandControl {
    config: ServiceConfig,
}

impl CommandControl {
    async fn exec(&self, name: &str, argv: &[String]) -> Result<std::process::ExitStatus, String> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| format!("no `{name}` command configured"))?;
        tracing::debug!(name, program, ?args, "running service command");
        tokio::process::Command::new(program)
            .args(args)
            .status()
            .await
            .map_err(|e| format!("failed to run {program}: {e}"))
    }

    async fn run(&self, name: &str, argv: &[String]) -> Result<(), String> {
        let status = self.exec(name, argv).await?;
        if status.success() {
            Ok(())
        } else {
            Err(format!("`{name}` command exited with {status}"))
        }
    }
}

#[async_trait]
impl ServiceControl for CommandControl {
    async fn install(&self) -> Result<(), String> {
        self.run("install", &self.config.install).await
    }

    async fn reinstall(&self) -> Result<(), String> {
        self.run("reinstall", &self.config.reinstall).await
    }

    async fn uninstall(&self) -> Result<(), String> {
        self.run("uninstall", &self.config.uninstall).await
    }

    async fn stop_core(&self) -> Result<(), String> {
        self.run("stop_core", &self.config.stop_core).await
    }

    async fn restart_core(&self) -> Result<(), String> {
        self.run("restart_core", &self.config.restart_core).await
    }

    async fn is_installed(&self) -> Result<bool, String> {
        Ok(self.exec("status", &self.config.status).await?.success())
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: ServiceSubcommand, json: bool) -> anyhow::Result<()> {
    let host = Host::open(root, json)?;
    let control = Arc::new(CommandControl {
        config: host.config.service.clone(),
    });
    let manager = ServiceManager::new(control, host.notifier.clone(), host.config.service.clone());
    let rt = runtime()?;

    let outcome = rt.block_on(manager.run(subcmd.operation()))?;
    let report = match outcome {
        ServiceOutcome::Busy => anyhow::bail!("another service operation is already running"),
        ServiceOutcome::Completed(report) => report,
    };

    if json {
        return print_json(&report);
    }
    for step in &report.skipped_steps {
        println!("Skipped {step}");
    }
    let state = if report.installed {
        "installed"
    } else {
        "not installed"
    };
    if report.verified {
        println!("Service is {state}");
    } else {
        println!("Service is {state} (state could not be verified)");
    }
    Ok(())
}
