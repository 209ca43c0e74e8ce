use async_trait::async_trait;
use clap::Parser;
use tracing::info;

use super::{parse_tokens, report_dry_run, GlobalModifiers, Handler, RemoteArgs, Services};
use crate::api::PodRequest;
use crate::error::{CommandError, Result};

/// Create a set of NETLAB+ pods and map each one to a VM
#[derive(Debug, Parser)]
#[command(name = "mkpod", args_override_self = true)]
pub struct MkpodArgs {
    /// Name of a pod to create; repeat for several pods
    #[arg(long, value_name = "NAME", required = true)]
    pub name: Vec<String>,

    /// VM to attach to the pod of the same position
    #[arg(long, value_name = "VM", required = true)]
    pub vm: Vec<String>,

    #[command(flatten)]
    pub remote: RemoteArgs,
}

impl MkpodArgs {
    /// Pair the i-th `--name` with the i-th `--vm`.
    fn requests(&self) -> Result<Vec<PodRequest>> {
        if self.name.len() != self.vm.len() {
            return Err(CommandError::Option(format!(
                "{} pod names but {} VMs; give one --vm per --name",
                self.name.len(),
                self.vm.len()
            )));
        }

        Ok(self
            .name
            .iter()
            .zip(&self.vm)
            .map(|(name, vm)| PodRequest {
                name: name.clone(),
                vm: vm.clone(),
            })
            .collect())
    }
}

/// Delete a set of NETLAB+ pods
#[derive(Debug, Parser)]
#[command(name = "rmpod", args_override_self = true)]
pub struct RmpodArgs {
    /// Name of a pod to remove; repeat for several pods
    #[arg(long, value_name = "NAME", required = true)]
    pub name: Vec<String>,

    #[command(flatten)]
    pub remote: RemoteArgs,
}

pub struct MkpodCommand {
    services: Services,
}

impl MkpodCommand {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Handler for MkpodCommand {
    fn name(&self) -> &'static str {
        "mkpod"
    }

    fn mutating(&self) -> bool {
        true
    }

    async fn execute(&self, tokens: &[String], modifiers: &GlobalModifiers) -> Result<()> {
        let Some(args) = parse_tokens::<MkpodArgs>(self.name(), tokens)? else {
            return Ok(());
        };
        let requests = args.requests()?;
        let settings = args.remote.netlab(&self.services.config)?;

        if modifiers.dry_run {
            for request in &requests {
                report_dry_run(&format!(
                    "create pod '{}' for VM '{}' via {}",
                    request.name,
                    request.vm,
                    settings.endpoint()
                ));
            }
            return Ok(());
        }

        let api = self.services.lab(&args.remote)?;
        for request in &requests {
            api.create_pod(request).await.map_err(CommandError::Remote)?;
            info!("Pod {} created for {}", request.name, request.vm);
        }
        Ok(())
    }
}

pub struct RmpodCommand {
    services: Services,
}

impl RmpodCommand {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Handler for RmpodCommand {
    fn name(&self) -> &'static str {
        "rmpod"
    }

    fn mutating(&self) -> bool {
        true
    }

    async fn execute(&self, tokens: &[String], modifiers: &GlobalModifiers) -> Result<()> {
        let Some(args) = parse_tokens::<RmpodArgs>(self.name(), tokens)? else {
            return Ok(());
        };
        let settings = args.remote.netlab(&self.services.config)?;

        if modifiers.dry_run {
            for name in &args.name {
                report_dry_run(&format!("remove pod '{}' via {}", name, settings.endpoint()));
            }
            return Ok(());
        }

        let api = self.services.lab(&args.remote)?;
        for name in &args.name {
            api.remove_pod(name).await.map_err(CommandError::Remote)?;
            info!("Pod {} removed", name);
        }
        Ok(())
    }
}
