use anyhow::anyhow;
use async_trait::async_trait;
use clap::Parser;
use tracing::{info, warn};
use uuid::Uuid;

use super::{parse_tokens, report_dry_run, GlobalModifiers, Handler, RemoteArgs, Services};
use crate::api::{CloneRequest, ManagementApi, SnapshotRequest};
use crate::error::{CommandError, Result};

/// Clone an existing VM to one host, or to every other host
#[derive(Debug, Parser)]
#[command(name = "clone", args_override_self = true)]
pub struct CloneArgs {
    /// The VM to clone
    #[arg(long, value_name = "VM")]
    pub source_vm: String,

    /// Name of the clone [default: <source>-clone-<id>]
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,

    /// Destination host; omit to clone onto every host except the source's
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Destination VM folder
    #[arg(long, value_name = "FOLDER")]
    pub folder: Option<String>,

    /// Snapshot each clone under this name once it exists
    #[arg(long, value_name = "NAME")]
    pub snapshot: Option<String>,

    /// Power the clone on after creation
    #[arg(long)]
    pub power_on: bool,

    #[command(flatten)]
    pub remote: RemoteArgs,
}

pub struct CloneCommand {
    services: Services,
}

impl CloneCommand {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    async fn target_hosts(
        &self,
        api: &dyn ManagementApi,
        source_vm: &str,
        host: Option<&str>,
    ) -> Result<Vec<String>> {
        if let Some(host) = host {
            return Ok(vec![host.to_string()]);
        }

        let source = api
            .find_vm(source_vm)
            .await
            .map_err(CommandError::Remote)?
            .ok_or_else(|| CommandError::Remote(anyhow!("VM '{}' not found", source_vm)))?;
        if source.host.is_none() {
            warn!("Could not tell which host {} lives on; cloning to all hosts", source_vm);
        }

        let targets: Vec<String> = api
            .list_hosts()
            .await
            .map_err(CommandError::Remote)?
            .into_iter()
            .map(|h| h.name)
            .filter(|name| Some(name) != source.host.as_ref())
            .collect();

        if targets.is_empty() {
            return Err(CommandError::Remote(anyhow!(
                "No hosts other than the source host to clone {} onto",
                source_vm
            )));
        }
        Ok(targets)
    }
}

fn default_clone_name(source_vm: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-clone-{}", source_vm, &id[..8])
}

#[async_trait]
impl Handler for CloneCommand {
    fn name(&self) -> &'static str {
        "clone"
    }

    fn mutating(&self) -> bool {
        true
    }

    async fn execute(&self, tokens: &[String], modifiers: &GlobalModifiers) -> Result<()> {
        let Some(args) = parse_tokens::<CloneArgs>(self.name(), tokens)? else {
            return Ok(());
        };
        let source_vm = args.source_vm.clone();
        let base_name = args
            .name
            .clone()
            .unwrap_or_else(|| default_clone_name(&source_vm));

        if modifiers.dry_run {
            let settings = args.remote.vsphere(&self.services.config)?;
            let target = match &args.host {
                Some(host) => format!("host {}", host),
                None => "every other host".to_string(),
            };
            let mut action = format!(
                "clone VM '{}' as '{}' onto {} via {}",
                source_vm,
                base_name,
                target,
                settings.endpoint()
            );
            if let Some(snapshot) = &args.snapshot {
                action.push_str(&format!(" and snapshot it as '{}'", snapshot));
            }
            report_dry_run(&action);
            return Ok(());
        }

        let api = self.services.management(&args.remote)?;
        let hosts = self
            .target_hosts(api.as_ref(), &source_vm, args.host.as_deref())
            .await?;

        for host in &hosts {
            let name = if hosts.len() > 1 {
                format!("{}-{}", base_name, host)
            } else {
                base_name.clone()
            };
            info!("Cloning {} to {} on host {}", source_vm, name, host);

            let request = CloneRequest {
                source_vm: source_vm.clone(),
                name: name.clone(),
                host: host.clone(),
                folder: args.folder.clone(),
                power_on: args.power_on,
            };
            let vm_id = api.clone_vm(&request).await.map_err(CommandError::Remote)?;
            println!("{}\t{}\t{}", name, host, vm_id);

            if let Some(snapshot) = &args.snapshot {
                let request = SnapshotRequest {
                    vm: name.clone(),
                    name: snapshot.clone(),
                    description: Some(format!("Clone of {}", source_vm)),
                    memory: false,
                };
                api.create_snapshot(&request)
                    .await
                    .map_err(CommandError::Remote)?;
            }
        }

        Ok(())
    }
}
