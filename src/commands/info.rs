use async_trait::async_trait;
use clap::Parser;
use tracing::info;

use super::{parse_tokens, GlobalModifiers, Handler, RemoteArgs, Services};
use crate::api::VmSummary;
use crate::error::{CommandError, Result};

/// Show VMs or hosts known to vSphere
#[derive(Debug, Parser)]
#[command(name = "info", args_override_self = true)]
pub struct InfoArgs {
    /// Show a single VM by name
    #[arg(long, value_name = "VM", conflicts_with = "hosts")]
    pub vm: Option<String>,

    /// List hosts instead of VMs
    #[arg(long)]
    pub hosts: bool,

    #[command(flatten)]
    pub remote: RemoteArgs,
}

pub struct InfoCommand {
    services: Services,
}

impl InfoCommand {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Handler for InfoCommand {
    fn name(&self) -> &'static str {
        "info"
    }

    fn mutating(&self) -> bool {
        false
    }

    async fn execute(&self, tokens: &[String], modifiers: &GlobalModifiers) -> Result<()> {
        let Some(args) = parse_tokens::<InfoArgs>(self.name(), tokens)? else {
            return Ok(());
        };
        let api = self.services.management(&args.remote)?;

        if args.hosts {
            let hosts = api.list_hosts().await.map_err(CommandError::Remote)?;
            info!("Found {} hosts", hosts.len());
            for host in hosts {
                match (&host.connection_state, modifiers.verbose) {
                    (Some(state), true) => println!("{}\t{}\t{}", host.name, host.id, state),
                    _ => println!("{}", host.name),
                }
            }
            return Ok(());
        }

        let vms = match &args.vm {
            Some(name) => {
                let vm = api.find_vm(name).await.map_err(CommandError::Remote)?;
                let vm = vm.ok_or_else(|| {
                    CommandError::Remote(anyhow::anyhow!("VM '{}' not found", name))
                })?;
                vec![vm]
            }
            None => api.list_vms().await.map_err(CommandError::Remote)?,
        };

        info!("Found {} VMs", vms.len());
        for vm in &vms {
            println!("{}", describe(vm, modifiers.verbose));
        }
        Ok(())
    }
}

fn describe(vm: &VmSummary, verbose: bool) -> String {
    let mut line = format!("{}\t{}", vm.name, vm.power_state);
    if let Some(host) = &vm.host {
        line.push('\t');
        line.push_str(host);
    }
    if verbose {
        line.push_str(&format!("\tid={}", vm.id));
        if let Some(cpus) = vm.cpu_count {
            line.push_str(&format!(" cpus={}", cpus));
        }
        if let Some(memory) = vm.memory_mib {
            line.push_str(&format!(" memory={}MiB", memory));
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockManagementApi, PowerState};
    use crate::commands::testing::*;

    fn vm(name: &str) -> VmSummary {
        VmSummary {
            id: "vm-7".to_string(),
            name: name.to_string(),
            power_state: PowerState::PoweredOn,
            cpu_count: Some(4),
            memory_mib: Some(8192),
            host: Some("esx-01".to_string()),
        }
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(&vm("router"), false), "router\ton\tesx-01");
        assert_eq!(
            describe(&vm("router"), true),
            "router\ton\tesx-01\tid=vm-7 cpus=4 memory=8192MiB"
        );
    }

    #[tokio::test]
    async fn test_info_runs_under_dry_run() {
        let mut api = MockManagementApi::new();
        api.expect_find_vm()
            .withf(|name| name == "router")
            .times(1)
            .returning(|name| Ok(Some(vm(name))));

        let command = InfoCommand::new(services(MockFactory::with_management(api)));
        let modifiers = GlobalModifiers {
            verbose: false,
            dry_run: true,
        };
        command
            .execute(&tokens(&["--vm", "router"]), &modifiers)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_vm_is_remote_error() {
        let mut api = MockManagementApi::new();
        api.expect_find_vm().returning(|_| Ok(None));

        let command = InfoCommand::new(services(MockFactory::with_management(api)));
        let err = command
            .execute(&tokens(&["--vm", "ghost"]), &GlobalModifiers::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Remote(_)));
    }

    #[tokio::test]
    async fn test_conflicting_flags() {
        let command = InfoCommand::new(services(std::sync::Arc::new(MockFactory::default())));
        let err = command
            .execute(&tokens(&["--vm", "a", "--hosts"]), &GlobalModifiers::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Option(_)));
    }
}
