use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::Parser;
use tracing::info;

use super::{parse_tokens, report_dry_run, GlobalModifiers, Handler, RemoteArgs, Services};
use crate::api::SnapshotRequest;
use crate::error::{CommandError, Result};

/// Take a snapshot of a VM
#[derive(Debug, Parser)]
#[command(name = "snapshot", args_override_self = true)]
pub struct SnapshotArgs {
    /// The VM to snapshot
    #[arg(long, value_name = "VM")]
    pub vm: String,

    /// Snapshot name [default: snapshot-<UTC timestamp>]
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,

    /// Free-form description stored with the snapshot
    #[arg(long, value_name = "TEXT")]
    pub description: Option<String>,

    /// Include the VM's memory in the snapshot
    #[arg(long)]
    pub memory: bool,

    #[command(flatten)]
    pub remote: RemoteArgs,
}

impl SnapshotArgs {
    fn into_request(self, now: DateTime<Utc>) -> SnapshotRequest {
        SnapshotRequest {
            name: self
                .name
                .unwrap_or_else(|| format!("snapshot-{}", now.format("%Y%m%d-%H%M%S"))),
            vm: self.vm,
            description: self.description,
            memory: self.memory,
        }
    }
}

pub struct SnapshotCommand {
    services: Services,
}

impl SnapshotCommand {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Handler for SnapshotCommand {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    fn mutating(&self) -> bool {
        true
    }

    async fn execute(&self, tokens: &[String], modifiers: &GlobalModifiers) -> Result<()> {
        let Some(args) = parse_tokens::<SnapshotArgs>(self.name(), tokens)? else {
            return Ok(());
        };
        let remote = args.remote.clone();
        let request = args.into_request(Utc::now());

        if modifiers.dry_run {
            let settings = remote.vsphere(&self.services.config)?;
            report_dry_run(&format!(
                "snapshot VM '{}' as '{}'{} via {}",
                request.vm,
                request.name,
                if request.memory { " including memory" } else { "" },
                settings.endpoint()
            ));
            return Ok(());
        }

        let api = self.services.management(&remote)?;
        let snapshot_id = api
            .create_snapshot(&request)
            .await
            .map_err(CommandError::Remote)?;

        info!("Snapshot {} of {} created", request.name, request.vm);
        println!("{}\t{}\t{}", request.vm, request.name, snapshot_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockManagementApi;
    use crate::commands::testing::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    #[test]
    fn test_default_snapshot_name() {
        let args: SnapshotArgs = parse_tokens("snapshot", &tokens(&["--vm", "router"]))
            .unwrap()
            .unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        let request = args.into_request(now);

        assert_eq!(request.name, "snapshot-20240309-140500");
        assert_eq!(request.vm, "router");
        assert!(!request.memory);
    }

    #[tokio::test]
    async fn test_snapshot_calls_api() {
        let mut api = MockManagementApi::new();
        api.expect_create_snapshot()
            .withf(|req| {
                req.vm == "router" && req.name == "baseline" && req.memory
                    && req.description.as_deref() == Some("before lab 3")
            })
            .times(1)
            .returning(|_| Ok("snapshot-12".to_string()));

        let command = SnapshotCommand::new(services(MockFactory::with_management(api)));
        command
            .execute(
                &tokens(&[
                    "--vm",
                    "router",
                    "--name",
                    "baseline",
                    "--memory",
                    "--description",
                    "before lab 3",
                ]),
                &GlobalModifiers::default(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_dry_run_skips_api() {
        let factory = Arc::new(MockFactory::default());
        let command = SnapshotCommand::new(services(factory.clone()));
        command
            .execute(
                &tokens(&["--vm", "router"]),
                &GlobalModifiers {
                    verbose: true,
                    dry_run: true,
                },
            )
            .await
            .unwrap();
        assert!(factory.vsphere_settings.lock().is_empty());
    }
}
