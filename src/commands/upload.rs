use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use super::{parse_tokens, report_dry_run, GlobalModifiers, Handler, RemoteArgs, Services};
use crate::api::{Deployment, Provisioning, SnapshotRequest, UploadRequest};
use crate::error::{CommandError, Result};
use crate::utils::Checksum;

/// Upload a disk image into a datastore folder, optionally deploy it as a VM
/// on a host and snapshot the result
#[derive(Debug, Parser)]
#[command(name = "upload", args_override_self = true)]
pub struct UploadArgs {
    /// The image to upload
    #[arg(long, value_name = "PATH")]
    pub image: PathBuf,

    /// Destination datastore
    #[arg(long, value_name = "DATASTORE")]
    pub datastore: String,

    /// Datacenter holding the datastore
    #[arg(long, value_name = "DATACENTER")]
    pub datacenter: String,

    /// Destination folder inside the datastore
    #[arg(long, value_name = "FOLDER", default_value = "TestFolder")]
    pub folder: String,

    /// Expected digest, e.g. sha256:<hex>
    #[arg(long, value_name = "ALGORITHM:HEX")]
    pub checksum: Option<String>,

    /// Host to deploy the uploaded image on as a VM
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Name of the deployed VM [default: image file stem]
    #[arg(long, value_name = "NAME", requires = "host")]
    pub name: Option<String>,

    /// Network the deployed VM is attached to
    #[arg(long, value_name = "NETWORK", default_value = "SAFETY NET")]
    pub network: String,

    /// Disk provisioning of the deployed VM
    #[arg(long, value_name = "PROV", value_enum, default_value_t = Provisioning::Thin)]
    pub provisioning: Provisioning,

    /// Snapshot the deployed VM under this name
    #[arg(long, value_name = "NAME", requires = "host")]
    pub snapshot: Option<String>,

    #[command(flatten)]
    pub remote: RemoteArgs,
}

pub struct UploadCommand {
    services: Services,
}

impl UploadCommand {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Handler for UploadCommand {
    fn name(&self) -> &'static str {
        "upload"
    }

    fn mutating(&self) -> bool {
        true
    }

    async fn execute(&self, tokens: &[String], modifiers: &GlobalModifiers) -> Result<()> {
        let Some(args) = parse_tokens::<UploadArgs>(self.name(), tokens)? else {
            return Ok(());
        };

        let checksum = args
            .checksum
            .as_deref()
            .map(str::parse::<Checksum>)
            .transpose()
            .map_err(|e| CommandError::Option(format!("--checksum: {}", e)))?;

        if !args.image.is_file() {
            return Err(CommandError::Option(format!(
                "--image: {} is not a file",
                args.image.display()
            )));
        }

        let request = args.request();
        let settings = args.remote.vsphere(&self.services.config)?;

        if modifiers.dry_run {
            let mut action = format!(
                "upload {} to {} in {} via {}",
                request.image.display(),
                request.datastore_path(),
                request.datacenter,
                settings.endpoint()
            );
            if let Some(deployment) = &request.deployment {
                action.push_str(&format!(
                    ", deploy it as VM '{}' on host {} attached to '{}' ({} provisioning)",
                    deployment.vm_name, deployment.host, deployment.network, deployment.provisioning
                ));
            }
            if let Some(snapshot) = &args.snapshot {
                action.push_str(&format!(" and snapshot it as '{}'", snapshot));
            }
            if checksum.is_some() {
                action.push_str(" after verifying its checksum");
            }
            report_dry_run(&action);
            return Ok(());
        }

        // Nothing reaches the datastore until the image matches
        if let Some(checksum) = checksum {
            let image = request.image.clone();
            tokio::task::spawn_blocking(move || checksum.verify_file(&image))
                .await
                .context("Checksum task did not complete")
                .and_then(|result| result)
                .map_err(CommandError::Remote)?;
        }

        let api = self.services.management(&args.remote)?;
        let vm_id = api
            .upload_image(&request)
            .await
            .map_err(CommandError::Remote)?;
        info!("Uploaded {} to {}", request.image.display(), request.datastore_path());

        let (Some(deployment), Some(vm_id)) = (&request.deployment, vm_id) else {
            return Ok(());
        };
        println!("{}\t{}\t{}", deployment.vm_name, deployment.host, vm_id);

        if let Some(name) = args.snapshot {
            let snapshot = SnapshotRequest {
                vm: deployment.vm_name.clone(),
                name,
                description: Some(format!("Uploaded from {}", request.image.display())),
                memory: false,
            };
            let snapshot_id = api
                .create_snapshot(&snapshot)
                .await
                .map_err(CommandError::Remote)?;
            info!("Snapshot {} of {} created ({})", snapshot.name, snapshot.vm, snapshot_id);
        }
        Ok(())
    }
}

impl UploadArgs {
    fn request(&self) -> UploadRequest {
        let deployment = self.host.as_ref().map(|host| Deployment {
            host: host.clone(),
            vm_name: self.name.clone().unwrap_or_else(|| {
                self.image
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default()
            }),
            network: self.network.clone(),
            provisioning: self.provisioning,
        });

        UploadRequest {
            image: self.image.clone(),
            datacenter: self.datacenter.clone(),
            datastore: self.datastore.clone(),
            folder: self.folder.clone(),
            deployment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockManagementApi;
    use crate::commands::testing::*;
    use std::io::Write;
    use std::sync::Arc;

    fn image() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".vmdk").tempfile().unwrap();
        file.write_all(b"hello").unwrap();
        file
    }

    #[tokio::test]
    async fn test_upload_with_default_folder() {
        let file = image();
        let path = file.path().to_path_buf();
        let expected = path.clone();

        let mut api = MockManagementApi::new();
        api.expect_upload_image()
            .withf(move |req| {
                req.image == expected
                    && req.folder == "TestFolder"
                    && req.datastore == "ds1"
                    && req.deployment.is_none()
            })
            .times(1)
            .returning(|_| Ok(None));
        api.expect_create_snapshot().never();

        let command = UploadCommand::new(services(MockFactory::with_management(api)));
        command
            .execute(
                &tokens(&[
                    "--image",
                    path.to_str().unwrap(),
                    "--datastore",
                    "ds1",
                    "--datacenter",
                    "DC1",
                    "--checksum",
                    "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
                ]),
                &GlobalModifiers::default(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_checksum_mismatch_stops_upload() {
        let file = image();
        let factory = Arc::new(MockFactory::default());
        let command = UploadCommand::new(services(factory.clone()));
        let bad = format!("sha256:{}", "0".repeat(64));

        let err = command
            .execute(
                &tokens(&[
                    "--image",
                    file.path().to_str().unwrap(),
                    "--datastore",
                    "ds1",
                    "--datacenter",
                    "DC1",
                    "--checksum",
                    bad.as_str(),
                ]),
                &GlobalModifiers::default(),
            )
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Checksum mismatch"));
        assert!(factory.vsphere_settings.lock().is_empty());
    }

    #[tokio::test]
    async fn test_missing_image_is_option_error() {
        let command = UploadCommand::new(services(Arc::new(MockFactory::default())));
        let err = command
            .execute(
                &tokens(&["--image", "/nonexistent/disk.vmdk", "--datastore", "ds1", "--datacenter", "DC1"]),
                &GlobalModifiers {
                    verbose: false,
                    dry_run: true,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Option(_)));
    }

    #[tokio::test]
    async fn test_deploy_and_snapshot_after_upload() {
        let file = image();
        let path = file.path().to_path_buf();
        let stem = path.file_stem().unwrap().to_string_lossy().into_owned();
        let expected_name = stem.clone();

        let mut api = MockManagementApi::new();
        api.expect_upload_image()
            .withf(move |req| {
                req.deployment
                    == Some(Deployment {
                        host: "esx-02".to_string(),
                        vm_name: expected_name.clone(),
                        network: "SAFETY NET".to_string(),
                        provisioning: Provisioning::EagerZeroedThick,
                    })
            })
            .times(1)
            .returning(|_| Ok(Some("vm-77".to_string())));
        api.expect_create_snapshot()
            .withf(move |req| req.vm == stem && req.name == "clean" && !req.memory)
            .times(1)
            .returning(|_| Ok("snapshot-1".to_string()));

        let command = UploadCommand::new(services(MockFactory::with_management(api)));
        command
            .execute(
                &tokens(&[
                    "--image",
                    path.to_str().unwrap(),
                    "--datastore",
                    "ds1",
                    "--datacenter",
                    "DC1",
                    "--host",
                    "esx-02",
                    "--provisioning",
                    "eager-zeroed-thick",
                    "--snapshot",
                    "clean",
                ]),
                &GlobalModifiers::default(),
            )
            .await
            .unwrap();
    }

    #[test]
    fn test_snapshot_requires_host() {
        let err = parse_tokens::<UploadArgs>(
            "upload",
            &tokens(&[
                "--image",
                "disk.vmdk",
                "--datastore",
                "ds1",
                "--datacenter",
                "DC1",
                "--snapshot",
                "clean",
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, CommandError::Option(_)));
    }

    #[test]
    fn test_deployment_defaults() {
        let args: UploadArgs = parse_tokens(
            "upload",
            &tokens(&[
                "--image",
                "/images/router.vmdk",
                "--datastore",
                "ds1",
                "--datacenter",
                "DC1",
                "--host",
                "esx-01",
            ]),
        )
        .unwrap()
        .unwrap();

        let deployment = args.request().deployment.unwrap();
        assert_eq!(deployment.vm_name, "router");
        assert_eq!(deployment.network, "SAFETY NET");
        assert_eq!(deployment.provisioning, Provisioning::Thin);
    }
}
