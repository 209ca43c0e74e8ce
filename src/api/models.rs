use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmSummary {
    #[serde(rename = "vm")]
    pub id: String,
    pub name: String,
    pub power_state: PowerState,
    #[serde(default)]
    pub cpu_count: Option<u32>,
    #[serde(default, rename = "memory_size_MiB")]
    pub memory_mib: Option<u64>,
    /// Host the VM is registered on, when the API was asked for it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PowerState::PoweredOn => "on",
            PowerState::PoweredOff => "off",
            PowerState::Suspended => "suspended",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSummary {
    #[serde(rename = "host")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub connection_state: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CloneRequest {
    pub source_vm: String,
    pub name: String,
    pub host: String,
    pub folder: Option<String>,
    pub power_on: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRequest {
    pub vm: String,
    pub name: String,
    pub description: Option<String>,
    pub memory: bool,
}

/// Disk format of a VM deployed from an uploaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum Provisioning {
    #[default]
    Thin,
    Thick,
    #[value(name = "eager-zeroed-thick")]
    EagerZeroedThick,
}

impl fmt::Display for Provisioning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Provisioning::Thin => "thin",
            Provisioning::Thick => "thick",
            Provisioning::EagerZeroedThick => "eager-zeroed-thick",
        };
        f.write_str(text)
    }
}

/// Where the image becomes a VM once it is on the datastore.
#[derive(Debug, Clone, PartialEq)]
pub struct Deployment {
    pub host: String,
    pub vm_name: String,
    pub network: String,
    pub provisioning: Provisioning,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub image: PathBuf,
    pub datacenter: String,
    pub datastore: String,
    pub folder: String,
    /// Register the uploaded image as a VM; `None` only copies the file.
    pub deployment: Option<Deployment>,
}

impl UploadRequest {
    /// Datastore-relative destination, e.g. `TestFolder/disk.vmdk`.
    pub fn remote_path(&self) -> String {
        let file_name = self
            .image
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let folder = self.folder.trim_matches('/');
        if folder.is_empty() {
            file_name
        } else {
            format!("{}/{}", folder, file_name)
        }
    }

    /// Datastore path in vSphere notation, e.g. `[ds1] TestFolder/disk.vmdk`.
    pub fn datastore_path(&self) -> String {
        format!("[{}] {}", self.datastore, self.remote_path())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PodRequest {
    pub name: String,
    pub vm: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_summary_from_api_json() {
        let json = r#"[{"vm":"vm-42","name":"lab-base","power_state":"POWERED_OFF","cpu_count":2,"memory_size_MiB":4096}]"#;
        let vms: Vec<VmSummary> = serde_json::from_str(json).unwrap();

        assert_eq!(vms.len(), 1);
        assert_eq!(vms[0].id, "vm-42");
        assert_eq!(vms[0].power_state, PowerState::PoweredOff);
        assert_eq!(vms[0].memory_mib, Some(4096));
        assert_eq!(vms[0].host, None);
    }

    #[test]
    fn test_remote_path() {
        let mut request = UploadRequest {
            image: PathBuf::from("/images/router.vmdk"),
            datacenter: "DC1".to_string(),
            datastore: "ds1".to_string(),
            folder: "/TestFolder/".to_string(),
            deployment: None,
        };
        assert_eq!(request.remote_path(), "TestFolder/router.vmdk");
        assert_eq!(request.datastore_path(), "[ds1] TestFolder/router.vmdk");

        request.folder = String::new();
        assert_eq!(request.remote_path(), "router.vmdk");
    }

    #[test]
    fn test_provisioning_wire_names() {
        assert_eq!(serde_json::to_value(Provisioning::Thin).unwrap(), "thin");
        assert_eq!(
            serde_json::to_value(Provisioning::EagerZeroedThick).unwrap(),
            "eagerZeroedThick"
        );
        assert_eq!(Provisioning::default().to_string(), "thin");
    }
}
