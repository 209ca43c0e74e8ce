pub mod models;
pub mod netlab;
pub mod vsphere;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use models::{
    CloneRequest, Deployment, HostSummary, PodRequest, PowerState, Provisioning, SnapshotRequest,
    UploadRequest, VmSummary,
};

/// Operations the VM commands need from the virtualization platform.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ManagementApi: Send + Sync {
    async fn list_vms(&self) -> Result<Vec<VmSummary>>;
    async fn find_vm(&self, name: &str) -> Result<Option<VmSummary>>;
    async fn list_hosts(&self) -> Result<Vec<HostSummary>>;
    /// Returns the identifier of the new VM.
    async fn clone_vm(&self, request: &CloneRequest) -> Result<String>;
    /// Returns the identifier of the new snapshot.
    async fn create_snapshot(&self, request: &SnapshotRequest) -> Result<String>;
    /// Copies the image to the datastore and, when the request carries a
    /// deployment, registers it as a VM whose identifier is returned.
    async fn upload_image(&self, request: &UploadRequest) -> Result<Option<String>>;
}

/// Operations the pod commands need from the lab-scheduling system.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LabApi: Send + Sync {
    async fn create_pod(&self, request: &PodRequest) -> Result<()>;
    async fn remove_pod(&self, name: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct VsphereSettings {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub insecure: bool,
    pub timeout: Duration,
}

impl VsphereSettings {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetlabSettings {
    pub url: Option<String>,
    pub user: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl NetlabSettings {
    pub fn endpoint(&self) -> &str {
        self.url.as_deref().unwrap_or("<no NETLAB+ URL>")
    }
}

/// Builds remote clients from resolved connection settings.
pub trait ApiFactory: Send + Sync {
    fn management(&self, settings: &VsphereSettings) -> Result<Arc<dyn ManagementApi>>;
    fn lab(&self, settings: &NetlabSettings) -> Result<Arc<dyn LabApi>>;
}

/// Factory for the real HTTP clients. Nothing is contacted until the first
/// call on a returned client.
pub struct HttpApiFactory;

impl ApiFactory for HttpApiFactory {
    fn management(&self, settings: &VsphereSettings) -> Result<Arc<dyn ManagementApi>> {
        Ok(Arc::new(vsphere::VsphereClient::new(settings)?))
    }

    fn lab(&self, settings: &NetlabSettings) -> Result<Arc<dyn LabApi>> {
        Ok(Arc::new(netlab::NetlabClient::new(settings)?))
    }
}
