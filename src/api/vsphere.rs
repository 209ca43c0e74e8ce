use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fs::File;
use std::sync::Arc;
use tracing::{debug, info};
use ureq::tls::TlsConfig;
use ureq::{Agent, SendBody};
use url::Url;

use super::{
    CloneRequest, Deployment, HostSummary, ManagementApi, SnapshotRequest, UploadRequest,
    VmSummary, VsphereSettings,
};

const SESSION_HEADER: &str = "vmware-api-session-id";

/// vSphere Automation REST client.
///
/// Calls are blocking `ureq` requests moved onto the blocking pool, so one
/// client can be shared by async handlers.
pub struct VsphereClient {
    inner: Arc<Connection>,
}

struct Connection {
    agent: Agent,
    base: Url,
    user: Option<String>,
    password: Option<String>,
    session: Mutex<Option<String>>,
}

impl VsphereClient {
    pub fn new(settings: &VsphereSettings) -> Result<Self> {
        let base = Url::parse(&format!("https://{}:{}/", settings.host, settings.port))
            .with_context(|| format!("Invalid vSphere endpoint: {}", settings.endpoint()))?;

        let mut config = Agent::config_builder().timeout_global(Some(settings.timeout));
        if settings.insecure {
            config = config.tls_config(TlsConfig::builder().disable_verification(true).build());
        }

        debug!("Prepared vSphere client for {}", base);

        Ok(Self {
            inner: Arc::new(Connection {
                agent: Agent::new_with_config(config.build()),
                base,
                user: settings.user.clone(),
                password: settings.password.clone(),
                session: Mutex::new(None),
            }),
        })
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let connection = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&connection))
            .await
            .context("vSphere request task did not complete")?
    }
}

impl Connection {
    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self
            .base
            .join(path)
            .with_context(|| format!("Invalid API path: {}", path))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Log in on first use and reuse the token afterwards.
    fn session(&self) -> Result<String> {
        let mut session = self.session.lock();
        if let Some(token) = session.as_ref() {
            return Ok(token.clone());
        }

        let user = self.user.as_deref().ok_or_else(|| {
            anyhow!("No vSphere user configured; pass --vsphere-user or set vsphere.user")
        })?;
        let password = self.password.as_deref().ok_or_else(|| {
            anyhow!(
                "No vSphere password configured; set NETLABORIOUS_VSPHERE_PASSWORD or vsphere.password"
            )
        })?;

        let url = self.url("api/session", &[])?;
        let credentials = STANDARD.encode(format!("{}:{}", user, password));
        let response = self
            .agent
            .post(url.as_str())
            .header("Authorization", format!("Basic {}", credentials))
            .send_empty()
            .with_context(|| format!("Failed to log in to vSphere at {}", self.base))?;

        let mut body = response.into_body();
        let token: String = serde_json::from_str(&body.read_to_string()?)
            .context("Unexpected vSphere session response")?;

        debug!("Opened vSphere session as {}", user);
        *session = Some(token.clone());
        Ok(token)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.url(path, query)?;
        let token = self.session()?;
        debug!("GET {}", url);

        let response = self
            .agent
            .get(url.as_str())
            .header(SESSION_HEADER, token.as_str())
            .call()
            .with_context(|| format!("GET {} failed", url.path()))?;

        let mut body = response.into_body();
        serde_json::from_str(&body.read_to_string()?)
            .with_context(|| format!("Unexpected response from {}", url.path()))
    }

    fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        payload: &serde_json::Value,
    ) -> Result<T> {
        let url = self.url(path, query)?;
        let token = self.session()?;
        debug!("POST {} {}", url, payload);

        let response = self
            .agent
            .post(url.as_str())
            .header(SESSION_HEADER, token.as_str())
            .header("Content-Type", "application/json")
            .send(payload.to_string())
            .with_context(|| format!("POST {} failed", url.path()))?;

        let mut body = response.into_body();
        serde_json::from_str(&body.read_to_string()?)
            .with_context(|| format!("Unexpected response from {}", url.path()))
    }

    fn vms_named(&self, name: &str, host_id: Option<&str>) -> Result<Vec<VmSummary>> {
        let mut query = vec![("names", name)];
        if let Some(host_id) = host_id {
            query.push(("hosts", host_id));
        }
        self.get_json("api/vcenter/vm", &query)
    }

    fn list_hosts(&self) -> Result<Vec<HostSummary>> {
        self.get_json("api/vcenter/host", &[])
    }

    fn find_vm(&self, name: &str) -> Result<Option<VmSummary>> {
        let Some(mut vm) = self.vms_named(name, None)?.into_iter().next() else {
            return Ok(None);
        };

        for host in self.list_hosts()? {
            if !self.vms_named(name, Some(&host.id))?.is_empty() {
                vm.host = Some(host.name);
                break;
            }
        }
        Ok(Some(vm))
    }

    fn require_vm(&self, name: &str) -> Result<VmSummary> {
        self.find_vm(name)?
            .ok_or_else(|| anyhow!("VM '{}' not found", name))
    }

    fn host_id(&self, name: &str) -> Result<String> {
        self.list_hosts()?
            .into_iter()
            .find(|host| host.name == name)
            .map(|host| host.id)
            .ok_or_else(|| anyhow!("Host '{}' not found", name))
    }

    fn folder_id(&self, name: &str) -> Result<String> {
        #[derive(serde::Deserialize)]
        struct Folder {
            folder: String,
        }

        let folders: Vec<Folder> = self.get_json(
            "api/vcenter/folder",
            &[("names", name), ("type", "VIRTUAL_MACHINE")],
        )?;
        folders
            .into_iter()
            .next()
            .map(|f| f.folder)
            .ok_or_else(|| anyhow!("VM folder '{}' not found", name))
    }

    /// Identifier of a named datastore or network. The list endpoints key
    /// each entry's identifier by the object kind.
    fn named_id(&self, kind: &str, name: &str) -> Result<String> {
        let items: Vec<serde_json::Value> =
            self.get_json(&format!("api/vcenter/{}", kind), &[("names", name)])?;
        items
            .iter()
            .find_map(|item| item[kind].as_str().map(str::to_string))
            .ok_or_else(|| anyhow!("{} '{}' not found", kind, name))
    }

    fn deploy_image(&self, request: &UploadRequest, deployment: &Deployment) -> Result<String> {
        let host = self.host_id(&deployment.host)?;
        let folder = self.folder_id(&request.folder)?;
        let datastore = self.named_id("datastore", &request.datastore)?;
        let network = self.named_id("network", &deployment.network)?;

        let payload = deploy_payload(request, deployment, &host, &folder, &datastore, &network);
        let vm_id: String = self.post_json("api/vcenter/vm", &[], &payload)?;

        info!(
            "Deployed {} as {} on {} ({})",
            request.datastore_path(),
            deployment.vm_name,
            deployment.host,
            vm_id
        );
        Ok(vm_id)
    }

    fn clone_vm(&self, request: &CloneRequest) -> Result<String> {
        let source = self.require_vm(&request.source_vm)?;
        let mut placement = json!({ "host": self.host_id(&request.host)? });
        if let Some(folder) = &request.folder {
            placement["folder"] = json!(self.folder_id(folder)?);
        }

        let payload = json!({
            "source": source.id,
            "name": request.name,
            "placement": placement,
            "power_on": request.power_on,
        });
        let vm_id: String = self.post_json("api/vcenter/vm", &[("action", "clone")], &payload)?;

        info!("Cloned {} to {} on {} ({})", request.source_vm, request.name, request.host, vm_id);
        Ok(vm_id)
    }

    fn create_snapshot(&self, request: &SnapshotRequest) -> Result<String> {
        let vm = self.require_vm(&request.vm)?;
        let payload = json!({
            "name": request.name,
            "description": request.description.clone().unwrap_or_default(),
            "memory": request.memory,
        });
        let snapshot_id: String =
            self.post_json(&format!("api/vcenter/vm/{}/snapshots", vm.id), &[], &payload)?;

        info!("Created snapshot {} of {} ({})", request.name, request.vm, snapshot_id);
        Ok(snapshot_id)
    }

    fn upload_image(&self, request: &UploadRequest) -> Result<Option<String>> {
        let file = File::open(&request.image)
            .with_context(|| format!("Failed to open image: {}", request.image.display()))?;
        let size = file
            .metadata()
            .with_context(|| format!("Failed to stat image: {}", request.image.display()))?
            .len();

        let remote_path = request.remote_path();
        let mut url = self.url("folder", &[])?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow!("vSphere endpoint cannot carry a file path"))?;
            segments.pop_if_empty();
            for segment in remote_path.split('/') {
                segments.push(segment);
            }
        }
        url.query_pairs_mut()
            .append_pair("dcPath", &request.datacenter)
            .append_pair("dsName", &request.datastore);

        let token = self.session()?;
        info!(
            "Uploading {} ({} bytes) to [{}] {}",
            request.image.display(),
            size,
            request.datastore,
            remote_path
        );

        let progress = ProgressBar::new(size);
        progress.set_style(
            ProgressStyle::with_template("{spinner} {bytes}/{total_bytes} [{wide_bar}] {eta}")?
                .progress_chars("=> "),
        );

        let result = self
            .agent
            .put(url.as_str())
            .header(SESSION_HEADER, token.as_str())
            .header("Content-Type", "application/octet-stream")
            .send(SendBody::from_owned_reader(progress.wrap_read(file)));
        progress.finish_and_clear();

        if let Err(e) = result {
            bail!("Upload of {} failed: {}", request.image.display(), e);
        }

        info!("Upload of {} completed", request.image.display());

        request
            .deployment
            .as_ref()
            .map(|deployment| self.deploy_image(request, deployment))
            .transpose()
    }
}

/// VM creation spec that boots from the uploaded disk on the given network.
fn deploy_payload(
    request: &UploadRequest,
    deployment: &Deployment,
    host: &str,
    folder: &str,
    datastore: &str,
    network: &str,
) -> serde_json::Value {
    json!({
        "name": deployment.vm_name,
        "guest_OS": "OTHER_64",
        "placement": {
            "host": host,
            "folder": folder,
            "datastore": datastore,
        },
        "disks": [{
            "type": "SCSI",
            "backing": {
                "type": "VMDK_FILE",
                "vmdk_file": request.datastore_path(),
            },
        }],
        "nics": [{
            "start_connected": true,
            "backing": {
                "type": "STANDARD_PORTGROUP",
                "network": network,
            },
        }],
        "storage_provisioning": deployment.provisioning,
    })
}

#[async_trait]
impl ManagementApi for VsphereClient {
    async fn list_vms(&self) -> Result<Vec<VmSummary>> {
        self.run(|api| api.get_json("api/vcenter/vm", &[])).await
    }

    async fn find_vm(&self, name: &str) -> Result<Option<VmSummary>> {
        let name = name.to_string();
        self.run(move |api| api.find_vm(&name)).await
    }

    async fn list_hosts(&self) -> Result<Vec<HostSummary>> {
        self.run(|api| api.list_hosts()).await
    }

    async fn clone_vm(&self, request: &CloneRequest) -> Result<String> {
        let request = request.clone();
        self.run(move |api| api.clone_vm(&request)).await
    }

    async fn create_snapshot(&self, request: &SnapshotRequest) -> Result<String> {
        let request = request.clone();
        self.run(move |api| api.create_snapshot(&request)).await
    }

    async fn upload_image(&self, request: &UploadRequest) -> Result<Option<String>> {
        let request = request.clone();
        self.run(move |api| api.upload_image(&request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn settings() -> VsphereSettings {
        VsphereSettings {
            host: "vcenter.lab.local".to_string(),
            port: 8443,
            user: None,
            password: None,
            insecure: false,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_url_building() {
        let client = VsphereClient::new(&settings()).unwrap();
        let url = client
            .inner
            .url("api/vcenter/vm", &[("names", "My VM"), ("hosts", "host-1")])
            .unwrap();

        assert_eq!(
            url.as_str(),
            "https://vcenter.lab.local:8443/api/vcenter/vm?names=My+VM&hosts=host-1"
        );
    }

    #[test]
    fn test_missing_credentials_fail_before_network() {
        let client = VsphereClient::new(&settings()).unwrap();
        let err = client.inner.session().unwrap_err();
        assert!(err.to_string().contains("--vsphere-user"));

        let mut with_user = settings();
        with_user.user = Some("administrator".to_string());
        let client = VsphereClient::new(&with_user).unwrap();
        let err = client.inner.session().unwrap_err();
        assert!(err.to_string().contains("NETLABORIOUS_VSPHERE_PASSWORD"));
    }

    #[test]
    fn test_deploy_payload() {
        let request = UploadRequest {
            image: std::path::PathBuf::from("/images/router.vmdk"),
            datacenter: "DC1".to_string(),
            datastore: "ds1".to_string(),
            folder: "TestFolder".to_string(),
            deployment: None,
        };
        let deployment = Deployment {
            host: "esx-01".to_string(),
            vm_name: "router".to_string(),
            network: "SAFETY NET".to_string(),
            provisioning: crate::api::Provisioning::Thick,
        };

        let payload = deploy_payload(
            &request,
            &deployment,
            "host-9",
            "group-v3",
            "datastore-7",
            "network-12",
        );
        assert_eq!(payload["name"], "router");
        assert_eq!(payload["placement"]["host"], "host-9");
        assert_eq!(payload["placement"]["datastore"], "datastore-7");
        assert_eq!(payload["disks"][0]["backing"]["vmdk_file"], "[ds1] TestFolder/router.vmdk");
        assert_eq!(payload["nics"][0]["backing"]["network"], "network-12");
        assert_eq!(payload["storage_provisioning"], "thick");
    }

    #[test]
    fn test_invalid_host_rejected() {
        let mut bad = settings();
        bad.host = "bad host name".to_string();
        assert!(VsphereClient::new(&bad).is_err());
    }
}
