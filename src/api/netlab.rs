use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};
use ureq::Agent;
use url::Url;

use super::{LabApi, NetlabSettings, PodRequest};

/// NETLAB+ pod management client.
pub struct NetlabClient {
    inner: Arc<Connection>,
}

struct Connection {
    agent: Agent,
    base: Option<Url>,
    user: Option<String>,
    api_key: Option<String>,
}

impl NetlabClient {
    pub fn new(settings: &NetlabSettings) -> Result<Self> {
        let base = match settings.url.as_deref() {
            Some(raw) => {
                let mut url =
                    Url::parse(raw).with_context(|| format!("Invalid NETLAB+ URL: {}", raw))?;
                if !url.path().ends_with('/') {
                    let path = format!("{}/", url.path());
                    url.set_path(&path);
                }
                Some(url)
            }
            None => None,
        };

        let config = Agent::config_builder()
            .timeout_global(Some(settings.timeout))
            .build();

        Ok(Self {
            inner: Arc::new(Connection {
                agent: Agent::new_with_config(config),
                base,
                user: settings.user.clone(),
                api_key: settings.api_key.clone(),
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
            .context("NETLAB+ request task did not complete")?
    }
}

impl Connection {
    fn pods_url(&self, pod: Option<&str>) -> Result<Url> {
        let base = self
            .base
            .as_ref()
            .ok_or_else(|| anyhow!("No NETLAB+ URL configured; pass --netlab-url or set netlab.url"))?;
        let mut url = base.join("api/pods")?;
        if let Some(pod) = pod {
            url.path_segments_mut()
                .map_err(|_| anyhow!("NETLAB+ URL cannot carry a pod name"))?
                .push(pod);
        }
        Ok(url)
    }

    fn authorization(&self) -> Result<String> {
        let key = self.api_key.as_deref().ok_or_else(|| {
            anyhow!("No NETLAB+ API key configured; set NETLABORIOUS_NETLAB_API_KEY or netlab.api_key")
        })?;
        Ok(format!("Bearer {}", key))
    }

    fn create_pod(&self, request: &PodRequest) -> Result<()> {
        let url = self.pods_url(None)?;
        let mut payload = serde_json::to_value(request)?;
        if let Some(user) = &self.user {
            payload["owner"] = serde_json::Value::String(user.clone());
        }
        debug!("POST {} {}", url, payload);

        self.agent
            .post(url.as_str())
            .header("Authorization", self.authorization()?)
            .header("Content-Type", "application/json")
            .send(payload.to_string())
            .with_context(|| format!("Failed to create pod '{}'", request.name))?;

        info!("Created pod {} for VM {}", request.name, request.vm);
        Ok(())
    }

    fn remove_pod(&self, name: &str) -> Result<()> {
        let url = self.pods_url(Some(name))?;
        debug!("DELETE {}", url);

        self.agent
            .delete(url.as_str())
            .header("Authorization", self.authorization()?)
            .call()
            .with_context(|| format!("Failed to remove pod '{}'", name))?;

        info!("Removed pod {}", name);
        Ok(())
    }
}

#[async_trait]
impl LabApi for NetlabClient {
    async fn create_pod(&self, request: &PodRequest) -> Result<()> {
        let request = request.clone();
        self.run(move |api| api.create_pod(&request)).await
    }

    async fn remove_pod(&self, name: &str) -> Result<()> {
        let name = name.to_string();
        self.run(move |api| api.remove_pod(&name)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn settings(url: Option<&str>) -> NetlabSettings {
        NetlabSettings {
            url: url.map(str::to_string),
            user: None,
            api_key: None,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_pod_urls_keep_base_path() {
        let client = NetlabClient::new(&settings(Some("https://netlab.example.edu/lab"))).unwrap();

        let url = client.inner.pods_url(None).unwrap();
        assert_eq!(url.as_str(), "https://netlab.example.edu/lab/api/pods");

        let url = client.inner.pods_url(Some("pod 7")).unwrap();
        assert_eq!(url.as_str(), "https://netlab.example.edu/lab/api/pods/pod%207");
    }

    #[test]
    fn test_missing_url_and_key() {
        let client = NetlabClient::new(&settings(None)).unwrap();
        assert!(client
            .inner
            .pods_url(None)
            .unwrap_err()
            .to_string()
            .contains("--netlab-url"));
        assert!(client.inner.authorization().is_err());
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(NetlabClient::new(&settings(Some("not a url"))).is_err());
    }
}
