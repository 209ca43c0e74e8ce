use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub vsphere: VsphereConfig,
    #[serde(default)]
    pub netlab: NetlabConfig,
}

/// vSphere endpoint and credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VsphereConfig {
    #[serde(default = "default_vsphere_host")]
    pub host: String,
    #[serde(default = "default_vsphere_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Skip TLS certificate verification (self-signed vCenter certificates)
    #[serde(default)]
    pub insecure: bool,
    #[serde(default = "default_timeout")]
    pub timeout: String,
}

/// NETLAB+ endpoint and credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetlabConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout: String,
}

fn default_vsphere_host() -> String {
    "localhost".to_string()
}

fn default_vsphere_port() -> u16 {
    443
}

fn default_timeout() -> String {
    "60s".to_string()
}

impl Default for VsphereConfig {
    fn default() -> Self {
        Self {
            host: default_vsphere_host(),
            port: default_vsphere_port(),
            user: None,
            password: None,
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

impl Default for NetlabConfig {
    fn default() -> Self {
        Self {
            url: None,
            user: None,
            api_key: None,
            timeout: default_timeout(),
        }
    }
}
