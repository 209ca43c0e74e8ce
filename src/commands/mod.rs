pub mod clone;
pub mod info;
pub mod pod;
pub mod snapshot;
pub mod upload;

use async_trait::async_trait;
use clap::error::ErrorKind;
use clap::{Args, Parser};
use std::sync::Arc;
use tracing::debug;

use crate::api::{ApiFactory, LabApi, ManagementApi, NetlabSettings, VsphereSettings};
use crate::config::Config;
use crate::error::{CommandError, Result};
use crate::utils::parse_duration;

/// Process-wide switches fixed at start-up and shared read-only with every
/// handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobalModifiers {
    pub verbose: bool,
    pub dry_run: bool,
}

/// One named operation reachable from the command line or a batch line.
///
/// `tokens` are the option tokens after the command name, with any batch
/// defaults already in front.
#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the operation changes remote state and must honour dry-run.
    fn mutating(&self) -> bool;

    async fn execute(&self, tokens: &[String], modifiers: &GlobalModifiers) -> Result<()>;
}

/// Fixed table of handlers, looked up by command name.
pub struct CommandRegistry {
    handlers: Vec<Box<dyn Handler>>,
}

impl CommandRegistry {
    pub fn new(handlers: Vec<Box<dyn Handler>>) -> Self {
        Self { handlers }
    }

    /// The clone/info/snapshot/upload/mkpod/rmpod set.
    pub fn standard(services: Services) -> Self {
        Self::new(vec![
            Box::new(info::InfoCommand::new(services.clone())),
            Box::new(clone::CloneCommand::new(services.clone())),
            Box::new(snapshot::SnapshotCommand::new(services.clone())),
            Box::new(upload::UploadCommand::new(services.clone())),
            Box::new(pod::MkpodCommand::new(services.clone())),
            Box::new(pod::RmpodCommand::new(services)),
        ])
    }

    pub fn lookup(&self, name: &str) -> Result<&dyn Handler> {
        self.handlers
            .iter()
            .find(|handler| handler.name() == name)
            .map(|handler| handler.as_ref())
            .ok_or_else(|| CommandError::NotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|handler| handler.name()).collect()
    }
}

/// Configuration and client construction shared by the handlers.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub factory: Arc<dyn ApiFactory>,
}

impl Services {
    pub fn new(config: Config, factory: Arc<dyn ApiFactory>) -> Self {
        Self {
            config: Arc::new(config),
            factory,
        }
    }

    pub fn management(&self, remote: &RemoteArgs) -> Result<Arc<dyn ManagementApi>> {
        let settings = remote.vsphere(&self.config)?;
        debug!("Connecting to vSphere at {}", settings.endpoint());
        self.factory
            .management(&settings)
            .map_err(CommandError::Remote)
    }

    pub fn lab(&self, remote: &RemoteArgs) -> Result<Arc<dyn LabApi>> {
        let settings = remote.netlab(&self.config)?;
        self.factory.lab(&settings).map_err(CommandError::Remote)
    }
}

/// Connection options every command accepts, so an `ARGS` line can set
/// them once for a whole batch.
#[derive(Debug, Clone, Default, Args)]
pub struct RemoteArgs {
    /// vSphere host [default: localhost]
    #[arg(long, value_name = "HOST")]
    pub vsphere_host: Option<String>,

    /// vSphere port [default: 443]
    #[arg(long, value_name = "PORT")]
    pub vsphere_port: Option<u16>,

    /// vSphere username
    #[arg(long, value_name = "USER")]
    pub vsphere_user: Option<String>,

    /// NETLAB+ base URL
    #[arg(long, value_name = "URL")]
    pub netlab_url: Option<String>,

    /// NETLAB+ username recorded as pod owner
    #[arg(long, value_name = "USER")]
    pub netlab_user: Option<String>,

    /// Request timeout, e.g. 30s or 5m
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<String>,
}

impl RemoteArgs {
    pub fn vsphere(&self, config: &Config) -> Result<VsphereSettings> {
        let timeout = self.timeout.as_deref().unwrap_or(&config.vsphere.timeout);
        Ok(VsphereSettings {
            host: self
                .vsphere_host
                .clone()
                .unwrap_or_else(|| config.vsphere.host.clone()),
            port: self.vsphere_port.unwrap_or(config.vsphere.port),
            user: self
                .vsphere_user
                .clone()
                .or_else(|| config.vsphere.user.clone()),
            password: config.vsphere.password.clone(),
            insecure: config.vsphere.insecure,
            timeout: parse_timeout(timeout)?,
        })
    }

    pub fn netlab(&self, config: &Config) -> Result<NetlabSettings> {
        let timeout = self.timeout.as_deref().unwrap_or(&config.netlab.timeout);
        Ok(NetlabSettings {
            url: self.netlab_url.clone().or_else(|| config.netlab.url.clone()),
            user: self.netlab_user.clone().or_else(|| config.netlab.user.clone()),
            api_key: config.netlab.api_key.clone(),
            timeout: parse_timeout(timeout)?,
        })
    }
}

fn parse_timeout(value: &str) -> Result<std::time::Duration> {
    parse_duration(value).map_err(|e| CommandError::Option(format!("--timeout: {}", e)))
}

/// Parse a handler's tokens with its clap definition.
///
/// Returns `Ok(None)` when the tokens asked for help and it was printed.
pub fn parse_tokens<P: Parser>(command: &str, tokens: &[String]) -> Result<Option<P>> {
    let argv = std::iter::once(command).chain(tokens.iter().map(String::as_str));
    match P::try_parse_from(argv) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{}", e);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Stdout line for an action suppressed by `--dry-run`.
pub fn report_dry_run(action: &str) {
    println!("[dry-run] would {}", action);
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::api::{MockLabApi, MockManagementApi};
    use parking_lot::Mutex;

    /// Factory handing out prepared mocks and recording the settings it saw.
    #[derive(Default)]
    pub struct MockFactory {
        pub management: Mutex<Option<MockManagementApi>>,
        pub lab: Mutex<Option<MockLabApi>>,
        pub vsphere_settings: Mutex<Vec<VsphereSettings>>,
    }

    impl MockFactory {
        pub fn with_management(api: MockManagementApi) -> Arc<Self> {
            let factory = Self::default();
            *factory.management.lock() = Some(api);
            Arc::new(factory)
        }

        pub fn with_lab(api: MockLabApi) -> Arc<Self> {
            let factory = Self::default();
            *factory.lab.lock() = Some(api);
            Arc::new(factory)
        }
    }

    impl ApiFactory for MockFactory {
        fn management(&self, settings: &VsphereSettings) -> anyhow::Result<Arc<dyn ManagementApi>> {
            self.vsphere_settings.lock().push(settings.clone());
            let api = self
                .management
                .lock()
                .take()
                .ok_or_else(|| anyhow::anyhow!("unexpected vSphere connection"))?;
            Ok(Arc::new(api))
        }

        fn lab(&self, _settings: &NetlabSettings) -> anyhow::Result<Arc<dyn LabApi>> {
            let api = self
                .lab
                .lock()
                .take()
                .ok_or_else(|| anyhow::anyhow!("unexpected NETLAB+ connection"))?;
            Ok(Arc::new(api))
        }
    }

    pub fn services(factory: Arc<MockFactory>) -> Services {
        Services::new(Config::default(), factory)
    }

    pub fn tokens(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }
}
