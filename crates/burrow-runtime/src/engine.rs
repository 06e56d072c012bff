//! Lifecycle controller.
//!
//! The [`Engine`] owns the runtime configuration, the image store and the
//! network registry, and drives every container operation. The container
//! record on disk is the system of record; the engine holds no other
//! state between calls.

use std::time::{Duration, Instant};

use burrow_common::config::RuntimeConfig;
use burrow_common::error::{BurrowError, Result, StageExt};
use burrow_common::types::{ContainerId, ContainerStatus};
use burrow_core::cgroup::CgroupManager;
use burrow_core::namespace::NamespaceConfig;
use burrow_core::namespace::network as netns;
use burrow_image::storage::ImageStore;
use burrow_network::network::NetnsTarget;
use burrow_network::{Endpoint, Network, NetworkRegistry, endpoint};
use nix::sys::signal::Signal;

use crate::container::{ContainerConfig, ContainerRecord};
use crate::exec::{self, ExecOutput};
use crate::logs;
use crate::process::{self, ContainerProcess, LaunchConfig};
use crate::state;
use crate::workspace::Workspace;

/// How long `stop` waits after SIGTERM before sending SIGKILL.
const STOP_GRACE: Duration = Duration::from_secs(10);

/// Poll interval while waiting for a process to exit.
const EXIT_POLL: Duration = Duration::from_millis(100);

/// Resources created so far by a `run`, undone in reverse if a later
/// step fails.
#[derive(Default)]
struct Provisioned {
    workspace: Option<Workspace>,
    netns: Option<String>,
    process: Option<ContainerProcess>,
    cgroup: Option<CgroupManager>,
    endpoint: Option<Endpoint>,
    record: Option<String>,
}

/// The runtime engine that coordinates all container operations.
#[derive(Debug)]
pub struct Engine {
    config: RuntimeConfig,
    images: ImageStore,
    networks: NetworkRegistry,
}

impl Engine {
    /// Creates an engine, loading the network registry from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted networks cannot be read.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let networks = NetworkRegistry::load(&config).stage("load network registry")?;
        Ok(Self::with_networks(config, networks))
    }

    /// Creates an engine around an already loaded network registry.
    #[must_use]
    pub fn with_networks(config: RuntimeConfig, networks: NetworkRegistry) -> Self {
        Self {
            images: ImageStore::new(&config),
            config,
            networks,
        }
    }

    /// Returns the runtime configuration.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Creates and starts a container.
    ///
    /// Order: workspace, network namespace, init launch, cgroup, network
    /// endpoint, record; only then is the init released. When attached,
    /// waits for the workload to exit and removes every resource it used.
    ///
    /// # Errors
    ///
    /// Returns the failing stage; resources created before it are undone.
    pub fn run(&self, request: &ContainerConfig) -> Result<ContainerRecord> {
        request.validate().stage("validate request")?;
        let id = ContainerId::generate();
        let name = request.name.clone().unwrap_or_else(|| id.to_string());
        if state::exists(&self.config, &name) {
            return Err(BurrowError::AlreadyExists {
                kind: "container",
                id: name,
            });
        }
        if let Some(network) = &request.network {
            let _ = self.networks.get(network).stage("connect network")?;
        }

        let mut done = Provisioned::default();
        let (record, process) = match self.provision(id, &name, request, &mut done) {
            Ok(started) => started,
            Err(e) => {
                self.unwind(done, &name);
                return Err(e);
            }
        };
        tracing::info!(name = %record.name, id = %record.id, pid = record.pid, "container started");

        if !request.attached {
            return Ok(record);
        }
        let waited = process.wait().stage("wait for container");
        if waited.is_err() {
            process.abort();
        }
        self.finish_attached(record, waited)
    }

    /// Releases everything an attached container held once its wait has
    /// ended, whether or not the wait succeeded.
    fn finish_attached(
        &self,
        mut record: ContainerRecord,
        waited: Result<i32>,
    ) -> Result<ContainerRecord> {
        match &waited {
            Ok(code) => tracing::info!(name = %record.name, code, "container exited"),
            Err(e) => tracing::warn!(name = %record.name, error = %e, "lost track of container"),
        }
        self.release_resources(&mut record);
        let deleted = state::delete(&self.config, &record.name).stage("delete container record");
        let _ = waited?;
        deleted?;
        record.status = ContainerStatus::Exited;
        Ok(record)
    }

    fn provision(
        &self,
        id: ContainerId,
        name: &str,
        request: &ContainerConfig,
        done: &mut Provisioned,
    ) -> Result<(ContainerRecord, ContainerProcess)> {
        let workspace = Workspace::build(
            &self.config,
            &self.images,
            &request.image,
            name,
            &request.volumes,
        )
        .stage("build workspace")?;
        done.workspace = Some(workspace.clone());

        if request.network.is_some() {
            netns::create_named(name).stage("create network namespace")?;
            done.netns = Some(name.to_string());
        }
        let netns_path = request.network.as_ref().map(|_| self.config.netns_path(name));

        let launch = LaunchConfig {
            command: request.command.clone(),
            mount_root: workspace.mount_root.clone(),
            hostname: name.to_string(),
            env: request.env.clone(),
            log_path: (!request.attached).then(|| self.config.log_path(name)),
            netns: netns_path.clone(),
            namespaces: NamespaceConfig::default(),
        };
        let process = process::launch(&launch).stage("launch container")?;
        let pid = process.pid();
        let process = done.process.insert(process);

        let cgroup = done
            .cgroup
            .insert(CgroupManager::new(name, self.config.mountinfo.clone()));
        cgroup.configure(&request.limits).stage("configure cgroup")?;
        cgroup.attach(pid).stage("attach cgroup")?;
        let cgroup = cgroup.clone();

        let network = match (&request.network, &netns_path) {
            (Some(network), Some(path)) => {
                let target = NetnsTarget { name, path };
                let ep = self
                    .networks
                    .connect(network, &id, target, request.port_mapping.clone())
                    .stage("connect network")?;
                done.endpoint = Some(ep.clone());
                Some(ep)
            }
            _ => None,
        };

        let record = ContainerRecord {
            id,
            name: name.to_string(),
            pid,
            command: request.command.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
            status: ContainerStatus::Running,
            image: request.image.clone(),
            volumes: request.volumes.clone(),
            port_mapping: request.port_mapping.clone(),
            env: request.env.clone(),
            network,
            cgroup,
            workspace,
        };
        state::save(&self.config, &record).stage("save container record")?;
        done.record = Some(record.name.clone());

        process.send_init(&launch.payload()).stage("release container init")?;
        let process = done
            .process
            .take()
            .ok_or_else(|| BurrowError::config("container init vanished during setup"))?;
        Ok((record, process))
    }

    fn unwind(&self, done: Provisioned, name: &str) {
        tracing::warn!(name, "container setup failed, undoing completed steps");
        if let Some(process) = done.process {
            process.abort();
        }
        if let Some(mut ep) = done.endpoint {
            if let Err(e) = self.networks.disconnect(&mut ep) {
                tracing::warn!(name, error = %e, "endpoint unwind incomplete");
            }
        }
        if let Some(cgroup) = done.cgroup {
            if let Err(e) = cgroup.release() {
                tracing::warn!(name, error = %e, "cgroup unwind incomplete");
            }
        }
        if let Some(ns) = done.netns {
            if let Err(e) = netns::delete_named(&ns) {
                tracing::warn!(name, error = %e, "network namespace unwind failed");
            }
        }
        if let Some(workspace) = done.workspace {
            workspace.teardown();
        }
        if let Some(record) = done.record {
            if let Err(e) = state::delete(&self.config, &record) {
                tracing::warn!(name, error = %e, "record unwind failed");
            }
        }
    }

    /// Starts a stopped or exited container again with its persisted
    /// command, environment, cgroup, and network namespace.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::Config`] if it is already running, or the
    /// failing stage; the record then stays stopped.
    pub fn start_by_name(&self, name: &str) -> Result<ContainerRecord> {
        let mut record = self.load_refreshed(name)?;
        if record.is_running() {
            return Err(BurrowError::config(format!(
                "container {name} is already running"
            )));
        }
        logs::truncate_log(&self.config.log_path(name)).stage("truncate log")?;

        let launch = LaunchConfig {
            command: record.command.clone(),
            mount_root: record.workspace.mount_root.clone(),
            hostname: record.name.clone(),
            env: record.env.clone(),
            log_path: Some(self.config.log_path(name)),
            netns: record.netns_name().map(|ns| self.config.netns_path(ns)),
            namespaces: NamespaceConfig::default(),
        };
        let mut process = process::launch(&launch).stage("launch container")?;

        if let Err(e) = self.activate(&mut record, &mut process, &launch) {
            process.abort();
            if let Some(ep) = record.network.as_mut() {
                if let Err(unwind) = endpoint::remove_port_mapping(ep) {
                    tracing::warn!(name, error = %unwind, "port mapping unwind incomplete");
                }
            }
            record.status = ContainerStatus::Stopped;
            if let Err(unwind) = state::save(&self.config, &record) {
                tracing::warn!(name, error = %unwind, "failed to persist stopped status");
            }
            return Err(e);
        }

        tracing::info!(name, pid = record.pid, "container started");
        Ok(record)
    }

    fn activate(
        &self,
        record: &mut ContainerRecord,
        process: &mut ContainerProcess,
        launch: &LaunchConfig,
    ) -> Result<()> {
        let pid = process.pid();
        record.cgroup.attach(pid).stage("attach cgroup")?;
        if let Some(ep) = record.network.as_mut() {
            endpoint::install_port_mapping(ep).stage("install port mapping")?;
        }
        record.pid = pid;
        record.status = ContainerStatus::Running;
        state::save(&self.config, record).stage("save container record")?;
        process.send_init(&launch.payload()).stage("release container init")
    }

    /// Stops a container: SIGTERM (SIGKILL after a grace period), then
    /// removes its port forwards and marks it stopped. The pid is kept.
    ///
    /// Only a running container is signalled. Stopping a stopped
    /// container changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::NotFound`] for an unknown container or the
    /// failing stage.
    pub fn stop_by_name(&self, name: &str) -> Result<ContainerRecord> {
        let mut record = self.load_refreshed(name)?;
        match record.status {
            ContainerStatus::Running => {
                terminate(record.pid, Signal::SIGTERM, STOP_GRACE).stage("signal container")?;
            }
            ContainerStatus::Stopped => {
                tracing::info!(name, "container already stopped");
                return Ok(record);
            }
            ContainerStatus::Exited => {
                tracing::debug!(name, "container not running, nothing to signal");
            }
        }

        if let Some(ep) = record.network.as_mut() {
            if let Err(e) = endpoint::remove_port_mapping(ep) {
                tracing::warn!(name, error = %e, "failed to remove port mapping");
            }
        }
        record.status = ContainerStatus::Stopped;
        state::save(&self.config, &record).stage("save container record")?;
        tracing::info!(name, pid = record.pid, "container stopped");
        Ok(record)
    }

    /// Stops then starts a container.
    ///
    /// # Errors
    ///
    /// Returns the error of whichever half failed.
    pub fn restart(&self, name: &str) -> Result<ContainerRecord> {
        let _ = self.stop_by_name(name).stage("stop")?;
        self.start_by_name(name).stage("start")
    }

    /// Removes a container and everything it holds: endpoint, network
    /// namespace, cgroup, workspace, and record.
    ///
    /// Resource cleanup is best-effort; the record is deleted even if
    /// some of it fails.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::ContainerRunning`] if the container is
    /// running and `force` is not set; nothing is touched in that case.
    pub fn remove(&self, name: &str, force: bool) -> Result<()> {
        let mut record = self.load_refreshed(name)?;
        if record.is_running() {
            if !force {
                return Err(BurrowError::ContainerRunning {
                    name: name.to_string(),
                });
            }
            terminate(record.pid, Signal::SIGKILL, STOP_GRACE).stage("signal container")?;
        }

        self.release_resources(&mut record);
        state::delete(&self.config, name).stage("delete container record")?;
        tracing::info!(name, "container removed");
        Ok(())
    }

    fn release_resources(&self, record: &mut ContainerRecord) {
        let name = record.name.clone();
        if let Some(ep) = record.network.as_mut() {
            if let Err(e) = self.networks.disconnect(ep) {
                tracing::warn!(name = %name, error = %e, "endpoint cleanup incomplete");
            }
        }
        if let Some(ns) = record.netns_name() {
            if let Err(e) = netns::delete_named(ns) {
                tracing::warn!(name = %name, error = %e, "network namespace cleanup failed");
            }
        }
        if let Err(e) = record.cgroup.release() {
            tracing::warn!(name = %name, error = %e, "cgroup cleanup incomplete");
        }
        record.workspace.teardown();
    }

    /// Every container, oldest first, with vanished processes marked
    /// exited.
    ///
    /// # Errors
    ///
    /// Returns an error if the records cannot be read.
    pub fn list(&self) -> Result<Vec<ContainerRecord>> {
        let mut records = state::list(&self.config)?;
        for record in &mut records {
            self.refresh(record);
        }
        Ok(records)
    }

    /// Loads one container's record.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::NotFound`] if it does not exist.
    pub fn inspect(&self, name: &str) -> Result<ContainerRecord> {
        self.load_refreshed(name)
    }

    /// Returns the container's log.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::NotFound`] for an unknown container.
    pub fn logs(&self, name: &str) -> Result<String> {
        let _ = state::load(&self.config, name)?;
        logs::read_logs(&self.config.log_path(name))
    }

    /// Runs `command` inside a running container.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::Config`] if the container is not running.
    pub fn exec(&self, name: &str, command: &[String]) -> Result<ExecOutput> {
        let record = self.load_refreshed(name)?;
        if !record.is_running() {
            return Err(BurrowError::config(format!("container {name} is not running")));
        }
        exec::exec_in_container(record.pid, command)
    }

    /// Creates a network.
    ///
    /// # Errors
    ///
    /// Returns the registry's error.
    pub fn create_network(&mut self, driver: &str, subnet: &str, name: &str) -> Result<Network> {
        self.networks
            .create_network(driver, subnet, name)
            .stage("create network")
    }

    /// Removes a network.
    ///
    /// # Errors
    ///
    /// Returns the registry's error.
    pub fn remove_network(&mut self, name: &str) -> Result<()> {
        self.networks.remove_network(name).stage("remove network")
    }

    /// Every network, sorted by name.
    #[must_use]
    pub fn list_networks(&self) -> Vec<&Network> {
        self.networks.list()
    }

    fn load_refreshed(&self, name: &str) -> Result<ContainerRecord> {
        let mut record = state::load(&self.config, name)?;
        self.refresh(&mut record);
        Ok(record)
    }

    /// Marks a running record exited if its process is gone.
    fn refresh(&self, record: &mut ContainerRecord) {
        if !record.is_running() || process::is_alive(record.pid) {
            return;
        }
        record.status = ContainerStatus::Exited;
        tracing::info!(name = %record.name, pid = record.pid, "container process has exited");
        if let Err(e) = state::save(&self.config, record) {
            tracing::warn!(name = %record.name, error = %e, "failed to persist exited status");
        }
    }
}

/// Sends `signal` to `pid` and waits up to `grace` for it to go away,
/// escalating to SIGKILL. A process that is already gone is fine.
fn terminate(pid: u32, signal: Signal, grace: Duration) -> Result<()> {
    if !process::signal(pid, Some(signal))? {
        tracing::debug!(pid, "process already gone");
        return Ok(());
    }
    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if !process::is_alive(pid) {
            return Ok(());
        }
        std::thread::sleep(EXIT_POLL);
    }
    tracing::warn!(pid, "process ignored {signal}, killing");
    let _ = process::signal(pid, Some(Signal::SIGKILL))?;
    Ok(())
}
