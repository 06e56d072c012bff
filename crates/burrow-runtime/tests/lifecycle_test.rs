//! Lifecycle tests that drive the engine against persisted records
//! without cloning real containers.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use burrow_common::config::RuntimeConfig;
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{ContainerId, ContainerStatus};
use burrow_core::cgroup::{CgroupManager, Controller, Subsystem};
use burrow_network::{Endpoint, NetnsTarget, Network, NetworkDriver, NetworkRegistry};
use burrow_runtime::container::{ContainerConfig, ContainerRecord};
use burrow_runtime::engine::Engine;
use burrow_runtime::state;
use burrow_runtime::workspace::Workspace;
use ipnetwork::Ipv4Network;

/// A pid that cannot exist (above the kernel's pid limit).
const DEAD_PID: u32 = 999_999_999;

fn engine(root: &Path) -> Engine {
    Engine::new(RuntimeConfig::with_root(root)).unwrap()
}

/// Saves a record whose workspace and cgroup live entirely under `root`.
fn seed(engine: &Engine, name: &str, pid: u32, status: ContainerStatus) -> ContainerRecord {
    let cfg = engine.config();
    let workspace = Workspace::layout(cfg, cfg.read_only_dir().join("busybox"), name);
    std::fs::create_dir_all(&workspace.write_layer).unwrap();
    std::fs::write(workspace.write_layer.join("scratch.txt"), "data").unwrap();
    std::fs::create_dir_all(&workspace.work_layer).unwrap();
    std::fs::create_dir_all(&workspace.mount_root).unwrap();

    let group = cfg.root().join("cgroup/memory").join(name);
    std::fs::create_dir_all(&group).unwrap();
    let mut cgroup = CgroupManager::new(name, "/nonexistent/mountinfo");
    cgroup.controllers.push(Controller {
        subsystem: Subsystem::Memory,
        path: group,
        active: false,
    });

    let record = ContainerRecord {
        id: ContainerId::new("0a1b2c3d4e"),
        name: name.to_string(),
        pid,
        command: vec!["sleep".into(), "1000".into()],
        created_at: chrono::Utc::now().to_rfc3339(),
        status,
        image: "busybox".into(),
        volumes: Vec::new(),
        port_mapping: Vec::new(),
        env: Vec::new(),
        network: None,
        cgroup,
        workspace,
    };
    state::save(cfg, &record).unwrap();
    record
}

#[test]
fn removing_running_container_without_force_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let record = seed(&engine, "busy", std::process::id(), ContainerStatus::Running);

    let err = engine.remove("busy", false).unwrap_err();
    assert!(matches!(
        err.root_cause(),
        BurrowError::ContainerRunning { name } if name == "busy"
    ));

    let kept = state::load(engine.config(), "busy").unwrap();
    assert_eq!(kept.status, ContainerStatus::Running);
    assert!(record.workspace.write_layer.join("scratch.txt").is_file());
    assert!(record.cgroup.controllers[0].path.is_dir());
}

#[test]
fn removing_stopped_container_releases_everything() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let record = seed(&engine, "done", DEAD_PID, ContainerStatus::Stopped);

    engine.remove("done", false).unwrap();

    assert!(!state::exists(engine.config(), "done"));
    assert!(!record.workspace.write_layer.exists());
    assert!(!record.workspace.work_layer.exists());
    assert!(!record.cgroup.controllers[0].path.exists());
    assert!(!engine.config().container_dir("done").exists());
}

#[test]
fn stop_marks_stopped_and_keeps_pid() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let _ = seed(&engine, "web", DEAD_PID, ContainerStatus::Running);

    let stopped = engine.stop_by_name("web").unwrap();
    assert_eq!(stopped.status, ContainerStatus::Stopped);
    assert_eq!(stopped.pid, DEAD_PID);

    let persisted = state::load(engine.config(), "web").unwrap();
    assert_eq!(persisted.status, ContainerStatus::Stopped);
    assert_eq!(persisted.pid, DEAD_PID);
}

/// Spawns a process that stands in for whatever reused a container's pid.
fn bystander() -> std::process::Child {
    std::process::Command::new("sleep").arg("30").spawn().unwrap()
}

#[test]
fn stopping_stopped_container_leaves_its_old_pid_alone() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let mut other = bystander();
    let _ = seed(&engine, "idle", other.id(), ContainerStatus::Stopped);

    let record = engine.stop_by_name("idle").unwrap();
    assert_eq!(record.status, ContainerStatus::Stopped);
    assert!(other.try_wait().unwrap().is_none(), "bystander was signalled");

    other.kill().unwrap();
    let _ = other.wait().unwrap();
}

#[test]
fn stopping_exited_container_signals_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let mut other = bystander();
    let _ = seed(&engine, "ended", other.id(), ContainerStatus::Exited);

    let record = engine.stop_by_name("ended").unwrap();
    assert_eq!(record.status, ContainerStatus::Stopped);
    assert_eq!(record.pid, other.id());
    assert!(other.try_wait().unwrap().is_none(), "bystander was signalled");

    other.kill().unwrap();
    let _ = other.wait().unwrap();
}

#[test]
fn list_marks_vanished_processes_exited() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let _ = seed(&engine, "gone", DEAD_PID, ContainerStatus::Running);
    let _ = seed(&engine, "alive", std::process::id(), ContainerStatus::Running);

    let records = engine.list().unwrap();
    let status = |name: &str| {
        records
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.status)
            .unwrap()
    };
    assert_eq!(status("gone"), ContainerStatus::Exited);
    assert_eq!(status("alive"), ContainerStatus::Running);
    assert_eq!(
        state::load(engine.config(), "gone").unwrap().status,
        ContainerStatus::Exited
    );
}

#[test]
fn starting_running_container_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let _ = seed(&engine, "busy", std::process::id(), ContainerStatus::Running);

    let err = engine.start_by_name("busy").unwrap_err();
    assert!(matches!(err, BurrowError::Config { .. }));
}

#[test]
fn exec_requires_running_container() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let _ = seed(&engine, "idle", DEAD_PID, ContainerStatus::Stopped);

    let err = engine.exec("idle", &["ls".into()]).unwrap_err();
    assert!(matches!(err, BurrowError::Config { .. }));
}

#[test]
fn logs_read_back_container_output() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let _ = seed(&engine, "chatty", DEAD_PID, ContainerStatus::Exited);
    std::fs::write(engine.config().log_path("chatty"), "hello\nworld\n").unwrap();

    assert_eq!(engine.logs("chatty").unwrap(), "hello\nworld\n");
    assert!(matches!(
        engine.logs("nobody").unwrap_err(),
        BurrowError::NotFound { .. }
    ));
}

#[test]
fn run_with_missing_image_leaves_no_record() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let request = ContainerConfig {
        name: Some("ghost".into()),
        image: "nothing-here".into(),
        command: vec!["sh".into()],
        ..ContainerConfig::default()
    };

    let err = engine.run(&request).unwrap_err();
    assert!(matches!(err, BurrowError::Stage { stage: "build workspace", .. }));
    assert!(!state::exists(engine.config(), "ghost"));
    assert!(!engine.config().write_layer("ghost").exists());
}

#[test]
fn run_rejects_duplicate_name_and_unknown_network() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let _ = seed(&engine, "taken", DEAD_PID, ContainerStatus::Stopped);

    let mut request = ContainerConfig {
        name: Some("taken".into()),
        image: "busybox".into(),
        command: vec!["sh".into()],
        ..ContainerConfig::default()
    };
    assert!(matches!(
        engine.run(&request).unwrap_err(),
        BurrowError::AlreadyExists { .. }
    ));

    request.name = Some("fresh".into());
    request.network = Some("nowhere".into());
    let err = engine.run(&request).unwrap_err();
    assert!(matches!(err.root_cause(), BurrowError::NotFound { kind: "network", .. }));
    assert!(!engine.config().container_dir("fresh").exists());
}

#[derive(Debug)]
struct LoopbackDriver;

impl NetworkDriver for LoopbackDriver {
    fn name(&self) -> &'static str {
        "loopback"
    }

    fn create(&self, ip_range: Ipv4Network, name: &str) -> Result<Network> {
        Ok(Network {
            id: "c0ffee000001".into(),
            name: name.to_string(),
            ip_range,
            driver: "loopback".into(),
        })
    }

    fn delete(&self, _network: &Network) -> Result<()> {
        Ok(())
    }

    fn connect(&self, _network: &Network, _endpoint: &Endpoint) -> Result<()> {
        Ok(())
    }

    fn configure_endpoint(&self, _endpoint: &Endpoint, _netns: NetnsTarget<'_>) -> Result<()> {
        Ok(())
    }

    fn disconnect(&self, _endpoint: &Endpoint) -> Result<()> {
        Ok(())
    }
}

#[test]
fn networks_are_managed_through_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let config = RuntimeConfig::with_root(dir.path());
    let registry = NetworkRegistry::with_drivers(&config, vec![Box::new(LoopbackDriver)]).unwrap();
    let mut engine = Engine::with_networks(config, registry);

    let lab = engine.create_network("loopback", "10.20.0.0/24", "lab").unwrap();
    assert_eq!(lab.gateway().to_string(), "10.20.0.1");
    let _ = engine.create_network("loopback", "10.30.0.0/24", "edge").unwrap();

    let names: Vec<_> = engine.list_networks().iter().map(|n| n.name.clone()).collect();
    assert_eq!(names, ["edge", "lab"]);

    engine.remove_network("lab").unwrap();
    let remaining: Vec<PathBuf> = std::fs::read_dir(engine.config().network_dir())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.is_file())
        .collect();
    assert_eq!(remaining.len(), 1);
    assert!(matches!(
        engine.remove_network("lab").unwrap_err().root_cause(),
        BurrowError::NotFound { .. }
    ));
}
