//! Networks and the registry that owns them.
//!
//! A network is persisted as JSON at `<root>/network/<name>`. The
//! registry is built once per invocation by scanning that directory and
//! is passed to every operation that needs it.

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use burrow_common::config::RuntimeConfig;
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::ContainerId;
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};

use crate::bridge::BridgeDriver;
use crate::driver::NetworkDriver;
use crate::endpoint::{self, Endpoint};
use crate::ipam::Ipam;

/// Longest Linux interface name.
const MAX_DEVICE_NAME: usize = 15;

/// A named subnet bound to one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Random host-unique identifier.
    pub id: String,
    /// Network name, also the device name.
    pub name: String,
    /// Gateway address with the subnet prefix.
    pub ip_range: Ipv4Network,
    /// Driver that created the network.
    pub driver: String,
}

impl Network {
    /// Address of the gateway device.
    #[must_use]
    pub fn gateway(&self) -> Ipv4Addr {
        self.ip_range.ip()
    }

    /// The subnet in canonical form.
    #[must_use]
    pub fn subnet(&self) -> Ipv4Network {
        Ipv4Network::new(self.ip_range.network(), self.ip_range.prefix()).unwrap_or(self.ip_range)
    }
}

/// Where a container's network namespace lives.
#[derive(Debug, Clone, Copy)]
pub struct NetnsTarget<'a> {
    /// Name passed to `ip link set ... netns`.
    pub name: &'a str,
    /// Path of the namespace handle.
    pub path: &'a Path,
}

/// Every known network, the available drivers, and the allocator.
#[derive(Debug)]
pub struct NetworkRegistry {
    dir: PathBuf,
    ipam: Ipam,
    drivers: HashMap<&'static str, Box<dyn NetworkDriver>>,
    networks: BTreeMap<String, Network>,
}

impl NetworkRegistry {
    /// Loads the registry with the built-in drivers.
    ///
    /// # Errors
    ///
    /// Returns an error if the network directory cannot be scanned or a
    /// record cannot be parsed.
    pub fn load(config: &RuntimeConfig) -> Result<Self> {
        Self::with_drivers(config, vec![Box::new(BridgeDriver::new())])
    }

    /// Loads the registry with an explicit driver table.
    ///
    /// # Errors
    ///
    /// Returns an error if the network directory cannot be scanned or a
    /// record cannot be parsed.
    pub fn with_drivers(
        config: &RuntimeConfig,
        drivers: Vec<Box<dyn NetworkDriver>>,
    ) -> Result<Self> {
        let dir = config.network_dir();
        let drivers = drivers.into_iter().map(|d| (d.name(), d)).collect();
        let networks = load_networks(&dir)?;
        tracing::debug!(count = networks.len(), "network registry loaded");
        Ok(Self {
            dir,
            ipam: Ipam::new(config.ipam_path()),
            drivers,
            networks,
        })
    }

    /// Creates network `name` on `subnet` with `driver`.
    ///
    /// The gateway takes the subnet's first allocatable address.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::Config`] for an unknown driver, a bad name
    /// or subnet, [`BurrowError::AlreadyExists`] for a taken name, or the
    /// driver's error. Nothing is left allocated on failure.
    pub fn create_network(&mut self, driver: &str, subnet: &str, name: &str) -> Result<Network> {
        validate_name(name)?;
        if self.networks.contains_key(name) {
            return Err(BurrowError::AlreadyExists {
                kind: "network",
                id: name.to_string(),
            });
        }
        let driver = self.driver(driver)?;
        let subnet: Ipv4Network = subnet
            .parse()
            .map_err(|e| BurrowError::config(format!("invalid subnet {subnet}: {e}")))?;

        let gateway = self.ipam.allocate(&subnet)?;
        let ip_range = Ipv4Network::new(gateway, subnet.prefix())
            .map_err(|e| BurrowError::config(format!("invalid subnet {subnet}: {e}")))?;

        let network = match driver.create(ip_range, name) {
            Ok(network) => network,
            Err(e) => {
                self.release_quietly(&subnet, gateway);
                return Err(e);
            }
        };

        if let Err(e) = self.dump(&network) {
            if let Err(unwind) = driver.delete(&network) {
                tracing::warn!(
                    network = name,
                    error = %unwind,
                    "failed to remove device after save error"
                );
            }
            self.release_quietly(&subnet, gateway);
            return Err(e);
        }

        tracing::info!(network = name, %ip_range, driver = driver.name(), "network created");
        let _ = self.networks.insert(name.to_string(), network.clone());
        Ok(network)
    }

    /// Removes network `name`: device, gateway address, and record.
    ///
    /// Device removal is best-effort. A driver error is logged and the
    /// network is unregistered anyway.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::NotFound`] for an unknown network or an
    /// error deleting its record.
    pub fn remove_network(&mut self, name: &str) -> Result<()> {
        let network = self.get(name)?.clone();
        let device = self
            .driver(&network.driver)
            .and_then(|driver| driver.delete(&network));
        if let Err(e) = device {
            tracing::warn!(network = name, error = %e, "failed to remove network device");
        }
        self.release_quietly(&network.subnet(), network.gateway());

        let path = self.dir.join(name);
        std::fs::remove_file(&path).map_err(|e| BurrowError::io(&path, e))?;
        let _ = self.networks.remove(name);
        tracing::info!(network = name, "network removed");
        Ok(())
    }

    /// Every network, sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<&Network> {
        self.networks.values().collect()
    }

    /// Looks up network `name`.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::NotFound`] if it is not registered.
    pub fn get(&self, name: &str) -> Result<&Network> {
        self.networks.get(name).ok_or_else(|| BurrowError::NotFound {
            kind: "network",
            id: name.to_string(),
        })
    }

    /// Attaches `container` to network `name` inside `netns`, installing
    /// DNAT rules for `port_mapping`.
    ///
    /// Steps already done are undone if a later one fails.
    ///
    /// # Errors
    ///
    /// Returns the first failing step.
    pub fn connect(
        &self,
        name: &str,
        container: &ContainerId,
        netns: NetnsTarget<'_>,
        port_mapping: Vec<String>,
    ) -> Result<Endpoint> {
        let network = self.get(name)?;
        let driver = self.driver(&network.driver)?;
        let subnet = network.subnet();
        let ip = self.ipam.allocate(&subnet)?;
        let mut ep = Endpoint::new(container, network, ip, port_mapping);

        if let Err(e) = driver.connect(network, &ep) {
            self.release_quietly(&subnet, ip);
            return Err(e);
        }

        let wired = driver
            .configure_endpoint(&ep, netns)
            .and_then(|()| endpoint::install_port_mapping(&mut ep));
        if let Err(e) = wired {
            if let Err(unwind) = self.disconnect(&mut ep) {
                tracing::warn!(
                    endpoint = %ep.id,
                    error = %unwind,
                    "unwind after failed connect was incomplete"
                );
            }
            return Err(e);
        }

        tracing::info!(endpoint = %ep.id, network = name, %ip, "endpoint connected");
        Ok(ep)
    }

    /// Detaches an endpoint: deletes its device pair and its DNAT rules
    /// and releases its address.
    ///
    /// Every step is attempted even if an earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered.
    pub fn disconnect(&self, ep: &mut Endpoint) -> Result<()> {
        let mut first_err = None;

        let device = self
            .driver(&ep.network.driver)
            .and_then(|driver| driver.disconnect(&*ep));
        if let Err(e) = device {
            tracing::warn!(endpoint = %ep.id, error = %e, "failed to delete veth pair");
            let _ = first_err.get_or_insert(e);
        }
        if let Err(e) = endpoint::remove_port_mapping(ep) {
            let _ = first_err.get_or_insert(e);
        }
        if let Err(e) = self.ipam.release(&ep.network.subnet(), ep.ip_address) {
            tracing::warn!(endpoint = %ep.id, error = %e, "failed to release address");
            let _ = first_err.get_or_insert(e);
        }

        tracing::info!(endpoint = %ep.id, "endpoint disconnected");
        first_err.map_or(Ok(()), Err)
    }

    fn driver(&self, name: &str) -> Result<&dyn NetworkDriver> {
        self.drivers
            .get(name)
            .map(|driver| &**driver)
            .ok_or_else(|| BurrowError::config(format!("unknown network driver: {name}")))
    }

    fn dump(&self, network: &Network) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| BurrowError::io(&self.dir, e))?;
        let path = self.dir.join(&network.name);
        let json = serde_json::to_string_pretty(network)?;
        std::fs::write(&path, json).map_err(|e| BurrowError::io(&path, e))
    }

    fn release_quietly(&self, subnet: &Ipv4Network, ip: Ipv4Addr) {
        if let Err(e) = self.ipam.release(subnet, ip) {
            tracing::warn!(%subnet, %ip, error = %e, "failed to release address");
        }
    }
}

fn load_networks(dir: &Path) -> Result<BTreeMap<String, Network>> {
    let mut networks = BTreeMap::new();
    if !dir.exists() {
        return Ok(networks);
    }
    let entries = std::fs::read_dir(dir).map_err(|e| BurrowError::io(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| BurrowError::io(dir, e))?.path();
        if path.is_dir() {
            continue;
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| BurrowError::io(&path, e))?;
        let network: Network = serde_json::from_str(&raw)?;
        let _ = networks.insert(network.name.clone(), network);
    }
    Ok(networks)
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_DEVICE_NAME
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(BurrowError::config(format!(
            "invalid network name {name:?}: use up to {MAX_DEVICE_NAME} letters, digits, '-' or '_'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Driver that records calls instead of touching the host.
    #[derive(Debug, Default)]
    struct FakeDriver {
        calls: Arc<Mutex<Vec<String>>>,
        fail_create: bool,
        fail_delete: bool,
        fail_configure: bool,
    }

    impl NetworkDriver for FakeDriver {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn create(&self, ip_range: Ipv4Network, name: &str) -> Result<Network> {
            self.calls.lock().unwrap().push(format!("create {name} {ip_range}"));
            if self.fail_create {
                return Err(BurrowError::config("device refused"));
            }
            Ok(Network {
                id: "feedfacecafe".into(),
                name: name.to_string(),
                ip_range,
                driver: "fake".into(),
            })
        }

        fn delete(&self, network: &Network) -> Result<()> {
            self.calls.lock().unwrap().push(format!("delete {}", network.name));
            if self.fail_delete {
                return Err(BurrowError::config("device busy"));
            }
            Ok(())
        }

        fn connect(&self, _network: &Network, endpoint: &Endpoint) -> Result<()> {
            self.calls.lock().unwrap().push(format!("connect {}", endpoint.id));
            Ok(())
        }

        fn configure_endpoint(&self, endpoint: &Endpoint, netns: NetnsTarget<'_>) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("configure {} {}", endpoint.id, netns.name));
            if self.fail_configure {
                return Err(BurrowError::config("namespace gone"));
            }
            Ok(())
        }

        fn disconnect(&self, endpoint: &Endpoint) -> Result<()> {
            self.calls.lock().unwrap().push(format!("disconnect {}", endpoint.id));
            Ok(())
        }
    }

    fn netns() -> NetnsTarget<'static> {
        NetnsTarget {
            name: "c1",
            path: Path::new("/var/run/netns/c1"),
        }
    }

    fn registry(root: &Path, driver: FakeDriver) -> NetworkRegistry {
        NetworkRegistry::with_drivers(&RuntimeConfig::with_root(root), vec![Box::new(driver)])
            .unwrap()
    }

    #[test]
    fn create_assigns_first_address_as_gateway_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut reg = registry(
            dir.path(),
            FakeDriver {
                calls: Arc::clone(&calls),
                ..FakeDriver::default()
            },
        );

        let net = reg.create_network("fake", "192.168.0.0/24", "testbr").unwrap();
        assert_eq!(net.gateway(), Ipv4Addr::new(192, 168, 0, 1));
        assert_eq!(net.subnet().to_string(), "192.168.0.0/24");
        assert_eq!(calls.lock().unwrap().as_slice(), ["create testbr 192.168.0.1/24"]);

        let reloaded = registry(dir.path(), FakeDriver::default());
        assert_eq!(reloaded.get("testbr").unwrap(), &net);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registry(dir.path(), FakeDriver::default());
        let _ = reg.create_network("fake", "10.0.0.0/24", "dup").unwrap();
        let err = reg.create_network("fake", "10.0.1.0/24", "dup").unwrap_err();
        assert!(matches!(err, BurrowError::AlreadyExists { .. }));
    }

    #[test]
    fn unknown_driver_and_bad_subnet_are_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registry(dir.path(), FakeDriver::default());
        assert!(matches!(
            reg.create_network("overlay", "10.0.0.0/24", "n1").unwrap_err(),
            BurrowError::Config { .. }
        ));
        assert!(matches!(
            reg.create_network("fake", "10.0.0/99", "n1").unwrap_err(),
            BurrowError::Config { .. }
        ));
        assert!(matches!(
            reg.create_network("fake", "10.0.0.0/24", "name-way-too-long").unwrap_err(),
            BurrowError::Config { .. }
        ));
        assert!(reg.list().is_empty());
    }

    #[test]
    fn failed_driver_create_releases_the_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registry(
            dir.path(),
            FakeDriver {
                fail_create: true,
                ..FakeDriver::default()
            },
        );
        assert!(reg.create_network("fake", "10.7.0.0/24", "broken").is_err());

        let ipam = Ipam::new(RuntimeConfig::with_root(dir.path()).ipam_path());
        let subnet: Ipv4Network = "10.7.0.0/24".parse().unwrap();
        assert!(!ipam.is_allocated(&subnet, Ipv4Addr::new(10, 7, 0, 1)).unwrap());
        assert!(!dir.path().join("network/broken").exists());
    }

    #[test]
    fn remove_deletes_device_record_and_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut reg = registry(
            dir.path(),
            FakeDriver {
                calls: Arc::clone(&calls),
                ..FakeDriver::default()
            },
        );
        let _ = reg.create_network("fake", "10.8.0.0/24", "gone").unwrap();
        reg.remove_network("gone").unwrap();

        assert!(calls.lock().unwrap().contains(&"delete gone".to_string()));
        assert!(!dir.path().join("network/gone").exists());
        assert!(matches!(reg.get("gone").unwrap_err(), BurrowError::NotFound { .. }));

        let again = reg.create_network("fake", "10.8.0.0/24", "gone").unwrap();
        assert_eq!(again.gateway(), Ipv4Addr::new(10, 8, 0, 1));
    }

    #[test]
    fn list_is_sorted_and_skips_the_ipam_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registry(dir.path(), FakeDriver::default());
        let _ = reg.create_network("fake", "10.2.0.0/24", "zeta").unwrap();
        let _ = reg.create_network("fake", "10.1.0.0/24", "alpha").unwrap();

        let reloaded = registry(dir.path(), FakeDriver::default());
        let names: Vec<_> = reloaded.list().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["alpha", "zeta"]);
    }

    #[test]
    fn disconnect_releases_the_endpoint_address() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut reg = registry(
            dir.path(),
            FakeDriver {
                calls: Arc::clone(&calls),
                ..FakeDriver::default()
            },
        );
        let net = reg.create_network("fake", "10.4.0.0/24", "ep").unwrap();
        let ip = reg.ipam.allocate(&net.subnet()).unwrap();
        let mut ep = Endpoint::new(&ContainerId::new("0011223344"), &net, ip, Vec::new());

        reg.disconnect(&mut ep).unwrap();
        assert!(!reg.ipam.is_allocated(&net.subnet(), ip).unwrap());
        assert!(calls
            .lock()
            .unwrap()
            .contains(&"disconnect 0011223344-ep".to_string()));
    }

    #[test]
    fn remove_survives_a_failing_device_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registry(
            dir.path(),
            FakeDriver {
                fail_delete: true,
                ..FakeDriver::default()
            },
        );
        let net = reg.create_network("fake", "10.9.0.0/24", "stale").unwrap();

        reg.remove_network("stale").unwrap();
        assert!(matches!(reg.get("stale").unwrap_err(), BurrowError::NotFound { .. }));
        assert!(!dir.path().join("network/stale").exists());
        assert!(!reg.ipam.is_allocated(&net.subnet(), net.gateway()).unwrap());
    }

    #[test]
    fn connect_allocates_after_gateway_and_configures_in_netns() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut reg = registry(
            dir.path(),
            FakeDriver {
                calls: Arc::clone(&calls),
                ..FakeDriver::default()
            },
        );
        let net = reg.create_network("fake", "10.5.0.0/24", "lan").unwrap();
        let id = ContainerId::new("aabbccddee");

        let ep = reg.connect("lan", &id, netns(), Vec::new()).unwrap();
        assert_eq!(ep.ip_address, Ipv4Addr::new(10, 5, 0, 2));
        assert!(reg.ipam.is_allocated(&net.subnet(), ep.ip_address).unwrap());

        let calls = calls.lock().unwrap();
        let connect = calls.iter().position(|c| c == &format!("connect {}", ep.id));
        let configure = calls.iter().position(|c| c == &format!("configure {} c1", ep.id));
        assert!(connect.is_some() && connect < configure, "{calls:?}");
    }

    #[test]
    fn failed_configuration_unwinds_the_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut reg = registry(
            dir.path(),
            FakeDriver {
                calls: Arc::clone(&calls),
                fail_configure: true,
                ..FakeDriver::default()
            },
        );
        let net = reg.create_network("fake", "10.6.0.0/24", "lan").unwrap();
        let id = ContainerId::new("aabbccddee");

        assert!(reg.connect("lan", &id, netns(), Vec::new()).is_err());
        let endpoint_ip = Ipv4Addr::new(10, 6, 0, 2);
        assert!(!reg.ipam.is_allocated(&net.subnet(), endpoint_ip).unwrap());
        assert!(reg.ipam.is_allocated(&net.subnet(), net.gateway()).unwrap());
        assert!(
            calls
                .lock()
                .unwrap()
                .iter()
                .any(|c| c.starts_with("disconnect aabbccddee")),
            "device pair left behind"
        );

        let retry = registry(dir.path(), FakeDriver::default())
            .connect("lan", &id, netns(), Vec::new())
            .unwrap();
        assert_eq!(retry.ip_address, endpoint_ip);
    }
}
