//! Linux bridge driver.
//!
//! A network is a bridge device named after the network, holding the
//! gateway address, with a MASQUERADE rule for its subnet. Endpoints are
//! veth pairs whose host end is enslaved to the bridge.

use std::path::Path;

use burrow_common::constants;
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::random_hex;
use ipnetwork::Ipv4Network;

use crate::driver::NetworkDriver;
use crate::endpoint::{self, Endpoint};
use crate::firewall::{self, Chain};
use crate::network::{NetnsTarget, Network};

/// Driver name recorded on networks it creates.
pub const DRIVER_NAME: &str = "bridge";

const SYS_CLASS_NET: &str = "/sys/class/net";

/// Bridge driver backed by `ip` and `iptables`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BridgeDriver;

impl BridgeDriver {
    /// Creates the driver.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl NetworkDriver for BridgeDriver {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn create(&self, ip_range: Ipv4Network, name: &str) -> Result<Network> {
        if link_exists(name) {
            return Err(BurrowError::AlreadyExists {
                kind: "network device",
                id: name.to_string(),
            });
        }

        let _ = crate::ip(&["link", "add", name, "type", "bridge"])?;
        if let Err(e) = configure_bridge(name, ip_range) {
            if let Err(unwind) = delete_link(name) {
                tracing::warn!(bridge = name, error = %unwind, "failed to remove half-built bridge");
            }
            return Err(e);
        }

        tracing::info!(bridge = name, %ip_range, "bridge created");
        Ok(Network {
            id: random_hex(constants::NETWORK_ID_LEN),
            name: name.to_string(),
            ip_range,
            driver: DRIVER_NAME.to_string(),
        })
    }

    fn delete(&self, network: &Network) -> Result<()> {
        let spec = firewall::masquerade_spec(&network.ip_range);
        if let Err(e) = firewall::delete(Chain::Postrouting, &spec) {
            tracing::warn!(network = %network.name, error = %e, "failed to remove masquerade rule");
        }
        if !link_exists(&network.name) {
            tracing::warn!(bridge = %network.name, "bridge already gone");
            return Ok(());
        }
        delete_link(&network.name)?;
        tracing::info!(bridge = %network.name, "bridge deleted");
        Ok(())
    }

    fn connect(&self, network: &Network, endpoint: &Endpoint) -> Result<()> {
        let host = endpoint.device.host.as_str();
        let peer = endpoint.device.peer.as_str();

        let _ = crate::ip(&["link", "add", host, "type", "veth", "peer", "name", peer])?;
        let attach = crate::ip(&["link", "set", host, "master", &network.name])
            .and_then(|_| crate::ip(&["link", "set", host, "up"]));
        if let Err(e) = attach {
            if let Err(unwind) = delete_link(host) {
                tracing::warn!(veth = host, error = %unwind, "failed to remove half-built veth pair");
            }
            return Err(e);
        }

        tracing::debug!(veth = host, peer, bridge = %network.name, "veth attached to bridge");
        Ok(())
    }

    fn configure_endpoint(&self, endpoint: &Endpoint, netns: NetnsTarget<'_>) -> Result<()> {
        endpoint::configure_container_network(endpoint, netns.name, netns.path)
    }

    fn disconnect(&self, endpoint: &Endpoint) -> Result<()> {
        if !link_exists(&endpoint.device.host) {
            tracing::debug!(veth = %endpoint.device.host, "veth pair already gone");
            return Ok(());
        }
        delete_link(&endpoint.device.host)?;
        tracing::debug!(veth = %endpoint.device.host, "veth pair deleted");
        Ok(())
    }
}

fn configure_bridge(name: &str, ip_range: Ipv4Network) -> Result<()> {
    let _ = crate::ip(&["addr", "add", &ip_range.to_string(), "dev", name])?;
    let _ = crate::ip(&["link", "set", name, "up"])?;
    firewall::append(Chain::Postrouting, &firewall::masquerade_spec(&ip_range))
}

fn link_exists(name: &str) -> bool {
    Path::new(SYS_CLASS_NET).join(name).exists()
}

fn delete_link(name: &str) -> Result<()> {
    let _ = crate::ip(&["link", "delete", name])?;
    Ok(())
}
