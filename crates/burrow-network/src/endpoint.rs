//! A container's attachment to a network.

use std::net::Ipv4Addr;
use std::path::Path;

use burrow_common::error::Result;
use burrow_common::types::ContainerId;
use burrow_core::namespace::network::run_in_netns;
use serde::{Deserialize, Serialize};

use crate::firewall::{self, Chain};
use crate::network::Network;

/// Characters of the endpoint id used in device names.
const DEVICE_ID_LEN: usize = 5;

/// Prefix of the container-side device name.
const PEER_PREFIX: &str = "cif-";

/// The two ends of a veth pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VethPair {
    /// End enslaved to the bridge, left in the host namespace.
    pub host: String,
    /// End moved into the container namespace.
    pub peer: String,
}

impl VethPair {
    /// Derives device names from an endpoint id.
    #[must_use]
    pub fn for_endpoint(endpoint_id: &str) -> Self {
        let short: String = endpoint_id.chars().take(DEVICE_ID_LEN).collect();
        Self {
            peer: format!("{PEER_PREFIX}{short}"),
            host: short,
        }
    }
}

/// One container plugged into one network.
///
/// Stored inside the container record as a snapshot; the installed
/// firewall rules are kept so they can be removed exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// `<container id>-<network name>`.
    pub id: String,
    /// Device pair joining the container to the bridge.
    pub device: VethPair,
    /// Address allocated to the container.
    pub ip_address: Ipv4Addr,
    /// Network the endpoint belongs to.
    pub network: Network,
    /// Declared `hostPort:containerPort` mappings.
    pub port_mapping: Vec<String>,
    /// DNAT rule specs currently installed for the mappings.
    pub ipt_rules: Vec<String>,
}

impl Endpoint {
    /// Builds the endpoint of `container` on `network` with address `ip`.
    #[must_use]
    pub fn new(
        container: &ContainerId,
        network: &Network,
        ip_address: Ipv4Addr,
        port_mapping: Vec<String>,
    ) -> Self {
        let id = format!("{container}-{}", network.name);
        Self {
            device: VethPair::for_endpoint(&id),
            id,
            ip_address,
            network: network.clone(),
            port_mapping,
            ipt_rules: Vec::new(),
        }
    }

    /// Container address with the network prefix, e.g. `10.0.0.2/24`.
    #[must_use]
    pub fn address_with_prefix(&self) -> String {
        format!("{}/{}", self.ip_address, self.network.ip_range.prefix())
    }
}

/// Moves the peer device into the named namespace and configures it
/// from inside: address, link up, loopback up, default route via the
/// gateway.
///
/// The in-namespace steps run on a dedicated thread that enters the
/// namespace and restores its original one on every exit path.
///
/// # Errors
///
/// Returns the first failing step.
pub fn configure_container_network(
    endpoint: &Endpoint,
    netns_name: &str,
    netns_path: &Path,
) -> Result<()> {
    let peer = endpoint.device.peer.as_str();
    let _ = crate::ip(&["link", "set", peer, "netns", netns_name])?;

    let address = endpoint.address_with_prefix();
    let gateway = endpoint.network.gateway().to_string();
    run_in_netns(netns_path, || {
        let _ = crate::ip(&["addr", "add", &address, "dev", peer])?;
        let _ = crate::ip(&["link", "set", peer, "up"])?;
        let _ = crate::ip(&["link", "set", "lo", "up"])?;
        let _ = crate::ip(&["route", "add", "default", "via", &gateway, "dev", peer])?;
        Ok(())
    })?;

    tracing::info!(
        endpoint = %endpoint.id,
        netns = netns_name,
        address = %address,
        "container network configured"
    );
    Ok(())
}

/// Parses `hostPort:containerPort`.
#[must_use]
pub fn parse_port_mapping(mapping: &str) -> Option<(u16, u16)> {
    let (host, container) = mapping.split_once(':')?;
    if container.contains(':') {
        return None;
    }
    Some((host.trim().parse().ok()?, container.trim().parse().ok()?))
}

/// DNAT rule specs for every well-formed mapping; malformed ones are
/// logged and skipped.
#[must_use]
pub fn dnat_rules(ip: Ipv4Addr, mappings: &[String]) -> Vec<String> {
    mappings
        .iter()
        .filter_map(|mapping| match parse_port_mapping(mapping) {
            Some((host, container)) => Some(firewall::dnat_spec(host, ip, container)),
            None => {
                tracing::warn!(mapping, "skipping malformed port mapping");
                None
            }
        })
        .collect()
}

/// Installs the DNAT rules of the endpoint's port mappings and records
/// each one that was added.
///
/// # Errors
///
/// Returns the first rule `iptables` rejects; rules added before it stay
/// recorded.
pub fn install_port_mapping(endpoint: &mut Endpoint) -> Result<()> {
    for spec in dnat_rules(endpoint.ip_address, &endpoint.port_mapping) {
        if endpoint.ipt_rules.contains(&spec) {
            continue;
        }
        firewall::append(Chain::Prerouting, &spec)?;
        endpoint.ipt_rules.push(spec);
    }
    Ok(())
}

/// Deletes every recorded DNAT rule. Rules that could not be deleted
/// stay recorded.
///
/// # Errors
///
/// Returns the first deletion error after attempting all rules.
pub fn remove_port_mapping(endpoint: &mut Endpoint) -> Result<()> {
    let mut first_err = None;
    let mut kept = Vec::new();
    for spec in endpoint.ipt_rules.drain(..) {
        if let Err(e) = firewall::delete(Chain::Prerouting, &spec) {
            tracing::warn!(rule = %spec, error = %e, "failed to delete port mapping rule");
            let _ = first_err.get_or_insert(e);
            kept.push(spec);
        }
    }
    endpoint.ipt_rules = kept;
    first_err.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> Network {
        Network {
            id: "0123456789ab".into(),
            name: "testbr".into(),
            ip_range: "192.168.10.1/24".parse().unwrap(),
            driver: "bridge".into(),
        }
    }

    #[test]
    fn endpoint_names_devices_from_its_id() {
        let ep = Endpoint::new(
            &ContainerId::new("a1b2c3d4e5"),
            &network(),
            Ipv4Addr::new(192, 168, 10, 2),
            Vec::new(),
        );
        assert_eq!(ep.id, "a1b2c3d4e5-testbr");
        assert_eq!(ep.device.host, "a1b2c");
        assert_eq!(ep.device.peer, "cif-a1b2c");
        assert_eq!(ep.address_with_prefix(), "192.168.10.2/24");
    }

    #[test]
    fn port_mapping_parsing() {
        assert_eq!(parse_port_mapping("8080:80"), Some((8080, 80)));
        assert_eq!(parse_port_mapping("8080"), None);
        assert_eq!(parse_port_mapping("1:2:3"), None);
        assert_eq!(parse_port_mapping("http:80"), None);
        assert_eq!(parse_port_mapping("70000:80"), None);
    }

    #[test]
    fn malformed_mappings_are_skipped() {
        let mappings = vec!["8080:80".to_string(), "bogus".to_string(), "2222:22".to_string()];
        let rules = dnat_rules(Ipv4Addr::new(10, 0, 0, 5), &mappings);
        assert_eq!(
            rules,
            vec![
                "-p tcp -m tcp --dport 8080 -j DNAT --to-destination 10.0.0.5:80",
                "-p tcp -m tcp --dport 2222 -j DNAT --to-destination 10.0.0.5:22",
            ]
        );
    }

    #[test]
    fn removing_no_rules_is_a_no_op() {
        let mut ep = Endpoint::new(
            &ContainerId::new("a1b2c3d4e5"),
            &network(),
            Ipv4Addr::new(192, 168, 10, 2),
            vec!["80:80".into()],
        );
        remove_port_mapping(&mut ep).unwrap();
        assert!(ep.ipt_rules.is_empty());
    }

    #[test]
    fn endpoint_round_trips_through_json() {
        let mut ep = Endpoint::new(
            &ContainerId::new("ffeeddccbb"),
            &network(),
            Ipv4Addr::new(192, 168, 10, 9),
            vec!["8080:80".into()],
        );
        ep.ipt_rules = dnat_rules(ep.ip_address, &ep.port_mapping);
        let json = serde_json::to_string(&ep).unwrap();
        let back: Endpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ep);
    }
}
