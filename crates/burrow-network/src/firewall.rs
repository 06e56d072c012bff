//! iptables NAT rules.
//!
//! Rules live in the `nat` table. A rule is stored as its match/target
//! arguments (everything after `-A <chain>`), which is enough to delete
//! it again with `-D`.

use std::fmt;
use std::net::Ipv4Addr;

use burrow_common::command;
use burrow_common::error::Result;
use ipnetwork::Ipv4Network;

const NAT_TABLE: &str = "nat";

/// Chains of the `nat` table Burrow writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chain {
    /// Destination NAT for published ports.
    Prerouting,
    /// Source NAT for outbound container traffic.
    Postrouting,
}

impl Chain {
    fn as_str(self) -> &'static str {
        match self {
            Self::Prerouting => "PREROUTING",
            Self::Postrouting => "POSTROUTING",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule masquerading traffic sourced from `subnet`.
#[must_use]
pub fn masquerade_spec(subnet: &Ipv4Network) -> String {
    format!(
        "-s {}/{} -j MASQUERADE",
        subnet.network(),
        subnet.prefix()
    )
}

/// Rule forwarding TCP `host_port` to `ip:container_port`.
#[must_use]
pub fn dnat_spec(host_port: u16, ip: Ipv4Addr, container_port: u16) -> String {
    format!("-p tcp -m tcp --dport {host_port} -j DNAT --to-destination {ip}:{container_port}")
}

/// Appends `spec` to `chain` of the `nat` table.
///
/// # Errors
///
/// Returns an error if `iptables` is missing or rejects the rule.
pub fn append(chain: Chain, spec: &str) -> Result<()> {
    run(chain, "-A", spec)?;
    tracing::debug!(%chain, spec, "iptables rule added");
    Ok(())
}

/// Deletes `spec` from `chain` of the `nat` table.
///
/// # Errors
///
/// Returns an error if `iptables` is missing or the rule is absent.
pub fn delete(chain: Chain, spec: &str) -> Result<()> {
    run(chain, "-D", spec)?;
    tracing::debug!(%chain, spec, "iptables rule deleted");
    Ok(())
}

fn run(chain: Chain, action: &str, spec: &str) -> Result<()> {
    let _ = command::run_tool("iptables", &rule_args(chain, action, spec))?;
    Ok(())
}

fn rule_args<'a>(chain: Chain, action: &'a str, spec: &'a str) -> Vec<&'a str> {
    let mut args = vec!["-t", NAT_TABLE, action, chain.as_str()];
    args.extend(spec.split_whitespace());
    args
}
