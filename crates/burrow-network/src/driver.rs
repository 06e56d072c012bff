//! The contract every network driver fulfils.

use std::fmt;

use burrow_common::error::Result;
use ipnetwork::Ipv4Network;

use crate::endpoint::Endpoint;
use crate::network::{NetnsTarget, Network};

/// Creates networks and plugs endpoints into them.
///
/// Drivers are registered by name in the
/// [`NetworkRegistry`](crate::network::NetworkRegistry); a network records
/// the name of the driver that created it.
pub trait NetworkDriver: fmt::Debug + Send + Sync {
    /// Name under which the driver is registered.
    fn name(&self) -> &'static str;

    /// Brings up the device for network `name`.
    ///
    /// `ip_range` carries the gateway address and the subnet prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the device exists or cannot be configured. No
    /// device is left behind on failure.
    fn create(&self, ip_range: Ipv4Network, name: &str) -> Result<Network>;

    /// Tears down the device of `network`.
    ///
    /// A device that is already gone is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing device cannot be removed.
    fn delete(&self, network: &Network) -> Result<()>;

    /// Creates the endpoint's device pair and plugs the host end into the
    /// network.
    ///
    /// # Errors
    ///
    /// Returns an error if the pair cannot be created or attached.
    fn connect(&self, network: &Network, endpoint: &Endpoint) -> Result<()>;

    /// Moves the container end of a connected endpoint into `netns` and
    /// gives it its address and default route.
    ///
    /// # Errors
    ///
    /// Returns the first failing step. The device pair is left for
    /// [`disconnect`](Self::disconnect) to remove.
    fn configure_endpoint(&self, endpoint: &Endpoint, netns: NetnsTarget<'_>) -> Result<()>;

    /// Removes the endpoint's device pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be deleted.
    fn disconnect(&self, endpoint: &Endpoint) -> Result<()>;
}
