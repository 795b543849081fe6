use std::net::IpAddr;
use std::time::Duration;

use futures_util::{stream, StreamExt};
use ipnet::IpNet;

use crate::client::SoundTouchClient;
use crate::error::{Result, SoundTouchError};
use crate::types::DeviceIdentity;

const DEFAULT_CONCURRENCY: usize = 50;
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Scanner that sweeps a network for speakers
///
/// Every host on the network is probed in parallel; hosts whose info
/// endpoint identifies them as a SoundTouch product make it into the
/// result. Without an explicit network the scanner sweeps the /24 around
/// the local address.
///
/// # Example
///
/// ```no_run
/// use bose_soundtouch::Discovery;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let devices = Discovery::new().network("192.168.1.0/24").scan().await?;
///
///     for device in &devices {
///         println!("Found {} ({}) at {}", device.name, device.model, device.ip);
///     }
///     Ok(())
/// }
/// ```
pub struct Discovery {
    network: Option<String>,
    port: u16,
    concurrency: usize,
    probe_timeout: Duration,
}

impl Discovery {
    /// Create a scanner with default settings
    pub fn new() -> Self {
        Self {
            network: None,
            port: crate::DEFAULT_CONTROL_PORT,
            concurrency: DEFAULT_CONCURRENCY,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Scan a specific network in CIDR notation instead of the local /24
    pub fn network(mut self, cidr: impl Into<String>) -> Self {
        self.network = Some(cidr.into());
        self
    }

    /// Probe a non-standard control port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Limit how many probes run at once
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Give up on an unresponsive host after this long
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Sweep the network and return the speakers found
    ///
    /// Results arrive in probe-completion order, which varies between
    /// runs; compare them as sets.
    pub async fn scan(&self) -> Result<Vec<DeviceIdentity>> {
        let network = self.resolve_network()?;
        tracing::info!("Scanning {} for speakers on port {}", network, self.port);

        let http = reqwest::Client::new();
        let port = self.port;
        let probe_timeout = self.probe_timeout;

        let mut probes = stream::iter(network.hosts())
            .map(|ip| {
                let http = http.clone();
                async move { probe(http, ip, port, probe_timeout).await }
            })
            .buffer_unordered(self.concurrency);

        let mut devices = Vec::new();
        while let Some(found) = probes.next().await {
            if let Some(identity) = found {
                tracing::info!(
                    "Found {} ({}) at {}",
                    identity.name,
                    identity.model,
                    identity.ip
                );
                devices.push(identity);
            }
        }

        tracing::info!("Scan of {} finished, {} speaker(s)", network, devices.len());
        Ok(devices)
    }

    fn resolve_network(&self) -> Result<IpNet> {
        match &self.network {
            Some(cidr) => cidr.parse().map_err(|e| {
                SoundTouchError::InvalidArgument(format!("invalid scan network {cidr:?}: {e}"))
            }),
            None => {
                let local = local_ip_address::local_ip().map_err(|e| {
                    SoundTouchError::InvalidArgument(format!(
                        "cannot determine the local network ({e}); pass one explicitly"
                    ))
                })?;
                IpNet::new(local, 24).map_err(|e| {
                    SoundTouchError::InvalidArgument(format!(
                        "cannot derive a scan network from {local}: {e}"
                    ))
                })
            }
        }
    }
}

impl Default for Discovery {
    fn default() -> Self {
        Self::new()
    }
}

/// Probe one host; anything that is not a reachable SoundTouch is a miss
async fn probe(
    http: reqwest::Client,
    ip: IpAddr,
    port: u16,
    timeout: Duration,
) -> Option<DeviceIdentity> {
    let client = SoundTouchClient::with_http(http, ip, port, timeout);
    match client.info().await {
        Ok(identity) if identity.is_soundtouch() => Some(identity),
        Ok(identity) => {
            tracing::debug!("Host {} answered but reports model {:?}", ip, identity.model);
            None
        }
        Err(e) => {
            tracing::trace!("No speaker at {}: {}", ip, e);
            None
        }
    }
}
