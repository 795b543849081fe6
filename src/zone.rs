use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::client::SoundTouchClient;
use crate::error::{Result, SoundTouchError};
use crate::types::{ContentItem, DeviceId, DeviceIdentity, Key, ZoneConfiguration, ZoneMember};

/// Command fanned out to every member of a zone
#[derive(Debug, Clone)]
pub enum GroupCommand {
    /// Set every member to the same absolute volume
    SetVolume(u8),
    /// Send the same key press to every member
    PressKey(Key),
    /// Select the same content on every member
    Select(ContentItem),
}

impl GroupCommand {
    fn validate(&self) -> Result<()> {
        match self {
            GroupCommand::SetVolume(level) if *level > 100 => Err(
                SoundTouchError::InvalidArgument(format!("volume {level} not in 0..=100")),
            ),
            _ => Ok(()),
        }
    }
}

/// Per-member outcome of a zone-wide command
///
/// A broadcast keeps going after individual failures; this carries every
/// member's result in fan-out order (master first).
#[derive(Debug)]
pub struct BroadcastResult {
    /// Outcome per member, in the order the command was sent
    pub results: Vec<(DeviceId, Result<()>)>,
}

impl BroadcastResult {
    /// Whether every member accepted the command
    pub fn all_ok(&self) -> bool {
        self.results.iter().all(|(_, r)| r.is_ok())
    }

    /// The members that failed, with their errors
    pub fn failures(&self) -> impl Iterator<Item = (&DeviceId, &SoundTouchError)> {
        self.results
            .iter()
            .filter_map(|(id, r)| r.as_ref().err().map(|e| (id, e)))
    }
}

struct ZoneEntry {
    config: ZoneConfiguration,
    master_ip: IpAddr,
    guard: Arc<tokio::sync::Mutex<()>>,
}

/// Tracks multiplayer zones and serializes the calls that mutate them
///
/// One device per zone is the master; grouping calls go to it, zone-wide
/// commands fan out to every member. Operations on the same zone take an
/// exclusive section so overlapping mutations cannot interleave their
/// HTTP calls; different zones proceed in parallel.
///
/// # Example
///
/// ```no_run
/// use bose_soundtouch::{Discovery, GroupCommand, ZoneManager};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let devices = Discovery::new().scan().await?;
///     let manager = ZoneManager::new();
///
///     if let [master, rest @ ..] = devices.as_slice() {
///         let zone = manager.create(master, rest).await?;
///         println!("Playing everywhere in zone {}", zone.master_id);
///         manager
///             .broadcast(&zone.master_id, GroupCommand::SetVolume(25))
///             .await?;
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct ZoneManager {
    http: reqwest::Client,
    port: u16,
    timeout: Duration,
    zones: Arc<Mutex<BTreeMap<DeviceId, ZoneEntry>>>,
}

impl ZoneManager {
    /// Create a manager with no tracked zones
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            port: crate::DEFAULT_CONTROL_PORT,
            timeout: crate::client::DEFAULT_TIMEOUT,
            zones: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Talk to members on a non-standard control port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the per-request timeout for zone calls
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn client_for(&self, ip: IpAddr) -> SoundTouchClient {
        SoundTouchClient::with_http(self.http.clone(), ip, self.port, self.timeout)
    }

    /// Snapshot of one tracked zone
    pub fn zone(&self, master_id: &str) -> Option<ZoneConfiguration> {
        let zones = self.zones.lock().unwrap();
        zones.get(master_id).map(|e| e.config.clone())
    }

    /// Snapshot of every tracked zone, ordered by master id
    pub fn zones(&self) -> Vec<ZoneConfiguration> {
        let zones = self.zones.lock().unwrap();
        zones.values().map(|e| e.config.clone()).collect()
    }

    /// Number of tracked zones
    pub fn zone_count(&self) -> usize {
        self.zones.lock().unwrap().len()
    }

    /// Group speakers into a zone mastered by `master`
    ///
    /// Fails without touching the network when the member set is invalid
    /// or any device already belongs to a tracked zone.
    pub async fn create(
        &self,
        master: &DeviceIdentity,
        slaves: &[DeviceIdentity],
    ) -> Result<ZoneConfiguration> {
        if slaves.is_empty() {
            return Err(SoundTouchError::InvalidArgument(
                "a zone needs at least one slave".to_string(),
            ));
        }
        for (i, slave) in slaves.iter().enumerate() {
            if slave.device_id == master.device_id {
                return Err(SoundTouchError::InvalidArgument(format!(
                    "master {} cannot be its own slave",
                    master.device_id
                )));
            }
            if slaves[..i].iter().any(|s| s.device_id == slave.device_id) {
                return Err(SoundTouchError::InvalidArgument(format!(
                    "duplicate member {}",
                    slave.device_id
                )));
            }
        }

        let guard = Arc::new(tokio::sync::Mutex::new(()));
        {
            let mut zones = self.zones.lock().unwrap();
            if zones.contains_key(&master.device_id) {
                return Err(SoundTouchError::ZoneConflict(format!(
                    "{} already masters a zone",
                    master.device_id
                )));
            }
            membership_free(&zones, &master.device_id)?;
            for slave in slaves {
                membership_free(&zones, &slave.device_id)?;
            }
            // Reserve the zone before the network call so overlapping
            // creates for the same master cannot both proceed
            zones.insert(
                master.device_id.clone(),
                ZoneEntry {
                    config: ZoneConfiguration {
                        master_id: master.device_id.clone(),
                        members: vec![ZoneMember {
                            ip: master.ip,
                            device_id: master.device_id.clone(),
                            is_master: true,
                        }],
                    },
                    master_ip: master.ip,
                    guard: guard.clone(),
                },
            );
        }
        let _section = guard.lock().await;

        let wire_members: Vec<ZoneMember> = slaves
            .iter()
            .map(|s| ZoneMember {
                ip: s.ip,
                device_id: s.device_id.clone(),
                is_master: false,
            })
            .collect();

        tracing::info!(
            "Creating zone mastered by {} with {} slave(s)",
            master.device_id,
            wire_members.len()
        );
        match self
            .client_for(master.ip)
            .set_zone(&master.device_id, &wire_members)
            .await
        {
            Ok(()) => {
                let mut zones = self.zones.lock().unwrap();
                let entry = zones
                    .get_mut(&master.device_id)
                    .ok_or_else(|| dissolved(&master.device_id))?;
                entry.config.members.extend(wire_members);
                Ok(entry.config.clone())
            }
            Err(e) => {
                self.zones.lock().unwrap().remove(&master.device_id);
                Err(e)
            }
        }
    }

    /// Attach another speaker to a tracked zone
    pub async fn add_member(
        &self,
        master_id: &str,
        member: &DeviceIdentity,
    ) -> Result<ZoneConfiguration> {
        if member.device_id == master_id {
            return Err(SoundTouchError::ZoneConflict(format!(
                "{master_id} already masters this zone"
            )));
        }
        let guard = self.guard_for(master_id)?;
        let _section = guard.lock().await;

        let master_ip = {
            let zones = self.zones.lock().unwrap();
            let entry = zones.get(master_id).ok_or_else(|| dissolved(master_id))?;
            membership_free(&zones, &member.device_id)?;
            entry.master_ip
        };

        self.client_for(master_ip)
            .add_zone_slave(master_id, member.ip, &member.device_id)
            .await?;
        tracing::info!("Added {} to the zone mastered by {}", member.device_id, master_id);

        let mut zones = self.zones.lock().unwrap();
        let entry = zones.get_mut(master_id).ok_or_else(|| dissolved(master_id))?;
        entry.config.members.push(ZoneMember {
            ip: member.ip,
            device_id: member.device_id.clone(),
            is_master: false,
        });
        Ok(entry.config.clone())
    }

    /// Detach a slave from a tracked zone
    ///
    /// Removing the master this way is a conflict; dissolve the zone with
    /// [`teardown`](Self::teardown) instead. Removing the last slave
    /// dissolves the zone and returns `None`.
    pub async fn remove_member(
        &self,
        master_id: &str,
        member_id: &str,
    ) -> Result<Option<ZoneConfiguration>> {
        if member_id == master_id {
            return Err(SoundTouchError::ZoneConflict(format!(
                "{master_id} is the master; tear the zone down instead of removing it"
            )));
        }
        let guard = self.guard_for(master_id)?;
        let _section = guard.lock().await;

        let master_ip = {
            let zones = self.zones.lock().unwrap();
            let entry = zones.get(master_id).ok_or_else(|| dissolved(master_id))?;
            if !entry.config.contains(member_id) {
                return Err(SoundTouchError::InvalidArgument(format!(
                    "{member_id} is not in the zone mastered by {master_id}"
                )));
            }
            entry.master_ip
        };

        self.client_for(master_ip)
            .remove_zone_slave(master_id, member_id)
            .await?;

        let mut zones = self.zones.lock().unwrap();
        let entry = zones.get_mut(master_id).ok_or_else(|| dissolved(master_id))?;
        entry.config.members.retain(|m| m.device_id != member_id);
        if entry.config.slaves().next().is_none() {
            zones.remove(master_id);
            tracing::info!("Zone mastered by {} dissolved with its last slave", master_id);
            return Ok(None);
        }
        tracing::info!("Removed {} from the zone mastered by {}", member_id, master_id);
        Ok(Some(
            zones
                .get(master_id)
                .ok_or_else(|| dissolved(master_id))?
                .config
                .clone(),
        ))
    }

    /// Dissolve a tracked zone by posting an empty member list to its master
    pub async fn teardown(&self, master_id: &str) -> Result<()> {
        let guard = self.guard_for(master_id)?;
        let _section = guard.lock().await;

        let master_ip = {
            let zones = self.zones.lock().unwrap();
            zones
                .get(master_id)
                .ok_or_else(|| dissolved(master_id))?
                .master_ip
        };

        self.client_for(master_ip).set_zone(master_id, &[]).await?;
        self.zones.lock().unwrap().remove(master_id);
        tracing::info!("Dissolved the zone mastered by {}", master_id);
        Ok(())
    }

    /// Ask a device what zone it is in and adopt the answer
    ///
    /// Zones formed by other controllers (or the speaker app) become
    /// tracked; a tracked zone the device no longer reports is dropped.
    /// Adopted members are evicted from any other tracked zone so a
    /// device is never tracked in two zones at once. Firmware responses
    /// that omit the master's own member row get it restored when the
    /// queried device is the master.
    pub async fn refresh(&self, device: &DeviceIdentity) -> Result<Option<ZoneConfiguration>> {
        let client =
            SoundTouchClient::with_http(self.http.clone(), device.ip, device.port, self.timeout);
        match client.zone().await? {
            None => {
                let guard = {
                    let zones = self.zones.lock().unwrap();
                    zones.get(&device.device_id).map(|e| e.guard.clone())
                };
                let Some(guard) = guard else {
                    return Ok(None);
                };
                let _section = guard.lock().await;
                let mut zones = self.zones.lock().unwrap();
                if zones.remove(&device.device_id).is_some() {
                    tracing::info!(
                        "Device {} no longer reports a zone, dropping it",
                        device.device_id
                    );
                }
                Ok(None)
            }
            Some(mut zone) => {
                if zone.master().is_none() && zone.master_id == device.device_id {
                    zone.members.insert(
                        0,
                        ZoneMember {
                            ip: device.ip,
                            device_id: device.device_id.clone(),
                            is_master: true,
                        },
                    );
                }
                let master_ip = zone.master().map(|m| m.ip).unwrap_or(device.ip);
                let guard = {
                    let zones = self.zones.lock().unwrap();
                    zones
                        .get(&zone.master_id)
                        .map(|e| e.guard.clone())
                        .unwrap_or_else(|| Arc::new(tokio::sync::Mutex::new(())))
                };
                let _section = guard.lock().await;
                let mut zones = self.zones.lock().unwrap();
                evict_adopted_members(&mut zones, &zone);
                zones.insert(
                    zone.master_id.clone(),
                    ZoneEntry {
                        config: zone.clone(),
                        master_ip,
                        guard: guard.clone(),
                    },
                );
                Ok(Some(zone))
            }
        }
    }

    /// Send one command to every member of a zone, master first
    ///
    /// The command is validated once up front; after that each member gets
    /// its own attempt and its own slot in the result, so one deaf speaker
    /// does not stop the rest of the zone.
    pub async fn broadcast(&self, master_id: &str, command: GroupCommand) -> Result<BroadcastResult> {
        command.validate()?;
        let guard = self.guard_for(master_id)?;
        let _section = guard.lock().await;

        let members: Vec<ZoneMember> = {
            let zones = self.zones.lock().unwrap();
            let entry = zones.get(master_id).ok_or_else(|| dissolved(master_id))?;
            let mut ordered: Vec<ZoneMember> = entry.config.master().cloned().into_iter().collect();
            ordered.extend(entry.config.slaves().cloned());
            ordered
        };

        let mut results = Vec::with_capacity(members.len());
        for member in &members {
            let outcome = self.run_command(member.ip, &command).await;
            if let Err(e) = &outcome {
                tracing::warn!(
                    "Zone command failed on {} at {}: {}",
                    member.device_id,
                    member.ip,
                    e
                );
            }
            results.push((member.device_id.clone(), outcome));
        }
        Ok(BroadcastResult { results })
    }

    async fn run_command(&self, ip: IpAddr, command: &GroupCommand) -> Result<()> {
        let client = self.client_for(ip);
        match command {
            GroupCommand::SetVolume(level) => client.set_volume(*level).await,
            GroupCommand::PressKey(key) => client.press_key(*key).await,
            GroupCommand::Select(item) => client.select(item).await,
        }
    }

    fn guard_for(&self, master_id: &str) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let zones = self.zones.lock().unwrap();
        zones
            .get(master_id)
            .map(|e| e.guard.clone())
            .ok_or_else(|| {
                SoundTouchError::InvalidArgument(format!(
                    "no tracked zone mastered by {master_id}"
                ))
            })
    }
}

impl Default for ZoneManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull the adopted zone's members out of every other tracked zone
///
/// The devices are the authority on membership; once a refresh reports a
/// member somewhere, any older tracked zone still claiming it is stale.
/// A stale zone whose master was adopted, or which has no slaves left
/// afterwards, is dropped entirely.
fn evict_adopted_members(zones: &mut BTreeMap<DeviceId, ZoneEntry>, adopted: &ZoneConfiguration) {
    zones.retain(|master_id, entry| {
        if *master_id == adopted.master_id {
            return true;
        }
        if adopted.contains(master_id) {
            tracing::info!(
                "Zone mastered by {} superseded by the zone mastered by {}",
                master_id,
                adopted.master_id
            );
            return false;
        }
        let before = entry.config.members.len();
        entry.config.members.retain(|m| !adopted.contains(&m.device_id));
        if entry.config.members.len() < before {
            tracing::info!(
                "Evicted {} member(s) from the zone mastered by {}",
                before - entry.config.members.len(),
                master_id
            );
        }
        entry.config.slaves().next().is_some()
    });
}

fn membership_free(zones: &BTreeMap<DeviceId, ZoneEntry>, device_id: &str) -> Result<()> {
    for (master_id, entry) in zones {
        if entry.config.contains(device_id) {
            return Err(SoundTouchError::ZoneConflict(format!(
                "{device_id} is already in the zone mastered by {master_id}"
            )));
        }
    }
    Ok(())
}

fn dissolved(master_id: &str) -> SoundTouchError {
    SoundTouchError::InvalidArgument(format!(
        "the zone mastered by {master_id} was dissolved"
    ))
}
