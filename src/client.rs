use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Result, SoundTouchError};
use crate::types::{
    AudioDspControls, BassCapabilities, BassLevel, Capability, CapabilityFlags, ContentItem,
    DeviceIdentity, Key, KeyState, NowPlaying, Preset, SourceDescriptor, SpeakerLevels,
    ToneControls, VolumeState, WifiSecurity, WirelessNetwork, ZoneConfiguration, ZoneMember,
};
use crate::xml;

/// The only sender identifier the firmware accepts for key presses
const KEY_SENDER: &str = "Gabbo";

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Control client for one speaker
///
/// Each call is one HTTP round trip against the device's control API. The
/// client is cheap to clone; clones share the connection pool and the
/// cached bass capabilities.
#[derive(Clone)]
pub struct SoundTouchClient {
    http: reqwest::Client,
    ip: IpAddr,
    port: u16,
    timeout: Duration,
    bass_caps: Arc<Mutex<Option<BassCapabilities>>>,
}

impl SoundTouchClient {
    /// Create a client for a speaker at the default control port
    pub fn new(ip: IpAddr) -> Self {
        Self::with_port(ip, crate::DEFAULT_CONTROL_PORT)
    }

    /// Create a client for a speaker at a specific control port
    pub fn with_port(ip: IpAddr, port: u16) -> Self {
        Self::with_http(reqwest::Client::new(), ip, port, DEFAULT_TIMEOUT)
    }

    pub(crate) fn with_http(
        http: reqwest::Client,
        ip: IpAddr,
        port: u16,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            ip,
            port,
            timeout,
            bass_caps: Arc::new(Mutex::new(None)),
        }
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Address this client talks to
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// Control port this client talks to
    pub fn port(&self) -> u16 {
        self.port
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", SocketAddr::new(self.ip, self.port), path)
    }

    async fn get(&self, path: &str) -> Result<String> {
        let url = self.url(path);
        tracing::debug!("GET {}", url);
        let response = self.http.get(&url).timeout(self.timeout).send().await?;
        Self::read_body(response).await
    }

    async fn post(&self, path: &str, body: String) -> Result<String> {
        let url = self.url(path);
        tracing::debug!("POST {} {}", url, body);
        let response = self
            .http
            .post(&url)
            .header("Content-Type", "application/xml")
            .timeout(self.timeout)
            .body(body)
            .send()
            .await?;
        Self::read_body(response).await
    }

    async fn read_body(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SoundTouchError::DeviceRejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    // ========== Identity ==========

    /// Fetch the device identity (id, name, model, network and components)
    pub async fn info(&self) -> Result<DeviceIdentity> {
        let body = self.get("/info").await?;
        xml::parse_device_info(&body, self.ip, self.port)
    }

    /// Probe which audio adjustments this hardware actually supports
    ///
    /// Speakers without a given control answer the probe with an HTTP
    /// error, which maps to `false`; transport failures still surface.
    pub async fn capability_flags(&self) -> Result<CapabilityFlags> {
        let bass_adjustable = match self.bass_capabilities().await {
            Ok(caps) => caps.available,
            Err(SoundTouchError::DeviceRejected { .. }) => false,
            Err(e) => return Err(e),
        };
        let tone_controls_adjustable = match self.tone_controls().await {
            Ok(_) => true,
            Err(SoundTouchError::DeviceRejected { .. }) => false,
            Err(e) => return Err(e),
        };
        let level_controls_adjustable = match self.speaker_levels().await {
            Ok(_) => true,
            Err(SoundTouchError::DeviceRejected { .. }) => false,
            Err(e) => return Err(e),
        };
        Ok(CapabilityFlags {
            bass_adjustable,
            tone_controls_adjustable,
            level_controls_adjustable,
        })
    }

    /// List the capability descriptors the device advertises
    pub async fn capabilities(&self) -> Result<Vec<Capability>> {
        let body = self.get("/capabilities").await?;
        xml::parse_capabilities(&body)
    }

    // ========== Playback ==========

    /// Fetch what the speaker is currently playing
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use bose_soundtouch::SoundTouchClient;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = SoundTouchClient::new("192.168.1.100".parse()?);
    /// let np = client.now_playing().await?;
    /// println!("{}: {:?}", np.source, np.track);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn now_playing(&self) -> Result<NowPlaying> {
        let body = self.get("/now_playing").await?;
        xml::parse_now_playing(&body)
    }

    /// Send a remote-control key as a press/release pair
    ///
    /// The release is sent even when the press fails, so the device never
    /// sees a stuck key; the press error is reported first.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use bose_soundtouch::{Key, SoundTouchClient};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = SoundTouchClient::new("192.168.1.100".parse()?);
    /// client.press_key(Key::Play).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn press_key(&self, key: Key) -> Result<()> {
        let press = self
            .post("/key", xml::encode_key(key, KeyState::Press, KEY_SENDER))
            .await;
        let release = self
            .post("/key", xml::encode_key(key, KeyState::Release, KEY_SENDER))
            .await;
        press?;
        release?;
        Ok(())
    }

    /// Recall a stored preset by slot number (1 through 6)
    pub async fn select_preset(&self, slot: u8) -> Result<()> {
        let key = Key::preset(slot).ok_or_else(|| {
            SoundTouchError::InvalidArgument(format!("preset slot {slot} not in 1..=6"))
        })?;
        self.press_key(key).await
    }

    // ========== Volume ==========

    /// Fetch target volume, actual volume and mute state
    pub async fn volume(&self) -> Result<VolumeState> {
        let body = self.get("/volume").await?;
        xml::parse_volume(&body)
    }

    /// Set the volume to an absolute level between 0 and 100
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use bose_soundtouch::SoundTouchClient;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = SoundTouchClient::new("192.168.1.100".parse()?);
    /// client.set_volume(30).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn set_volume(&self, level: u8) -> Result<()> {
        if level > 100 {
            return Err(SoundTouchError::InvalidArgument(format!(
                "volume {level} not in 0..=100"
            )));
        }
        self.post("/volume", xml::encode_volume(level, None)).await?;
        Ok(())
    }

    /// Mute or unmute without changing the stored level
    ///
    /// Reads the current state first; the post is skipped when the speaker
    /// is already where the caller wants it.
    pub async fn set_muted(&self, muted: bool) -> Result<()> {
        let current = self.volume().await?;
        if current.muted == muted {
            return Ok(());
        }
        self.post("/volume", xml::encode_volume(current.actual, Some(muted)))
            .await?;
        Ok(())
    }

    // ========== Bass ==========

    /// Fetch target and actual bass level
    pub async fn bass(&self) -> Result<BassLevel> {
        let body = self.get("/bass").await?;
        xml::parse_bass(&body)
    }

    /// Fetch the bass adjustment range; cached after the first call
    pub async fn bass_capabilities(&self) -> Result<BassCapabilities> {
        if let Some(caps) = *self.bass_caps.lock().unwrap() {
            return Ok(caps);
        }
        let body = self.get("/bassCapabilities").await?;
        let caps = xml::parse_bass_capabilities(&body)?;
        *self.bass_caps.lock().unwrap() = Some(caps);
        Ok(caps)
    }

    /// Set the bass level, validated against the device-reported range
    pub async fn set_bass(&self, level: i32) -> Result<()> {
        let caps = self.bass_capabilities().await?;
        if !caps.available {
            return Err(SoundTouchError::InvalidArgument(
                "device does not support bass adjustment".to_string(),
            ));
        }
        if !caps.contains(level) {
            return Err(SoundTouchError::InvalidArgument(format!(
                "bass {level} not in {}..={}",
                caps.min, caps.max
            )));
        }
        self.post("/bass", xml::encode_bass(level)).await?;
        Ok(())
    }

    // ========== Sources and selection ==========

    /// List the content sources and their readiness
    pub async fn sources(&self) -> Result<Vec<SourceDescriptor>> {
        let body = self.get("/sources").await?;
        xml::parse_sources(&body)
    }

    /// Select arbitrary content
    pub async fn select(&self, item: &ContentItem) -> Result<()> {
        self.post("/select", xml::encode_content_item(item)).await?;
        Ok(())
    }

    /// Switch the active input source
    pub async fn select_source(
        &self,
        source: impl Into<String>,
        account: impl Into<String>,
    ) -> Result<()> {
        self.select(&ContentItem::for_source(source, account)).await
    }

    /// Play an arbitrary stream URL under a display name
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use bose_soundtouch::SoundTouchClient;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = SoundTouchClient::new("192.168.1.100".parse()?);
    /// client
    ///     .play_url("http://stream.radioparadise.com/aac-320", "Radio Paradise")
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn play_url(&self, url: impl Into<String>, name: impl Into<String>) -> Result<()> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(SoundTouchError::InvalidArgument(
                "stream URL must not be empty".to_string(),
            ));
        }
        self.select(&ContentItem::stream(url, name)).await
    }

    /// List the six preset slots and their stored content
    pub async fn presets(&self) -> Result<Vec<Preset>> {
        let body = self.get("/presets").await?;
        xml::parse_presets(&body)
    }

    // ========== Advanced audio ==========

    /// Fetch the DSP state (audio mode, lip-sync delay, supported modes)
    pub async fn audio_dsp_controls(&self) -> Result<AudioDspControls> {
        let body = self.get("/audiodspcontrols").await?;
        xml::parse_audio_dsp(&body)
    }

    /// Change audio mode and/or lip-sync delay; only given fields are posted
    pub async fn set_audio_dsp_controls(
        &self,
        audio_mode: Option<&str>,
        video_sync_audio_delay: Option<i32>,
    ) -> Result<()> {
        if audio_mode.is_none() && video_sync_audio_delay.is_none() {
            return Err(SoundTouchError::InvalidArgument(
                "nothing to set: both DSP fields are None".to_string(),
            ));
        }
        self.post(
            "/audiodspcontrols",
            xml::encode_audio_dsp(audio_mode, video_sync_audio_delay),
        )
        .await?;
        Ok(())
    }

    /// Fetch bass/treble tone levels with their device-reported ranges
    pub async fn tone_controls(&self) -> Result<ToneControls> {
        let body = self.get("/audioproducttonecontrols").await?;
        xml::parse_tone_controls(&body)
    }

    /// Change tone levels; only given fields are posted
    pub async fn set_tone_controls(&self, bass: Option<i32>, treble: Option<i32>) -> Result<()> {
        if bass.is_none() && treble.is_none() {
            return Err(SoundTouchError::InvalidArgument(
                "nothing to set: both tone fields are None".to_string(),
            ));
        }
        self.post(
            "/audioproducttonecontrols",
            xml::encode_tone_controls(bass, treble),
        )
        .await?;
        Ok(())
    }

    /// Fetch front-center and rear-surround speaker levels
    pub async fn speaker_levels(&self) -> Result<SpeakerLevels> {
        let body = self.get("/audioproductlevelcontrols").await?;
        xml::parse_speaker_levels(&body)
    }

    /// Change speaker levels; only given fields are posted
    pub async fn set_speaker_levels(
        &self,
        front_center: Option<i32>,
        rear_surround: Option<i32>,
    ) -> Result<()> {
        if front_center.is_none() && rear_surround.is_none() {
            return Err(SoundTouchError::InvalidArgument(
                "nothing to set: both level fields are None".to_string(),
            ));
        }
        self.post(
            "/audioproductlevelcontrols",
            xml::encode_speaker_levels(front_center, rear_surround),
        )
        .await?;
        Ok(())
    }

    // ========== Zones ==========

    /// Fetch the zone this speaker is part of, if any
    pub async fn zone(&self) -> Result<Option<ZoneConfiguration>> {
        let body = self.get("/getZone").await?;
        xml::parse_zone(&body)
    }

    /// Post a complete zone description to this speaker, which must be the
    /// master; an empty member list dissolves the zone
    pub async fn set_zone(&self, master_id: &str, members: &[ZoneMember]) -> Result<()> {
        self.post("/setZone", xml::encode_set_zone(master_id, self.ip, members))
            .await?;
        Ok(())
    }

    /// Attach one slave to the zone this speaker masters
    pub async fn add_zone_slave(
        &self,
        master_id: &str,
        slave_ip: IpAddr,
        slave_id: &str,
    ) -> Result<()> {
        self.post(
            "/addZoneSlave",
            xml::encode_add_zone_slave(master_id, slave_ip, slave_id),
        )
        .await?;
        Ok(())
    }

    /// Detach one slave from the zone this speaker masters
    pub async fn remove_zone_slave(&self, master_id: &str, slave_id: &str) -> Result<()> {
        self.post(
            "/removeZoneSlave",
            xml::encode_remove_zone_slave(master_id, slave_id),
        )
        .await?;
        Ok(())
    }

    // ========== Device settings ==========

    /// Rename the speaker
    pub async fn set_name(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SoundTouchError::InvalidArgument(
                "device name must not be empty".to_string(),
            ));
        }
        self.post("/name", xml::encode_name(&name)).await?;
        Ok(())
    }

    /// Post a setup state change (e.g. "SETUP_WIFI", "SETUP_LEAVE")
    pub async fn set_setup_state(&self, state: &str, timeout_ms: Option<u32>) -> Result<()> {
        self.post("/setup", xml::encode_setup_state(state, timeout_ms))
            .await?;
        Ok(())
    }

    /// Fetch the SSID of the active wireless profile, if any
    pub async fn wireless_profile(&self) -> Result<Option<String>> {
        let body = self.get("/getActiveWirelessProfile").await?;
        xml::parse_wireless_profile(&body)
    }

    /// Scan for wireless networks visible to the speaker
    pub async fn wireless_site_survey(&self) -> Result<Vec<WirelessNetwork>> {
        let body = self.get("/performWirelessSiteSurvey").await?;
        xml::parse_site_survey(&body)
    }

    /// Provision a WiFi profile so the speaker can join a network
    ///
    /// Timeouts outside 5..=60 seconds fall back to 30. After the profile
    /// is accepted the speaker still has to leave setup mode and
    /// power-cycle; those follow-ups are best effort and only logged on
    /// failure, since the profile itself has already landed.
    pub async fn add_wireless_profile(
        &self,
        ssid: &str,
        password: &str,
        security: WifiSecurity,
        timeout_secs: Option<u32>,
    ) -> Result<()> {
        let timeout = match timeout_secs {
            Some(t) if (5..=60).contains(&t) => t,
            _ => 30,
        };
        self.post(
            "/addWirelessProfile",
            xml::encode_wireless_profile(ssid, password, security, timeout),
        )
        .await?;

        // Give the speaker time to store the profile before kicking it out
        // of setup mode
        tokio::time::sleep(Duration::from_secs(2)).await;
        if let Err(e) = self.set_setup_state("SETUP_LEAVE", None).await {
            tracing::warn!("Failed to leave setup mode on {}: {}", self.ip, e);
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        if let Err(e) = self.press_key(Key::Power).await {
            tracing::warn!("Failed to power-cycle {} after provisioning: {}", self.ip, e);
        }
        Ok(())
    }
}
