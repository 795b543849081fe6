use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

/// Hardware address used by the speaker firmware as its unique identifier
pub type DeviceId = String;

/// Identity of one speaker, as reported by its info endpoint
///
/// Immutable: re-probing a device produces a new record rather than mutating
/// an existing one. The capability flags start out unset and are filled in by
/// [`SoundTouchClient::capability_flags`](crate::SoundTouchClient::capability_flags)
/// via [`with_capabilities`](DeviceIdentity::with_capabilities).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Network address of the control interface
    pub ip: IpAddr,

    /// Control port (usually [`DEFAULT_CONTROL_PORT`](crate::DEFAULT_CONTROL_PORT))
    pub port: u16,

    /// Hardware address the firmware uses in zone calls
    pub device_id: DeviceId,

    /// User-visible speaker name
    pub name: String,

    /// Model/type string (e.g. "SoundTouch 20")
    pub model: String,

    /// MAC address of the active network interface
    pub mac_address: String,

    /// Cloud account the speaker is registered to, when provisioned
    #[serde(default)]
    pub cloud_account: Option<String>,

    /// Hardware/software component inventory
    #[serde(default)]
    pub components: Vec<ComponentInfo>,

    /// Lazily discovered adjustability flags
    #[serde(default)]
    pub capabilities: Option<CapabilityFlags>,
}

impl DeviceIdentity {
    /// Base URL of the control API
    pub fn base_url(&self) -> String {
        format!("http://{}", SocketAddr::new(self.ip, self.port))
    }

    /// Whether the identity looks like a speaker of this product family
    ///
    /// Matches on the model string or, for devices that report a generic
    /// model, on the presence of a cloud account registration.
    pub fn is_soundtouch(&self) -> bool {
        let model = self.model.to_lowercase();
        if model.contains("soundtouch") || model.contains("bose") {
            return true;
        }
        self.cloud_account.is_some()
    }

    /// Copy of this identity with the capability flags filled in
    pub fn with_capabilities(mut self, flags: CapabilityFlags) -> Self {
        self.capabilities = Some(flags);
        self
    }

    /// Build a control client for this speaker
    ///
    /// # Example
    ///
    /// ```no_run
    /// use bose_soundtouch::Discovery;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let devices = Discovery::new().scan().await?;
    ///     if let Some(device) = devices.first() {
    ///         let client = device.client();
    ///         client.set_volume(25).await?;
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub fn client(&self) -> crate::client::SoundTouchClient {
        crate::client::SoundTouchClient::with_port(self.ip, self.port)
    }
}

/// One row of the component inventory from the info endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInfo {
    /// Component category (e.g. "SCM", "LPM")
    pub category: String,

    /// Firmware version of the component, when reported
    #[serde(default)]
    pub software_version: Option<String>,

    /// Serial number of the component, when reported
    #[serde(default)]
    pub serial_number: Option<String>,
}

/// Adjustability flags discovered by probing the control endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityFlags {
    /// Device reports an adjustable bass range
    pub bass_adjustable: bool,

    /// Tone controls endpoint is present and usable
    pub tone_controls_adjustable: bool,

    /// Speaker level controls endpoint is present and usable
    pub level_controls_adjustable: bool,
}

/// Volume snapshot from the volume endpoint
///
/// Read-only: the device is the source of truth, re-fetch rather than cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeState {
    /// Level the device is ramping towards, 0-100
    pub target: u8,

    /// Level currently applied, 0-100
    pub actual: u8,

    /// Whether output is muted
    pub muted: bool,
}

/// Bass snapshot from the bass endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BassLevel {
    /// Level the device is ramping towards
    pub target: i32,

    /// Level currently applied
    pub actual: i32,
}

/// Device-reported bass range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BassCapabilities {
    /// Whether bass is adjustable at all on this hardware
    pub available: bool,

    /// Lowest accepted level
    pub min: i32,

    /// Highest accepted level
    pub max: i32,

    /// Factory default level
    pub default: i32,
}

impl BassCapabilities {
    /// Whether a level is inside the reported range
    pub fn contains(&self, level: i32) -> bool {
        level >= self.min && level <= self.max
    }
}

/// One adjustable control with its device-reported range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlLevel {
    /// Current value
    pub value: i32,

    /// Lowest accepted value
    pub min: i32,

    /// Highest accepted value
    pub max: i32,

    /// Adjustment granularity
    pub step: i32,
}

impl ControlLevel {
    /// Whether a value is inside the reported range
    pub fn in_range(&self, value: i32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Tone controls (soundbar-class hardware)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToneControls {
    pub bass: ControlLevel,
    pub treble: ControlLevel,
}

/// Surround speaker levels (soundbar-class hardware)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerLevels {
    pub front_center: ControlLevel,
    pub rear_surround: ControlLevel,
}

/// Audio DSP settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDspControls {
    /// Active audio mode (e.g. "AUDIO_MODE_NORMAL", "AUDIO_MODE_DIALOG")
    pub audio_mode: String,

    /// Audio delay applied for lip sync
    pub video_sync_audio_delay: i32,

    /// Modes the device will accept
    pub supported_audio_modes: Vec<String>,
}

impl AudioDspControls {
    /// Whether the device reports support for a mode
    pub fn supports_mode(&self, mode: &str) -> bool {
        self.supported_audio_modes.iter().any(|m| m == mode)
    }
}

/// Availability of one playback source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceStatus {
    Ready,
    Unavailable,
    /// Firmware-specific status string outside the documented vocabulary
    Other(String),
}

impl SourceStatus {
    pub(crate) fn from_wire(raw: &str) -> Self {
        match raw {
            "READY" => SourceStatus::Ready,
            "UNAVAILABLE" => SourceStatus::Unavailable,
            other => SourceStatus::Other(other.to_string()),
        }
    }
}

/// One playback source reported by the sources endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Source identifier (e.g. "BLUETOOTH", "AUX", "SPOTIFY")
    pub source: String,

    /// Account bound to the source, empty for accountless sources
    pub account: String,

    /// Availability as last reported by the device
    pub status: SourceStatus,

    /// Display name
    pub name: String,
}

impl SourceDescriptor {
    pub fn is_ready(&self) -> bool {
        self.status == SourceStatus::Ready
    }
}

/// A single addressable piece of playable content
///
/// This is the device's selection vocabulary: a live source, a stream URL, or
/// the target of a preset slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Source identifier
    pub source: String,

    /// Account bound to the source, when required
    #[serde(default)]
    pub source_account: Option<String>,

    /// Content location (stream URL or source-specific token)
    #[serde(default)]
    pub location: Option<String>,

    /// Whether the item may be stored in a preset slot
    #[serde(default)]
    pub is_presetable: bool,

    /// Display name shown by the device while playing
    #[serde(default)]
    pub item_name: Option<String>,
}

impl ContentItem {
    /// Item that switches to a live source (AUX, BLUETOOTH, ...)
    pub fn for_source(source: impl Into<String>, account: impl Into<String>) -> Self {
        ContentItem {
            source: source.into(),
            source_account: Some(account.into()),
            location: None,
            is_presetable: false,
            item_name: None,
        }
    }

    /// Item that plays an HTTP audio stream by URL
    pub fn stream(url: impl Into<String>, name: impl Into<String>) -> Self {
        ContentItem {
            source: "LOCAL_INTERNET_RADIO".to_string(),
            source_account: None,
            location: Some(url.into()),
            is_presetable: true,
            item_name: Some(name.into()),
        }
    }
}

/// One of the six preset slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    /// Slot number, 1-6
    pub id: u8,

    /// Content stored in the slot
    pub item: ContentItem,
}

/// One row of the capabilities endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub info: Option<String>,
}

/// Playback state reported in now-playing data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayStatus {
    Play,
    Pause,
    Stop,
    Buffering,
    /// Firmware-specific status outside the documented vocabulary
    Other(String),
}

impl PlayStatus {
    pub(crate) fn from_wire(raw: &str) -> Self {
        match raw {
            "PLAY_STATE" => PlayStatus::Play,
            "PAUSE_STATE" => PlayStatus::Pause,
            "STOP_STATE" => PlayStatus::Stop,
            "BUFFERING_STATE" => PlayStatus::Buffering,
            other => PlayStatus::Other(other.to_string()),
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlayStatus::Play | PlayStatus::Buffering)
    }
}

/// Snapshot of what the device is playing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NowPlaying {
    /// Active source identifier
    pub source: String,

    /// Account bound to the active source
    #[serde(default)]
    pub source_account: Option<String>,

    /// Playback state
    pub play_status: PlayStatus,

    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,

    /// Station name for radio-style sources
    #[serde(default)]
    pub station_name: Option<String>,

    /// Album/station art URL
    #[serde(default)]
    pub art_url: Option<String>,

    /// Playback position, in the unit the device reports
    #[serde(default)]
    pub position: u32,

    /// Track duration, in the unit the device reports; 0 when unknown
    #[serde(default)]
    pub duration: u32,
}

impl NowPlaying {
    pub fn is_playing(&self) -> bool {
        self.play_status.is_playing()
    }
}

/// One network found by the wireless site survey
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirelessNetwork {
    pub ssid: String,
    #[serde(default)]
    pub signal_strength: Option<String>,
    #[serde(default)]
    pub security: Option<String>,
}

/// Security type for a wireless profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WifiSecurity {
    WpaOrWpa2,
    Wep,
    Open,
}

impl WifiSecurity {
    /// Wire spelling of the security type
    pub fn as_str(&self) -> &'static str {
        match self {
            WifiSecurity::WpaOrWpa2 => "wpa_or_wpa2",
            WifiSecurity::Wep => "wep",
            WifiSecurity::Open => "none",
        }
    }
}

/// One member of a zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneMember {
    /// Control address of the member
    pub ip: IpAddr,

    /// Hardware address of the member
    pub device_id: DeviceId,

    /// Whether this member owns the zone
    pub is_master: bool,
}

/// A playback group with one designated master
///
/// Invariant (maintained by [`ZoneManager`](crate::ZoneManager)): exactly one
/// member carries `is_master` and its hardware address equals `master_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneConfiguration {
    /// Hardware address of the zone master
    pub master_id: DeviceId,

    /// All members, master included
    pub members: Vec<ZoneMember>,
}

impl ZoneConfiguration {
    /// The member carrying the master flag
    pub fn master(&self) -> Option<&ZoneMember> {
        self.members.iter().find(|m| m.is_master)
    }

    /// Members other than the master
    pub fn slaves(&self) -> impl Iterator<Item = &ZoneMember> {
        self.members.iter().filter(|m| !m.is_master)
    }

    /// Member lookup by hardware address
    pub fn member(&self, device_id: &str) -> Option<&ZoneMember> {
        self.members.iter().find(|m| m.device_id == device_id)
    }

    /// Whether a hardware address belongs to this zone, in either role
    pub fn contains(&self, device_id: &str) -> bool {
        self.member(device_id).is_some()
    }
}

/// Remote-control keys accepted by the key endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Power,
    Play,
    Pause,
    Stop,
    NextTrack,
    PrevTrack,
    Mute,
    VolumeUp,
    VolumeDown,
    Preset1,
    Preset2,
    Preset3,
    Preset4,
    Preset5,
    Preset6,
    ThumbsUp,
    ThumbsDown,
}

impl Key {
    /// Every key, in a stable order
    pub const ALL: [Key; 17] = [
        Key::Power,
        Key::Play,
        Key::Pause,
        Key::Stop,
        Key::NextTrack,
        Key::PrevTrack,
        Key::Mute,
        Key::VolumeUp,
        Key::VolumeDown,
        Key::Preset1,
        Key::Preset2,
        Key::Preset3,
        Key::Preset4,
        Key::Preset5,
        Key::Preset6,
        Key::ThumbsUp,
        Key::ThumbsDown,
    ];

    /// Wire spelling sent to the key endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            Key::Power => "POWER",
            Key::Play => "PLAY",
            Key::Pause => "PAUSE",
            Key::Stop => "STOP",
            Key::NextTrack => "NEXT_TRACK",
            Key::PrevTrack => "PREV_TRACK",
            Key::Mute => "MUTE",
            Key::VolumeUp => "VOLUME_UP",
            Key::VolumeDown => "VOLUME_DOWN",
            Key::Preset1 => "PRESET_1",
            Key::Preset2 => "PRESET_2",
            Key::Preset3 => "PRESET_3",
            Key::Preset4 => "PRESET_4",
            Key::Preset5 => "PRESET_5",
            Key::Preset6 => "PRESET_6",
            Key::ThumbsUp => "THUMBS_UP",
            Key::ThumbsDown => "THUMBS_DOWN",
        }
    }

    /// Preset slot key for a slot number 1-6
    pub fn preset(slot: u8) -> Option<Key> {
        match slot {
            1 => Some(Key::Preset1),
            2 => Some(Key::Preset2),
            3 => Some(Key::Preset3),
            4 => Some(Key::Preset4),
            5 => Some(Key::Preset5),
            6 => Some(Key::Preset6),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Key {
    type Err = crate::error::SoundTouchError;

    /// Accepts wire spellings and the common lowercase aliases
    /// (`next`, `prev`, `vol_up`, `preset1`, ...)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = match s.to_lowercase().as_str() {
            "power" => Key::Power,
            "play" => Key::Play,
            "pause" => Key::Pause,
            "stop" => Key::Stop,
            "next" | "next_track" => Key::NextTrack,
            "prev" | "previous" | "prev_track" => Key::PrevTrack,
            "mute" => Key::Mute,
            "vol_up" | "volume_up" => Key::VolumeUp,
            "vol_down" | "volume_down" => Key::VolumeDown,
            "preset1" | "preset_1" => Key::Preset1,
            "preset2" | "preset_2" => Key::Preset2,
            "preset3" | "preset_3" => Key::Preset3,
            "preset4" | "preset_4" => Key::Preset4,
            "preset5" | "preset_5" => Key::Preset5,
            "preset6" | "preset_6" => Key::Preset6,
            "thumbsup" | "thumbs_up" => Key::ThumbsUp,
            "thumbsdown" | "thumbs_down" => Key::ThumbsDown,
            other => {
                return Err(crate::error::SoundTouchError::InvalidArgument(format!(
                    "unknown key name: {other}"
                )))
            }
        };
        Ok(key)
    }
}

/// Phase of a two-phase key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Press,
    Release,
}

impl KeyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyState::Press => "press",
            KeyState::Release => "release",
        }
    }
}
