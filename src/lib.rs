//! Rust library for controlling Bose SoundTouch networked speakers
//!
//! This library provides an async API for discovering and controlling
//! SoundTouch speaker systems over the local network. It supports:
//!
//! - Discovery by scanning a subnet for the control API
//! - Playback, volume, bass and tone control
//! - Source selection, presets and URL streaming
//! - Multi-room zone management with conflict tracking
//! - Speaker naming and Wi-Fi provisioning
//! - Real-time push events via WebSocket callbacks
//!
//! # Quick Start
//!
//! ```no_run
//! use bose_soundtouch::{Discovery, Key};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Scan the local /24 for speakers
//!     let devices = Discovery::new().scan().await?;
//!
//!     if let Some(device) = devices.first() {
//!         println!("Found {} at {}", device.name, device.ip);
//!
//!         // Control the speaker
//!         let client = device.client();
//!         client.set_volume(35).await?;
//!         client.press_key(Key::Play).await?;
//!
//!         let status = client.now_playing().await?;
//!         println!("Now playing from {}", status.source);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Direct Connection
//!
//! If you know the IP address of a speaker, you can skip discovery:
//!
//! ```no_run
//! use bose_soundtouch::SoundTouchClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = SoundTouchClient::new("192.168.1.100".parse()?);
//!     let info = client.info().await?;
//!     println!("{} is a {}", info.name, info.model);
//!     Ok(())
//! }
//! ```
//!
//! # Push Events
//!
//! Speakers report state changes over a WebSocket channel. Register
//! callbacks per event type; the connection is managed for you:
//!
//! ```no_run
//! use bose_soundtouch::{Discovery, EventClient, EventType, SpeakerEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let devices = Discovery::new().scan().await?;
//!     let events = EventClient::new();
//!
//!     if let Some(device) = devices.first() {
//!         events.subscribe(device, EventType::NowPlaying, |event| {
//!             if let SpeakerEvent::NowPlaying(status) = event {
//!                 println!("Track: {:?}", status.track);
//!             }
//!         });
//!         tokio::time::sleep(std::time::Duration::from_secs(300)).await;
//!     }
//!     events.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The library is organized into several layers:
//!
//! - **Discovery**: concurrent probe sweep of a subnet for control APIs
//! - **Client**: per-device control over the XML-over-HTTP API
//! - **Zone**: multi-room grouping built on the zone endpoints
//! - **Events**: WebSocket push channel with per-type dispatch queues
//! - **Xml**: codec between wire payloads and domain types
//! - **Types**: domain types and data structures

/// Port of the XML-over-HTTP control API
pub const DEFAULT_CONTROL_PORT: u16 = 8090;

/// Port of the WebSocket event endpoint
pub const DEFAULT_EVENT_PORT: u16 = 8080;

/// Port of the DLNA media renderer, for callers driving playback via UPnP
pub const DEFAULT_DLNA_PORT: u16 = 8091;

mod client;
mod discovery;
mod error;
mod events;
mod types;
mod xml;
mod zone;

// Public exports
pub use client::SoundTouchClient;
pub use discovery::Discovery;
pub use error::{Result, SoundTouchError};
pub use events::{ChannelState, EventClient, EventType, SpeakerEvent, SubscriptionHandle};
pub use types::{
    AudioDspControls, BassCapabilities, BassLevel, Capability, CapabilityFlags, ComponentInfo,
    ContentItem, ControlLevel, DeviceId, DeviceIdentity, Key, KeyState, NowPlaying, PlayStatus,
    Preset, SourceDescriptor, SourceStatus, SpeakerLevels, ToneControls, VolumeState,
    WifiSecurity, WirelessNetwork, ZoneConfiguration, ZoneMember,
};
pub use zone::{BroadcastResult, GroupCommand, ZoneManager};
