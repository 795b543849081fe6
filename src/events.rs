use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{BassLevel, DeviceIdentity, NowPlaying, Preset, VolumeState, ZoneConfiguration};
use crate::xml;

/// Subprotocol the event endpoint requires during the handshake
const EVENT_SUBPROTOCOL: &str = "gabbo";

const PING_INTERVAL: Duration = Duration::from_secs(30);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Push message parsed off a device's event channel
#[derive(Debug, Clone, PartialEq)]
pub enum SpeakerEvent {
    /// Playback state changed
    NowPlaying(NowPlaying),

    /// Volume or mute changed
    Volume(VolumeState),

    /// Bass level changed
    Bass(BassLevel),

    /// Zone membership changed; `None` means the device left its zone
    Zone(Option<ZoneConfiguration>),

    /// Preset slots changed
    Presets(Vec<Preset>),

    /// Network interface state changed
    ConnectionState {
        /// Interface state name as reported (e.g. "NETWORK_WIFI_CONNECTED")
        state: String,
        /// Whether the interface is up
        up: bool,
        /// Signal strength label, when reported
        signal: Option<String>,
    },

    /// Cloud connection status changed
    ConnectionStatus(String),

    /// Someone touched the physical controls
    UserActivity,

    /// Server banner sent once after connecting
    SdkInfo {
        /// Protocol version of the event server
        server_version: String,
        /// Build identifier of the event server
        server_build: String,
    },
}

impl SpeakerEvent {
    /// The subscription type this event is delivered under
    pub fn event_type(&self) -> EventType {
        match self {
            SpeakerEvent::NowPlaying(_) => EventType::NowPlaying,
            SpeakerEvent::Volume(_) => EventType::Volume,
            SpeakerEvent::Bass(_) => EventType::Bass,
            SpeakerEvent::Zone(_) => EventType::Zone,
            SpeakerEvent::Presets(_) => EventType::Presets,
            SpeakerEvent::ConnectionState { .. } => EventType::ConnectionState,
            SpeakerEvent::ConnectionStatus(_) => EventType::ConnectionStatus,
            SpeakerEvent::UserActivity => EventType::UserActivity,
            SpeakerEvent::SdkInfo { .. } => EventType::SdkInfo,
        }
    }
}

/// Event categories a callback can be registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    NowPlaying,
    Volume,
    Bass,
    Zone,
    Presets,
    ConnectionState,
    ConnectionStatus,
    UserActivity,
    SdkInfo,
}

impl EventType {
    /// Every event category
    pub const ALL: [EventType; 9] = [
        EventType::NowPlaying,
        EventType::Volume,
        EventType::Bass,
        EventType::Zone,
        EventType::Presets,
        EventType::ConnectionState,
        EventType::ConnectionStatus,
        EventType::UserActivity,
        EventType::SdkInfo,
    ];
}

/// Lifecycle of one device's event channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No connection and none scheduled
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Channel is up and delivering events
    Connected,
    /// Connection lost; a reconnect is scheduled
    Reconnecting,
}

/// Proof of a registered callback; required to unsubscribe it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    ip: IpAddr,
    event_type: EventType,
    id: Uuid,
}

impl SubscriptionHandle {
    /// Device this subscription listens to
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// Event category this subscription listens for
    pub fn event_type(&self) -> EventType {
        self.event_type
    }
}

type EventCallback = Arc<dyn Fn(SpeakerEvent) + Send + Sync>;
type CallbackMap = Arc<Mutex<HashMap<EventType, Vec<(Uuid, EventCallback)>>>>;
type DispatchMap = HashMap<EventType, mpsc::UnboundedSender<SpeakerEvent>>;

struct DeviceChannel {
    callbacks: CallbackMap,
    state: Arc<Mutex<ChannelState>>,
    dispatch_txs: DispatchMap,
    stop_tx: broadcast::Sender<()>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl DeviceChannel {
    async fn close(mut self) {
        let _ = self.stop_tx.send(());
        // Dropping the senders lets the dispatchers drain and exit
        self.dispatch_txs.clear();
        for task in self.tasks.drain(..) {
            let _ = timeout(SHUTDOWN_TIMEOUT, task).await;
        }
    }
}

/// Receives push events from speakers and fans them out to callbacks
///
/// The first subscription for a device opens a WebSocket to its event
/// endpoint; the connection reconnects with exponential backoff until the
/// last callback for that device is unsubscribed. Each event type gets
/// its own dispatch queue, so a slow callback can only ever delay later
/// events of its own type.
///
/// # Example
///
/// ```no_run
/// use bose_soundtouch::{EventClient, EventType, SpeakerEvent, Discovery};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let devices = Discovery::new().scan().await?;
///     let events = EventClient::new();
///
///     if let Some(device) = devices.first() {
///         let handle = events.subscribe(device, EventType::Volume, |event| {
///             if let SpeakerEvent::Volume(v) = event {
///                 println!("Volume is now {}", v.actual);
///             }
///         });
///
///         tokio::time::sleep(std::time::Duration::from_secs(60)).await;
///         events.unsubscribe(handle).await;
///     }
///     events.shutdown().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct EventClient {
    port: u16,
    channels: Arc<Mutex<HashMap<IpAddr, DeviceChannel>>>,
}

impl EventClient {
    /// Create a client that connects to the default event port
    pub fn new() -> Self {
        Self {
            port: crate::DEFAULT_EVENT_PORT,
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Connect to a non-standard event port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Register a callback for one event type on one device
    ///
    /// The first subscription for a device starts its connection; the
    /// callback runs on a dispatch task, in wire order relative to other
    /// events of the same type.
    pub fn subscribe(
        &self,
        device: &DeviceIdentity,
        event_type: EventType,
        callback: impl Fn(SpeakerEvent) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let id = Uuid::new_v4();
        let mut channels = self.channels.lock().unwrap();
        let channel = channels
            .entry(device.ip)
            .or_insert_with(|| start_channel(device.ip, self.port));
        channel
            .callbacks
            .lock()
            .unwrap()
            .entry(event_type)
            .or_default()
            .push((id, Arc::new(callback)));
        tracing::debug!("Registered {:?} callback for {}", event_type, device.ip);
        SubscriptionHandle {
            ip: device.ip,
            event_type,
            id,
        }
    }

    /// Remove a callback; the device's channel closes when it was the last
    ///
    /// Closing is immediate even while the connection is backing off
    /// between reconnect attempts. Unknown handles are ignored.
    pub async fn unsubscribe(&self, handle: SubscriptionHandle) {
        let closing = {
            let mut channels = self.channels.lock().unwrap();
            let Some(channel) = channels.get_mut(&handle.ip) else {
                return;
            };
            let empty = {
                let mut callbacks = channel.callbacks.lock().unwrap();
                if let Some(list) = callbacks.get_mut(&handle.event_type) {
                    list.retain(|(id, _)| *id != handle.id);
                    if list.is_empty() {
                        callbacks.remove(&handle.event_type);
                    }
                }
                callbacks.is_empty()
            };
            if empty {
                channels.remove(&handle.ip)
            } else {
                None
            }
        };
        if let Some(channel) = closing {
            tracing::info!("Last callback for {} removed, closing its event channel", handle.ip);
            channel.close().await;
        }
    }

    /// Current lifecycle state of a device's channel
    pub fn channel_state(&self, ip: IpAddr) -> ChannelState {
        let channels = self.channels.lock().unwrap();
        channels
            .get(&ip)
            .map(|c| *c.state.lock().unwrap())
            .unwrap_or(ChannelState::Disconnected)
    }

    /// Close every channel and drop all callbacks
    pub async fn shutdown(&self) {
        let channels: Vec<(IpAddr, DeviceChannel)> = {
            let mut map = self.channels.lock().unwrap();
            map.drain().collect()
        };
        for (ip, channel) in channels {
            tracing::debug!("Closing event channel to {}", ip);
            channel.close().await;
        }
    }
}

impl Default for EventClient {
    fn default() -> Self {
        Self::new()
    }
}

fn start_channel(ip: IpAddr, port: u16) -> DeviceChannel {
    let callbacks: CallbackMap = Arc::new(Mutex::new(HashMap::new()));
    let state = Arc::new(Mutex::new(ChannelState::Connecting));
    let (stop_tx, _) = broadcast::channel(1);

    let mut dispatch_txs: DispatchMap = HashMap::new();
    let mut tasks = Vec::new();

    for event_type in EventType::ALL {
        let (tx, mut rx) = mpsc::unbounded_channel::<SpeakerEvent>();
        dispatch_txs.insert(event_type, tx);

        let callbacks = callbacks.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let targets: Vec<EventCallback> = {
                    let map = callbacks.lock().unwrap();
                    map.get(&event_type)
                        .map(|list| list.iter().map(|(_, cb)| cb.clone()).collect())
                        .unwrap_or_default()
                };
                for callback in targets {
                    callback(event.clone());
                }
            }
        }));
    }

    let conn_state = state.clone();
    let conn_dispatch = dispatch_txs.clone();
    let conn_stop = stop_tx.clone();
    tasks.push(tokio::spawn(run_channel(
        ip,
        port,
        conn_dispatch,
        conn_state,
        conn_stop,
    )));

    DeviceChannel {
        callbacks,
        state,
        dispatch_txs,
        stop_tx,
        tasks,
    }
}

fn set_state(state: &Arc<Mutex<ChannelState>>, value: ChannelState) {
    *state.lock().unwrap() = value;
}

/// How one connection attempt (and the session after it) ended
enum SessionEnd {
    Stopped,
    Failed { connected: bool },
}

async fn run_channel(
    ip: IpAddr,
    port: u16,
    dispatch: DispatchMap,
    state: Arc<Mutex<ChannelState>>,
    stop_tx: broadcast::Sender<()>,
) {
    let mut stop_rx = stop_tx.subscribe();
    let mut backoff = Duration::ZERO;

    loop {
        if !backoff.is_zero() {
            set_state(&state, ChannelState::Reconnecting);
            tracing::info!("Reconnecting to {} in {:?}", ip, backoff);
            tokio::select! {
                _ = stop_rx.recv() => break,
                _ = sleep(backoff) => {}
            }
        }

        set_state(&state, ChannelState::Connecting);
        match run_session(ip, port, &dispatch, &state, &mut stop_rx).await {
            SessionEnd::Stopped => break,
            SessionEnd::Failed { connected } => {
                // A session that got as far as connecting restarts the
                // backoff ladder instead of climbing it
                backoff = if connected {
                    next_backoff(Duration::ZERO)
                } else {
                    next_backoff(backoff)
                };
            }
        }
    }

    set_state(&state, ChannelState::Disconnected);
    tracing::info!("Event channel to {} closed", ip);
}

async fn run_session(
    ip: IpAddr,
    port: u16,
    dispatch: &DispatchMap,
    state: &Arc<Mutex<ChannelState>>,
    stop_rx: &mut broadcast::Receiver<()>,
) -> SessionEnd {
    let request = match channel_request(ip, port) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("Cannot build event request for {}: {}", ip, e);
            return SessionEnd::Failed { connected: false };
        }
    };

    tracing::info!("Connecting to event channel at {}:{}", ip, port);
    let ws_stream = tokio::select! {
        _ = stop_rx.recv() => return SessionEnd::Stopped,
        result = connect_async(request) => match result {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                tracing::warn!("Event connection to {} failed: {}", ip, e);
                return SessionEnd::Failed { connected: false };
            }
        }
    };

    set_state(state, ChannelState::Connected);
    tracing::info!("Event channel to {} connected", ip);

    let (mut write, mut read) = ws_stream.split();
    let mut ping = interval(PING_INTERVAL);
    // The first tick fires immediately; the device just saw the handshake
    ping.tick().await;

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                let _ = write.close().await;
                return SessionEnd::Stopped;
            }
            _ = ping.tick() => {
                if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                    tracing::warn!("Ping to {} failed: {}", ip, e);
                    return SessionEnd::Failed { connected: true };
                }
            }
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => dispatch_frame(&text, dispatch),
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!("Event channel to {} closed by device", ip);
                    return SessionEnd::Failed { connected: true };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("Event channel to {} errored: {}", ip, e);
                    return SessionEnd::Failed { connected: true };
                }
            }
        }
    }
}

fn dispatch_frame(text: &str, dispatch: &DispatchMap) {
    match xml::parse_event_frame(text) {
        Ok(events) => {
            for event in events {
                if let Some(tx) = dispatch.get(&event.event_type()) {
                    let _ = tx.send(event);
                }
            }
        }
        Err(e) => tracing::warn!("Dropping unparseable event frame: {}", e),
    }
}

fn channel_request(
    ip: IpAddr,
    port: u16,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request> {
    let mut request = format!("ws://{}/", SocketAddr::new(ip, port)).into_client_request()?;
    request.headers_mut().insert(
        "Sec-WebSocket-Protocol",
        HeaderValue::from_static(EVENT_SUBPROTOCOL),
    );
    Ok(request)
}

fn next_backoff(current: Duration) -> Duration {
    if current.is_zero() {
        Duration::from_secs(1)
    } else {
        (current * 2).min(MAX_BACKOFF)
    }
}
