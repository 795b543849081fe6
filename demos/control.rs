use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use bose_soundtouch::{
    ChannelState, DeviceIdentity, Discovery, EventClient, EventType, Key, NowPlaying,
    SoundTouchClient, SoundTouchError, SpeakerEvent, SubscriptionHandle, VolumeState,
};
use tokio::sync::{mpsc, oneshot};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;

#[derive(PartialEq)]
enum AppState {
    Discovery,
    DeviceControl,
}

struct Connected {
    device: DeviceIdentity,
    client: SoundTouchClient,
    now_playing: Option<NowPlaying>,
    volume: Option<VolumeState>,
    handles: Vec<SubscriptionHandle>,
}

struct App {
    state: AppState,
    devices: Vec<DeviceIdentity>,
    scan_rx: Option<oneshot::Receiver<Result<Vec<DeviceIdentity>, SoundTouchError>>>,
    selected_index: usize,
    connected: Option<Connected>,
    status_message: String,
    events: EventClient,
    event_tx: mpsc::UnboundedSender<SpeakerEvent>,
    event_rx: mpsc::UnboundedReceiver<SpeakerEvent>,
    json_cursor: usize,
    json_scroll: usize,
}

impl App {
    fn new() -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            state: AppState::Discovery,
            devices: Vec::new(),
            scan_rx: None,
            selected_index: 0,
            connected: None,
            status_message: String::new(),
            events: EventClient::new(),
            event_tx,
            event_rx,
            json_cursor: 0,
            json_scroll: 0,
        }
    }

    fn start_scan(&mut self) {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = tx.send(Discovery::new().scan().await);
        });
        self.scan_rx = Some(rx);
        self.status_message = "Scanning the local network for speakers...".to_string();
    }

    fn poll_scan(&mut self) {
        let Some(mut rx) = self.scan_rx.take() else {
            return;
        };
        match rx.try_recv() {
            Ok(Ok(devices)) => {
                self.status_message = format!(
                    "Found {} speaker(s). Press Enter to connect, r to rescan.",
                    devices.len()
                );
                self.devices = devices;
                self.selected_index = 0;
            }
            Ok(Err(e)) => {
                self.status_message = format!("Scan failed: {}", e);
            }
            Err(oneshot::error::TryRecvError::Empty) => {
                self.scan_rx = Some(rx);
            }
            Err(oneshot::error::TryRecvError::Closed) => {
                self.status_message = "Scan task ended unexpectedly".to_string();
            }
        }
    }

    fn select_next(&mut self) {
        if !self.devices.is_empty() {
            self.selected_index = (self.selected_index + 1) % self.devices.len();
        }
    }

    fn select_previous(&mut self) {
        if !self.devices.is_empty() {
            if self.selected_index == 0 {
                self.selected_index = self.devices.len() - 1;
            } else {
                self.selected_index -= 1;
            }
        }
    }

    async fn connect_to_selected(&mut self) {
        if self.devices.is_empty() {
            self.status_message = "No speakers to connect to".to_string();
            return;
        }

        let device = self.devices[self.selected_index].clone();
        let client = device.client();
        let now_playing = client.now_playing().await.ok();
        let volume = client.volume().await.ok();

        // Push updates keep the panes fresh while we hold the connection
        let handles = vec![
            self.events.subscribe(&device, EventType::NowPlaying, {
                let tx = self.event_tx.clone();
                move |event| {
                    let _ = tx.send(event);
                }
            }),
            self.events.subscribe(&device, EventType::Volume, {
                let tx = self.event_tx.clone();
                move |event| {
                    let _ = tx.send(event);
                }
            }),
        ];

        self.connected = Some(Connected {
            device,
            client,
            now_playing,
            volume,
            handles,
        });
        self.state = AppState::DeviceControl;
        self.status_message =
            "Connected! +/- volume, m mute, p play/pause, n/b skip, 1-6 presets, Esc back"
                .to_string();
    }

    fn pump_events(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            if let Some(connected) = &mut self.connected {
                match event {
                    SpeakerEvent::Volume(v) => {
                        connected.volume = Some(v);
                        self.status_message = "Volume updated by the speaker".to_string();
                    }
                    SpeakerEvent::NowPlaying(np) => {
                        connected.now_playing = Some(np);
                        self.status_message = "Playback updated by the speaker".to_string();
                    }
                    _ => {}
                }
            }
        }
    }

    async fn adjust_volume(&mut self, delta: i16) {
        if let Some(connected) = &mut self.connected {
            let current = connected.volume.map(|v| v.actual).unwrap_or(25);
            let next = (current as i16 + delta).clamp(0, 100) as u8;
            match connected.client.set_volume(next).await {
                Ok(()) => {
                    let muted = connected.volume.map(|v| v.muted).unwrap_or(false);
                    connected.volume = Some(VolumeState {
                        target: next,
                        actual: next,
                        muted,
                    });
                    self.status_message = format!("Volume: {}", next);
                }
                Err(e) => self.status_message = format!("Failed to set volume: {}", e),
            }
        } else {
            self.status_message = "No speaker connected".to_string();
        }
    }

    async fn toggle_mute(&mut self) {
        if let Some(connected) = &mut self.connected {
            let muted = connected.volume.map(|v| v.muted).unwrap_or(false);
            match connected.client.set_muted(!muted).await {
                Ok(()) => {
                    if let Some(v) = &mut connected.volume {
                        v.muted = !muted;
                    }
                    self.status_message =
                        format!("Mute: {}", if !muted { "ON" } else { "OFF" });
                }
                Err(e) => self.status_message = format!("Failed to set mute: {}", e),
            }
        } else {
            self.status_message = "No speaker connected".to_string();
        }
    }

    async fn toggle_playback(&mut self) {
        if let Some(connected) = &mut self.connected {
            let playing = connected
                .now_playing
                .as_ref()
                .map(NowPlaying::is_playing)
                .unwrap_or(false);
            let key = if playing { Key::Pause } else { Key::Play };
            match connected.client.press_key(key).await {
                Ok(()) => self.status_message = format!("Sent {}", key),
                Err(e) => self.status_message = format!("Failed to send {}: {}", key, e),
            }
        } else {
            self.status_message = "No speaker connected".to_string();
        }
    }

    async fn send_key(&mut self, key: Key) {
        if let Some(connected) = &mut self.connected {
            match connected.client.press_key(key).await {
                Ok(()) => self.status_message = format!("Sent {}", key),
                Err(e) => self.status_message = format!("Failed to send {}: {}", key, e),
            }
        } else {
            self.status_message = "No speaker connected".to_string();
        }
    }

    async fn recall_preset(&mut self, slot: u8) {
        if let Some(connected) = &mut self.connected {
            match connected.client.select_preset(slot).await {
                Ok(()) => self.status_message = format!("Recalled preset {}", slot),
                Err(e) => self.status_message = format!("Failed to recall preset: {}", e),
            }
        } else {
            self.status_message = "No speaker connected".to_string();
        }
    }

    async fn refresh_snapshots(&mut self) {
        if let Some(connected) = &mut self.connected {
            connected.now_playing = connected.client.now_playing().await.ok();
            connected.volume = connected.client.volume().await.ok();
            self.status_message = "Refreshed".to_string();
        }
    }

    async fn go_back(&mut self) {
        if let Some(connected) = self.connected.take() {
            for handle in connected.handles {
                self.events.unsubscribe(handle).await;
            }
        }
        self.state = AppState::Discovery;
        self.json_cursor = 0;
        self.json_scroll = 0;
        self.status_message = format!(
            "Found {} speaker(s). Press Enter to connect, r to rescan.",
            self.devices.len()
        );
    }

    fn json_line_count(&self) -> usize {
        self.snapshot_json().lines().count()
    }

    fn snapshot_json(&self) -> String {
        let Some(connected) = &self.connected else {
            return String::new();
        };
        let snapshot = serde_json::json!({
            "device": connected.device,
            "volume": connected.volume,
            "now_playing": connected.now_playing,
        });
        serde_json::to_string_pretty(&snapshot)
            .unwrap_or_else(|e| format!("Error serializing snapshot: {}", e))
    }

    fn json_cursor_down(&mut self, max_lines: usize, visible_height: usize) {
        if self.json_cursor + 1 < max_lines {
            self.json_cursor += 1;
            if self.json_cursor >= self.json_scroll + visible_height {
                self.json_scroll = self.json_cursor.saturating_sub(visible_height - 1);
            }
        }
    }

    fn json_cursor_up(&mut self) {
        if self.json_cursor > 0 {
            self.json_cursor -= 1;
            if self.json_cursor < self.json_scroll {
                self.json_scroll = self.json_cursor;
            }
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let outer_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(f.size());

    match app.state {
        AppState::Discovery => {
            render_discovery(f, app, outer_chunks[0]);
        }
        AppState::DeviceControl => {
            let inner_chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(outer_chunks[0]);

            render_device_control(f, app, inner_chunks[0]);
            render_json_dump(f, app, inner_chunks[1]);
        }
    }

    render_status(f, app, outer_chunks[1]);
}

fn render_discovery(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Discovered Speakers (j/k to select, Enter to connect, r rescan, q quit) ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    if app.devices.is_empty() {
        let text = if app.scan_rx.is_some() {
            "Scanning...\n\nProbing the local /24 for SoundTouch speakers."
        } else {
            "No speakers found.\n\nPress r to scan again."
        };
        let text = Paragraph::new(text).block(block).wrap(Wrap { trim: true });
        f.render_widget(text, area);
    } else {
        let items: Vec<ListItem> = app
            .devices
            .iter()
            .map(|device| {
                let content = vec![
                    Line::from(vec![
                        Span::styled("Name: ", Style::default().fg(Color::Yellow)),
                        Span::raw(device.name.clone()),
                    ]),
                    Line::from(vec![
                        Span::styled("Model: ", Style::default().fg(Color::Yellow)),
                        Span::raw(device.model.clone()),
                    ]),
                    Line::from(vec![
                        Span::styled("Address: ", Style::default().fg(Color::Yellow)),
                        Span::raw(format!("{}:{}", device.ip, device.port)),
                    ]),
                    Line::from(""),
                ];
                ListItem::new(content)
            })
            .collect();

        let mut state = ListState::default();
        state.select(Some(app.selected_index));

        let list = List::new(items)
            .block(block)
            .highlight_style(
                Style::default()
                    .bg(Color::DarkGray)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol(">> ");

        f.render_stateful_widget(list, area, &mut state);
    }
}

fn render_device_control(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Speaker (+/- vol, m mute, p play/pause, n/b skip, 1-6 presets, Esc back) ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    if let Some(connected) = &app.connected {
        let mut lines = vec![
            Line::from(vec![
                Span::styled(
                    "Speaker: ",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                ),
                Span::raw(format!(
                    "{} ({})",
                    connected.device.name, connected.device.model
                )),
            ]),
            Line::from(""),
        ];

        match &connected.volume {
            Some(volume) => {
                lines.push(Line::from(vec![
                    Span::styled("Volume: ", Style::default().fg(Color::Yellow)),
                    Span::styled(
                        format!("{}", volume.actual),
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    ),
                ]));
                lines.push(Line::from(vec![
                    Span::styled("Mute: ", Style::default().fg(Color::Yellow)),
                    Span::styled(
                        if volume.muted { "ON" } else { "OFF" },
                        if volume.muted {
                            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
                        } else {
                            Style::default().fg(Color::Green)
                        },
                    ),
                ]));
            }
            None => lines.push(Line::from("Volume unknown")),
        }
        lines.push(Line::from(""));

        match &connected.now_playing {
            Some(np) => {
                lines.push(Line::from(vec![
                    Span::styled("Source: ", Style::default().fg(Color::Yellow)),
                    Span::styled(
                        np.source.clone(),
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    ),
                ]));
                lines.push(Line::from(vec![
                    Span::styled("State: ", Style::default().fg(Color::Yellow)),
                    Span::styled(
                        if np.is_playing() { "PLAYING" } else { "STOPPED" },
                        if np.is_playing() {
                            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
                        } else {
                            Style::default().fg(Color::Gray)
                        },
                    ),
                ]));
                for (label, value) in [
                    ("Track: ", &np.track),
                    ("Artist: ", &np.artist),
                    ("Album: ", &np.album),
                    ("Station: ", &np.station_name),
                ] {
                    if let Some(value) = value {
                        lines.push(Line::from(vec![
                            Span::styled(label, Style::default().fg(Color::Yellow)),
                            Span::raw(value.clone()),
                        ]));
                    }
                }
            }
            None => lines.push(Line::from("Nothing playing")),
        }

        lines.push(Line::from(""));
        let channel = app.events.channel_state(connected.device.ip);
        lines.push(Line::from(vec![
            Span::styled("Events: ", Style::default().fg(Color::Yellow)),
            Span::styled(
                format!("{:?}", channel),
                if channel == ChannelState::Connected {
                    Style::default().fg(Color::Green)
                } else {
                    Style::default().fg(Color::Red)
                },
            ),
        ]));

        let text = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
        f.render_widget(text, area);
    } else {
        let text = Paragraph::new("Loading speaker data...")
            .block(block)
            .wrap(Wrap { trim: true });
        f.render_widget(text, area);
    }
}

fn render_json_dump(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Snapshot JSON (j/k scroll) ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta));

    if app.connected.is_some() {
        let json_str = app.snapshot_json();
        let json_lines: Vec<&str> = json_str.lines().collect();

        let styled_lines: Vec<Line> = json_lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                if i == app.json_cursor {
                    Line::from(Span::styled(
                        format!("> {}", line),
                        Style::default().bg(Color::DarkGray).fg(Color::White),
                    ))
                } else {
                    Line::from(format!("  {}", line))
                }
            })
            .collect();

        let height = area.height.saturating_sub(2) as usize;
        let scroll = if app.json_cursor >= app.json_scroll + height {
            app.json_cursor.saturating_sub(height - 1)
        } else if app.json_cursor < app.json_scroll {
            app.json_cursor
        } else {
            app.json_scroll
        };

        let text = Paragraph::new(styled_lines)
            .block(block)
            .scroll((scroll as u16, 0));

        f.render_widget(text, area);
    } else {
        let text = Paragraph::new("No speaker data available")
            .block(block)
            .wrap(Wrap { trim: true });

        f.render_widget(text, area);
    }
}

fn render_status(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Status ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Gray));

    let text = Paragraph::new(app.status_message.clone())
        .block(block)
        .wrap(Wrap { trim: true });

    f.render_widget(text, area);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Create app state and kick off the first scan
    let mut app = App::new();
    app.start_scan();

    // Main loop
    let res = run_app(&mut terminal, &mut app).await;

    // Drop event channels before leaving
    app.events.shutdown().await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {}", err);
    }

    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        app.poll_scan();
        app.pump_events();

        // Draw UI
        terminal.draw(|f| ui(f, app))?;

        // Handle input events (non-blocking)
        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match app.state {
                        AppState::Discovery => match key.code {
                            KeyCode::Char('q') => return Ok(()),
                            KeyCode::Char('j') | KeyCode::Down => app.select_next(),
                            KeyCode::Char('k') | KeyCode::Up => app.select_previous(),
                            KeyCode::Char('r') => app.start_scan(),
                            KeyCode::Enter => {
                                app.connect_to_selected().await;
                            }
                            _ => {}
                        },
                        AppState::DeviceControl => match key.code {
                            KeyCode::Char('q') => return Ok(()),
                            KeyCode::Esc => app.go_back().await,
                            KeyCode::Char('+') | KeyCode::Char('=') => {
                                app.adjust_volume(5).await;
                            }
                            KeyCode::Char('-') | KeyCode::Char('_') => {
                                app.adjust_volume(-5).await;
                            }
                            KeyCode::Char('m') => {
                                app.toggle_mute().await;
                            }
                            KeyCode::Char('p') => {
                                app.toggle_playback().await;
                            }
                            KeyCode::Char('n') => {
                                app.send_key(Key::NextTrack).await;
                            }
                            KeyCode::Char('b') => {
                                app.send_key(Key::PrevTrack).await;
                            }
                            KeyCode::Char('r') => {
                                app.refresh_snapshots().await;
                            }
                            KeyCode::Char(c @ '1'..='6') => {
                                let slot = c.to_digit(10).unwrap_or(0) as u8;
                                app.recall_preset(slot).await;
                            }
                            KeyCode::Char('j') => {
                                let line_count = app.json_line_count();
                                app.json_cursor_down(line_count, 20);
                            }
                            KeyCode::Char('k') => {
                                app.json_cursor_up();
                            }
                            _ => {}
                        },
                    }
                }
            }
        }
    }
}
