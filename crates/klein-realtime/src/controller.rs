//! Session controller: one actor owning the realtime connection, the
//! debounce and watchdog timers and the display state.
//!
//! Front ends talk to it through a cloneable [`SessionHandle`]. Strokes are
//! painted straight into the shared surface by the handle; the controller only
//! learns that something changed and decides when to capture and send.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use image::DynamicImage;
use klein_canvas::{CaptureError, CapturedFrame, DrawingSurface, FrameCapture};
use klein_core::config::Config;
use klein_core::{
    GenerationRequest, GenerationResult, PresetCatalog, Status, Theme, ViewMode, compose_prompt,
    to_display_src,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::debounce::Debouncer;
use crate::display::DisplayState;
use crate::transport::{TransportChannel, TransportConnector, TransportError, TransportEvent};
use crate::watchdog::Watchdog;

/// Drawing surface shared between the handle (writer) and the controller
/// (reader at capture time).
pub type SharedSurface = Arc<RwLock<DrawingSurface>>;

/// Requests from the front end to the controller.
#[derive(Debug)]
pub enum SessionCommand {
    StrokeStarted,
    StrokeMoved,
    StrokeEnded,
    /// The whole surface was replaced with a loaded sketch.
    SketchLoaded,
    SelectPreset(String),
    SetViewMode(ViewMode),
    SetTheme(Theme),
    Clear,
    /// Open the realtime connection ahead of the first send.
    Connect,
}

/// Cloneable handle for driving a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    surface: SharedSurface,
    state: watch::Receiver<DisplayState>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn begin_stroke(&self, x: f32, y: f32) {
        if let Ok(mut surface) = self.surface.write() {
            surface.pen_down(x, y);
        }
        self.send(SessionCommand::StrokeStarted);
    }

    pub fn extend_stroke(&self, x: f32, y: f32) {
        let painted = match self.surface.write() {
            Ok(mut surface) => surface.pen_move(x, y),
            Err(_) => false,
        };
        if painted {
            self.send(SessionCommand::StrokeMoved);
        }
    }

    pub fn end_stroke(&self) {
        let was_drawing = match self.surface.write() {
            Ok(mut surface) => surface.pen_up(),
            Err(_) => false,
        };
        if was_drawing {
            self.send(SessionCommand::StrokeEnded);
        }
    }

    /// Replace the surface content with an existing sketch and treat it as
    /// a drawing.
    pub fn load_sketch(&self, image: DynamicImage) {
        let theme = self.state.borrow().theme;
        if let Ok(mut surface) = self.surface.write() {
            *surface = DrawingSurface::from_image(image, theme);
        }
        self.send(SessionCommand::SketchLoaded);
    }

    /// Reallocate the surface to a new pane size. Content is lost.
    pub fn resize(&self, width: u32, height: u32) {
        if let Ok(mut surface) = self.surface.write() {
            surface.resize(width, height);
        }
    }

    pub fn select_preset(&self, id: impl Into<String>) {
        self.send(SessionCommand::SelectPreset(id.into()));
    }

    pub fn set_view_mode(&self, mode: ViewMode) {
        self.send(SessionCommand::SetViewMode(mode));
    }

    pub fn set_theme(&self, theme: Theme) {
        self.send(SessionCommand::SetTheme(theme));
    }

    pub fn clear(&self) {
        self.send(SessionCommand::Clear);
    }

    pub fn connect(&self) {
        self.send(SessionCommand::Connect);
    }

    /// Snapshot of the current display state.
    pub fn state(&self) -> DisplayState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DisplayState> {
        self.state.clone()
    }

    /// Wait until the display state satisfies `predicate`. Returns `None` if
    /// the controller stopped first.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&DisplayState) -> bool,
    ) -> Option<DisplayState> {
        let mut rx = self.state.clone();
        rx.wait_for(|state| predicate(state))
            .await
            .ok()
            .map(|state| state.clone())
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn send(&self, command: SessionCommand) {
        if self.commands.send(command).is_err() {
            debug!("Session controller stopped, dropping command");
        }
    }
}

enum Wakeup {
    Command(SessionCommand),
    Transport(TransportEvent),
    DebounceElapsed,
    WatchdogElapsed,
}

/// The realtime generation session.
pub struct SessionController {
    connector: Arc<dyn TransportConnector>,
    connection: Option<Box<dyn TransportChannel>>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    presets: PresetCatalog,
    capture: FrameCapture,
    surface: SharedSurface,
    debouncer: Debouncer,
    watchdog: Watchdog,
    has_drawn: bool,
    state: DisplayState,
    display: watch::Sender<DisplayState>,
}

impl SessionController {
    /// Spawn the controller task. The connection is opened lazily on the
    /// first send unless `session.connect_on_start` is set.
    pub fn start(
        config: &Config,
        connector: Arc<dyn TransportConnector>,
    ) -> (SessionHandle, JoinHandle<()>) {
        let session = config.session();
        let presets = config.preset_catalog();
        if !presets.contains(&session.preset) {
            warn!(preset = %session.preset, "Unknown initial preset, using studio");
        }

        let surface: SharedSurface = Arc::new(RwLock::new(DrawingSurface::new(
            session.capture_size,
            session.capture_size,
            session.theme,
        )));
        let state = DisplayState::new(session.preset.clone(), session.theme, session.view_mode);
        let (display, state_rx) = watch::channel(state.clone());
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let handle = SessionHandle {
            commands: commands_tx,
            surface: surface.clone(),
            state: state_rx,
            cancel: cancel.clone(),
        };

        let mut controller = Self {
            connector,
            connection: None,
            events_tx,
            events_rx,
            commands: commands_rx,
            presets,
            capture: FrameCapture::new(session.capture_size, session.jpeg_quality),
            surface,
            debouncer: Debouncer::new(session.debounce()),
            watchdog: Watchdog::new(session.watchdog()),
            has_drawn: false,
            state,
            display,
        };

        let connect_on_start = session.connect_on_start;
        let task = tokio::spawn(async move {
            info!(
                preset = %controller.state.preset,
                theme = ?controller.state.theme,
                view_mode = ?controller.state.view_mode,
                "Session started"
            );
            if connect_on_start {
                controller.handle_command(SessionCommand::Connect);
                controller.publish();
            }
            controller.run(cancel).await;
            info!("Session ended");
        });

        (handle, task)
    }

    async fn run(&mut self, cancel: CancellationToken) {
        loop {
            let wakeup = tokio::select! {
                _ = cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => Wakeup::Command(command),
                    None => break,
                },
                Some(event) = self.events_rx.recv() => Wakeup::Transport(event),
                _ = self.debouncer.elapsed() => Wakeup::DebounceElapsed,
                _ = self.watchdog.expired() => Wakeup::WatchdogElapsed,
            };

            match wakeup {
                Wakeup::Command(command) => self.handle_command(command),
                Wakeup::Transport(TransportEvent::Result(result)) => self.on_result(result),
                Wakeup::Transport(TransportEvent::Error(err)) => self.on_error(err),
                Wakeup::DebounceElapsed => self.send_frame(),
                Wakeup::WatchdogElapsed => self.on_watchdog(),
            }
            self.publish();
        }
        self.connection = None;
    }

    fn handle_command(&mut self, command: SessionCommand) {
        debug!(?command, "Session command");
        match command {
            SessionCommand::StrokeStarted => {
                if self.state.view_mode == ViewMode::Merge {
                    self.state.show_sketch = true;
                }
            }
            SessionCommand::StrokeMoved | SessionCommand::SketchLoaded => {
                self.has_drawn = true;
                self.debouncer.schedule();
            }
            SessionCommand::StrokeEnded => self.debouncer.schedule(),
            SessionCommand::SelectPreset(id) => {
                if !self.presets.contains(&id) {
                    warn!(preset = %id, "Unknown preset, studio phrase will be used");
                }
                self.state.preset = id;
                if self.has_drawn {
                    self.debouncer.schedule_after(Duration::ZERO);
                }
            }
            SessionCommand::SetViewMode(mode) => {
                self.state.view_mode = mode;
                self.state.show_sketch = false;
            }
            SessionCommand::SetTheme(theme) => {
                self.state.theme = theme;
                if let Ok(mut surface) = self.surface.write() {
                    surface.set_theme(theme);
                }
                self.clear_scene();
            }
            SessionCommand::Clear => self.clear_scene(),
            SessionCommand::Connect => match self.ensure_connected() {
                Ok(true) => self.state.status = Status::Listening,
                Ok(false) => {}
                Err(e) => {
                    error!(error = %e, "Realtime connect failed");
                    self.state.status = Status::ConnectionError;
                }
            },
        }
    }

    /// Open the transport channel if none exists. Returns whether a new
    /// channel was opened.
    fn ensure_connected(&mut self) -> Result<bool, TransportError> {
        if self.connection.is_some() {
            return Ok(false);
        }
        let channel = self.connector.connect(self.events_tx.clone())?;
        self.connection = Some(channel);
        info!("Realtime connection established");
        Ok(true)
    }

    /// Debounced send: capture the surface and forward one request.
    fn send_frame(&mut self) {
        if !self.has_drawn {
            return;
        }

        self.mark_generating();
        self.state.attempts += 1;

        let frame = match self.capture_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "Frame capture failed");
                self.clear_generating();
                return;
            }
        };

        if let Err(e) = self.ensure_connected() {
            error!(error = %e, "Realtime connect failed");
            self.clear_generating();
            self.state.status = Status::ConnectionError;
            return;
        }

        let phrase = self.presets.phrase(&self.state.preset);
        let prompt = compose_prompt(phrase, self.state.theme);
        let request = GenerationRequest::new(frame.data_uri(), prompt);
        debug!(preset = %self.state.preset, bytes = frame.jpeg.len(), "Sending generation request");

        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        if let Err(e) = connection.send(request) {
            error!(error = %e, "Send failed");
            self.clear_generating();
            self.state.status = Status::SendError;
            if matches!(e, TransportError::Closed) {
                self.connection = None;
            }
        }
    }

    fn capture_frame(&self) -> Result<CapturedFrame, CaptureError> {
        let surface = self.surface.read().map_err(|_| CaptureError::Poisoned)?;
        self.capture
            .capture(&surface, self.state.theme.palette().canvas_bg)
    }

    fn on_result(&mut self, result: GenerationResult) {
        self.clear_generating();

        if result.is_error() {
            warn!(error = ?result.error, status = ?result.status, "Realtime result reported an error");
            self.state.status = Status::Listening;
            return;
        }

        let Some(image) = result.latest_image().filter(|image| image.has_content()) else {
            debug!("Result carried no image");
            self.state.status = Status::Listening;
            return;
        };

        let Some(src) = to_display_src(image) else {
            self.state.status = Status::Listening;
            return;
        };

        self.state.output_src = Some(src);
        self.state.output_visible = true;
        self.state.placeholder_visible = false;
        if self.state.view_mode == ViewMode::Merge {
            self.state.show_sketch = false;
        }
        self.state.status = Status::Ready;
        self.state.renders += 1;
    }

    fn on_error(&mut self, err: TransportError) {
        error!(error = %err, "Realtime transport error");
        self.clear_generating();
        self.state.status = Status::ConnectionError;
    }

    fn on_watchdog(&mut self) {
        warn!(
            timeout_secs = self.watchdog.timeout().as_secs(),
            "No result received, resetting generating state"
        );
        self.clear_generating();
        self.state.status = Status::Listening;
    }

    fn mark_generating(&mut self) {
        self.state.generating = true;
        self.state.status = Status::Generating;
        self.watchdog.arm();
    }

    fn clear_generating(&mut self) {
        self.state.generating = false;
        self.watchdog.disarm();
    }

    fn clear_scene(&mut self) {
        if let Ok(mut surface) = self.surface.write() {
            surface.clear();
        }
        self.has_drawn = false;
        self.state.output_visible = false;
        self.state.output_src = None;
        self.state.placeholder_visible = true;
        self.state.generating = false;
        self.state.show_sketch = false;
        self.state.status = Status::DrawSomething;
    }

    fn publish(&self) {
        self.display.send_if_modified(|current| {
            if *current == self.state {
                false
            } else {
                *current = self.state.clone();
                true
            }
        });
    }
}
