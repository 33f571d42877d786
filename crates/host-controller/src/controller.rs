use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use frame_bus::{Bus, BusError, BusMessage};
use inspector_proto::{
    AnimationOp, AnimationParams, Command, Event, PointerPayload, ProtoError, TweakPayload,
    TOPIC_HOST_WINDOW, TOPIC_SURFACE_WINDOW,
};
use kurbo::{Point, Rect};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::HostConfig;
use crate::handshake::{should_warn, AckOutcome, Handshake, HandshakeState};
use crate::state::EditorState;
use crate::viewport::{CanvasView, SurfaceGeometry, ViewportMapper};
use crate::{HostError, HostResult};

#[derive(Debug, Default)]
struct Core {
    handshake: Handshake,
    surface: Option<SurfaceGeometry>,
    view: CanvasView,
    inspector_mode: bool,
    editor: EditorState,
}

struct Inner<B: Bus> {
    bus: Arc<B>,
    config: HostConfig,
    core: Mutex<Core>,
    ping_task: Mutex<Option<JoinHandle<()>>>,
}

/// Cheap to clone; clones share one controller.
pub struct HostController<B: Bus> {
    inner: Arc<Inner<B>>,
}

impl<B: Bus> Clone for HostController<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Bus + 'static> HostController<B> {
    pub fn new(bus: Arc<B>, config: HostConfig) -> Self {
        let core = Core {
            inspector_mode: config.inspector_on_ready,
            ..Core::default()
        };
        Self {
            inner: Arc::new(Inner {
                bus,
                config,
                core: Mutex::new(core),
                ping_task: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.inner.config
    }

    /// The surface element now exists at `geometry`; it has not loaded yet.
    pub fn mount_surface(&self, geometry: SurfaceGeometry) {
        let mut core = self.inner.core.lock();
        core.surface = Some(geometry);
        core.handshake.reset();
        core.editor.clear_surface();
    }

    /// Moves or resizes the mounted surface without reloading it.
    pub fn set_surface_geometry(&self, geometry: SurfaceGeometry) {
        let mut core = self.inner.core.lock();
        if core.surface.is_some() {
            core.surface = Some(geometry);
        }
    }

    pub fn unmount_surface(&self) {
        self.stop_pinging();
        let mut core = self.inner.core.lock();
        core.surface = None;
        core.handshake.reset();
        core.editor.clear_surface();
    }

    /// The surface fired its load event, first load or reload. Restarts the
    /// handshake; state tied to the previous load is dropped and re-requested
    /// once the agent answers again.
    pub fn surface_loaded(&self) {
        let epoch = {
            let mut core = self.inner.core.lock();
            if core.surface.is_none() {
                warn!(target = "host.handshake", "load event without a mounted surface");
                return;
            }
            core.editor.clear_surface();
            core.handshake.begin()
        };
        info!(target = "host.handshake", epoch, "surface loaded, starting handshake");

        let controller = self.clone();
        let period = Duration::from_millis(self.inner.config.ping_interval_ms);
        let warn_after = self.inner.config.ping_warn_after;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(attempts) = controller.inner.core.lock().handshake.record_ping(epoch) else {
                    break;
                };
                if should_warn(attempts, warn_after) {
                    warn!(
                        target = "host.handshake",
                        attempts,
                        epoch,
                        "surface has not acknowledged the handshake yet"
                    );
                }
                controller.send(Command::HandshakePing);
            }
            debug!(target = "host.handshake", epoch, "ping loop finished");
        });
        if let Some(previous) = self.inner.ping_task.lock().replace(task) {
            previous.abort();
        }
    }

    fn stop_pinging(&self) {
        if let Some(task) = self.inner.ping_task.lock().take() {
            task.abort();
        }
    }

    /// Posts `command` into the surface. Never fails: a missing surface or a
    /// closed channel is logged and the command dropped.
    pub fn send(&self, command: Command) {
        match self.try_send(&command) {
            Ok(()) => debug!(target = "host.commands", kind = command.kind(), "sent command"),
            Err(HostError::Bus(BusError::Closed(_))) => warn!(
                target = "host.commands",
                kind = command.kind(),
                "surface window has no listener"
            ),
            Err(err) => warn!(
                target = "host.commands",
                kind = command.kind(),
                error = %err,
                "dropping command"
            ),
        }
    }

    fn try_send(&self, command: &Command) -> HostResult<()> {
        if self.inner.core.lock().surface.is_none() {
            return Err(HostError::NotMounted);
        }
        let payload = command.encode()?;
        self.inner.bus.publish(
            TOPIC_SURFACE_WINDOW,
            &self.inner.config.host_origin,
            Bytes::from(payload),
        )?;
        Ok(())
    }

    /// Subscribes to the host window and reduces every event posted there.
    pub fn spawn_event_worker(&self) -> JoinHandle<()> {
        let mut rx = self.inner.bus.subscribe(TOPIC_HOST_WINDOW);
        let controller = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(msg) => controller.handle_inbound(&msg),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(target = "host.events", skipped, "event worker lagged behind host window");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn handle_inbound(&self, msg: &BusMessage) {
        let expected = self.inner.config.expected_origin();
        if msg.origin != expected {
            warn!(
                target = "host.events",
                origin = %msg.origin,
                expected = %expected,
                "rejected message from unauthorized origin"
            );
            return;
        }
        match Event::decode(&msg.payload) {
            Ok(event) => self.reduce(event),
            Err(ProtoError::UnknownType(kind)) => {
                warn!(target = "host.events", kind = %kind, "ignoring unknown event type");
            }
            Err(err) => warn!(target = "host.events", error = %err, "failed to decode event"),
        }
    }

    fn reduce(&self, event: Event) {
        if event != Event::HandshakeAck {
            let mut core = self.inner.core.lock();
            core.editor.apply(event, self.inner.config.error_history);
            return;
        }

        let (outcome, inspector_mode) = {
            let mut core = self.inner.core.lock();
            (core.handshake.on_ack(), core.inspector_mode)
        };
        match outcome {
            AckOutcome::BecameReady => {
                self.stop_pinging();
                info!(target = "host.handshake", "surface ready");
                self.send(Command::SetInspectorMode {
                    enabled: inspector_mode,
                });
                self.send(Command::GetDomTree);
            }
            AckOutcome::AlreadyReady => {
                debug!(target = "host.handshake", "duplicate handshake ack");
            }
            AckOutcome::Ignored => {
                debug!(target = "host.handshake", "handshake ack with no load in flight");
            }
        }
    }

    fn mapper_if_live(&self) -> Option<ViewportMapper> {
        let core = self.inner.core.lock();
        if !core.inspector_mode || !core.handshake.is_ready() {
            return None;
        }
        core.surface.map(|geometry| ViewportMapper::new(geometry, core.view))
    }

    /// Hover in the host viewport. Returns whether a hit-test was sent.
    pub fn pointer_move(&self, pointer: Point) -> bool {
        self.send_pointer(pointer, Command::InspectAt)
    }

    /// Click in the host viewport. Returns whether a selection was sent.
    pub fn click(&self, pointer: Point) -> bool {
        self.send_pointer(pointer, Command::SelectAt)
    }

    fn send_pointer(&self, pointer: Point, command: fn(PointerPayload) -> Command) -> bool {
        let Some(local) = self
            .mapper_if_live()
            .and_then(|mapper| mapper.pointer_to_local(pointer))
        else {
            return false;
        };
        self.send(command(PointerPayload {
            x: local.x,
            y: local.y,
        }));
        true
    }

    pub fn set_inspector_mode(&self, enabled: bool) {
        let ready = {
            let mut core = self.inner.core.lock();
            core.inspector_mode = enabled;
            if !enabled {
                core.editor.highlight = None;
            }
            core.handshake.is_ready()
        };
        if ready {
            self.send(Command::SetInspectorMode { enabled });
        }
    }

    pub fn set_canvas_view(&self, view: CanvasView) {
        self.inner.core.lock().view = view.clamped();
    }

    pub fn request_dom_tree(&self) {
        self.send(Command::GetDomTree);
    }

    pub fn init(&self) {
        self.send(Command::Init);
    }

    pub fn apply(&self, selector: impl Into<String>, animation: AnimationParams) {
        self.send(Command::animation(AnimationOp::Apply, selector, animation));
    }

    pub fn remove(&self, selector: impl Into<String>) {
        self.send(Command::animation(AnimationOp::Remove, selector, AnimationParams::new()));
    }

    pub fn pause(&self, selector: impl Into<String>) {
        self.send(Command::animation(AnimationOp::Pause, selector, AnimationParams::new()));
    }

    pub fn resume(&self, selector: impl Into<String>) {
        self.send(Command::animation(AnimationOp::Resume, selector, AnimationParams::new()));
    }

    pub fn restart(&self, selector: impl Into<String>) {
        self.send(Command::animation(AnimationOp::Restart, selector, AnimationParams::new()));
    }

    pub fn tweak(&self, selector: impl Into<String>, properties: Map<String, Value>) {
        self.send(Command::Tweak(TweakPayload {
            selector: selector.into(),
            properties,
        }));
    }

    pub fn handshake_state(&self) -> HandshakeState {
        self.inner.core.lock().handshake.state()
    }

    pub fn ping_attempts(&self) -> u64 {
        self.inner.core.lock().handshake.attempts()
    }

    pub fn inspector_mode(&self) -> bool {
        self.inner.core.lock().inspector_mode
    }

    pub fn editor_state(&self) -> EditorState {
        self.inner.core.lock().editor.clone()
    }

    pub fn selected(&self) -> Option<String> {
        self.inner.core.lock().editor.selected.clone()
    }

    /// Current highlight in host viewport pixels, ready to draw.
    pub fn highlight_rect(&self) -> Option<Rect> {
        let core = self.inner.core.lock();
        let mapper = ViewportMapper::new(core.surface?, core.view);
        mapper.rect_to_host(core.editor.highlight?)
    }
}
