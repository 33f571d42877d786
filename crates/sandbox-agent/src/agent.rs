//! Command dispatch inside the sandboxed surface.
//!
//! Every handler runs to completion without blocking except the animation
//! ones, which first wait for the page's animation library. Those go onto a
//! per-agent queue drained by one task, so they reach the library in the
//! order they arrived and the caller never waits on them.
//!
//! Lock order is agent state first, then the document. Neither lock is held
//! across an `.await`.

use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use frame_bus::Bus;
use inspector_proto::{
    AnimationOp, AnimationParams, AnimationStatus, ApplyPayload, Command, Event, HighlightBox,
    InitAckPayload, PointerPayload, ProtoError, SelectorPayload, SerializedNode, TweakPayload,
};
use kurbo::{Point, Rect};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::animation::{AnimationEngine, LibraryGate};
use crate::dom::{Document, NodeId};
use crate::guard::InspectorGuard;
use crate::publisher::SurfaceBusPublisher;
use crate::selector::stable_selector;
use crate::{AgentError, AgentResult};

pub const HIGHLIGHT_CLASS: &str = "gsp-highlight";
/// Marks the inspector's own decoration element.
pub const OVERLAY_ATTRIBUTE: &str = "data-inspector-overlay";

const DEFAULT_LIBRARY_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Origin stamped on every event posted to the host.
    pub origin: String,
    /// Upper bound on waiting for the animation library; `None` waits forever.
    pub library_wait: Option<Duration>,
    pub highlight_class: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:5173".into(),
            library_wait: Some(DEFAULT_LIBRARY_WAIT),
            highlight_class: HIGHLIGHT_CLASS.into(),
        }
    }
}

#[derive(Debug, Default)]
struct AgentState {
    inspector_mode: bool,
    highlighted: Option<NodeId>,
    overlay: Option<NodeId>,
    guard: InspectorGuard,
}

/// What a queued command does once the library is available.
#[derive(Debug)]
enum LibraryWork {
    Animation { op: AnimationOp, params: AnimationParams },
    Tweak { properties: AnimationParams },
}

#[derive(Debug)]
struct LibraryJob {
    queued_at: Instant,
    selector: String,
    node: NodeId,
    work: LibraryWork,
    done: oneshot::Sender<()>,
}

/// Resolves once a queued command has run and reported.
pub type Pending = oneshot::Receiver<()>;

pub struct SandboxAgent<B: Bus> {
    document: Arc<Mutex<Document>>,
    state: Mutex<AgentState>,
    library: LibraryGate,
    /// Started with the first library-bound command.
    queue: Mutex<Option<mpsc::UnboundedSender<LibraryJob>>>,
    publisher: SurfaceBusPublisher<B>,
    config: AgentConfig,
}

impl<B: Bus + 'static> SandboxAgent<B> {
    pub fn new(bus: Arc<B>, document: Document, library: LibraryGate, config: AgentConfig) -> Arc<Self> {
        let publisher = SurfaceBusPublisher::new(bus, config.origin.clone());
        Arc::new(Self {
            document: Arc::new(Mutex::new(document)),
            state: Mutex::new(AgentState::default()),
            library,
            queue: Mutex::new(None),
            publisher,
            config,
        })
    }

    /// Shared handle to the live document, for page script running beside the agent.
    pub fn document(&self) -> Arc<Mutex<Document>> {
        Arc::clone(&self.document)
    }

    pub fn library(&self) -> &LibraryGate {
        &self.library
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn inspector_mode(&self) -> bool {
        self.state.lock().inspector_mode
    }

    pub fn highlighted(&self) -> Option<NodeId> {
        self.state.lock().highlighted
    }

    pub fn overlay(&self) -> Option<NodeId> {
        self.state.lock().overlay
    }

    pub fn guard_active(&self) -> bool {
        self.state.lock().guard.is_active()
    }

    /// Decodes one raw message and dispatches it. Unknown or malformed
    /// messages are logged and dropped.
    pub fn handle_message(self: &Arc<Self>, payload: &[u8]) -> Option<Pending> {
        match Command::decode(payload) {
            Ok(command) => self.dispatch(command),
            Err(ProtoError::UnknownType(kind)) => {
                warn!(target = "agent.dispatch", kind = %kind, "ignoring unknown command type");
                None
            }
            Err(err) => {
                warn!(target = "agent.dispatch", error = %err, "failed to decode command");
                None
            }
        }
    }

    /// Runs the handler for `command`. Returns a completion signal when the
    /// command was queued for the animation library.
    pub fn dispatch(self: &Arc<Self>, command: Command) -> Option<Pending> {
        debug!(target = "agent.dispatch", kind = command.kind(), "dispatching command");
        match command {
            Command::HandshakePing => {
                self.emit(&Event::HandshakeAck);
                None
            }
            Command::Init => {
                info!(target = "agent.dispatch", "agent initialised");
                self.emit(&Event::InitAck(InitAckPayload {
                    ready: true,
                    timestamp: unix_millis(),
                }));
                None
            }
            Command::InspectAt(pointer) => {
                self.inspect_at(pointer);
                None
            }
            Command::SelectAt(pointer) => {
                self.select_at(pointer);
                None
            }
            Command::SetInspectorMode { enabled } => {
                self.set_inspector_mode(enabled);
                None
            }
            Command::GetDomTree => {
                self.emit_dom_tree();
                None
            }
            Command::Apply(ApplyPayload { selector, animation }) => {
                self.enqueue(selector, LibraryWork::animation(AnimationOp::Apply, animation))
            }
            Command::Remove(SelectorPayload { selector }) => {
                self.enqueue(selector, LibraryWork::control(AnimationOp::Remove))
            }
            Command::Pause(SelectorPayload { selector }) => {
                self.enqueue(selector, LibraryWork::control(AnimationOp::Pause))
            }
            Command::Resume(SelectorPayload { selector }) => {
                self.enqueue(selector, LibraryWork::control(AnimationOp::Resume))
            }
            Command::Restart(SelectorPayload { selector }) => {
                self.enqueue(selector, LibraryWork::control(AnimationOp::Restart))
            }
            Command::Tweak(TweakPayload { selector, properties }) => {
                self.enqueue(selector, LibraryWork::Tweak { properties })
            }
        }
    }

    fn emit(&self, event: &Event) {
        match self.publisher.publish(event) {
            Ok(()) => debug!(target = "agent.bus", kind = event.kind(), "published event"),
            Err(err) => warn!(
                target = "agent.bus",
                error = %err,
                kind = event.kind(),
                "failed to publish event"
            ),
        }
    }

    fn inspect_at(&self, pointer: PointerPayload) {
        let rect = {
            let mut state = self.state.lock();
            let mut doc = self.document.lock();
            let Some(point) = surface_point(&doc, pointer) else {
                debug!(target = "agent.dispatch", x = pointer.x, y = pointer.y, "dropping out-of-bounds inspect");
                return;
            };
            let Some(target) = doc.element_from_point(point) else {
                return;
            };
            if state.highlighted == Some(target) {
                return;
            }
            self.set_highlighted(&mut state, &mut doc, Some(target));
            let rect = doc.bounding_client_rect(target);
            if state.inspector_mode {
                position_overlay(&mut state, &mut doc, rect);
            }
            rect
        };
        self.emit(&Event::Highlight(highlight_box(rect)));
    }

    fn select_at(&self, pointer: PointerPayload) {
        let selector = {
            let doc = self.document.lock();
            let Some(point) = surface_point(&doc, pointer) else {
                debug!(target = "agent.dispatch", x = pointer.x, y = pointer.y, "dropping out-of-bounds select");
                return;
            };
            doc.element_from_point(point)
                .and_then(|node| stable_selector(&doc, node))
        };
        if let Some(selector) = selector {
            info!(target = "agent.dispatch", selector = %selector, "element selected");
            self.emit(&Event::Selected(SelectorPayload { selector }));
        }
    }

    /// Clears the previous node's highlight class before marking the new one.
    fn set_highlighted(&self, state: &mut AgentState, doc: &mut Document, node: Option<NodeId>) {
        if let Some(previous) = state.highlighted.take() {
            doc.remove_class(previous, &self.config.highlight_class);
        }
        if let Some(node) = node {
            doc.add_class(node, &self.config.highlight_class);
        }
        state.highlighted = node;
    }

    fn set_inspector_mode(&self, enabled: bool) {
        let mut state = self.state.lock();
        let mut doc = self.document.lock();
        state.inspector_mode = enabled;
        if enabled {
            let overlay = state.overlay.filter(|overlay| doc.is_connected(*overlay));
            if state.guard.activate(&mut doc, overlay) {
                info!(target = "agent.guard", "inspector mode on");
            }
            return;
        }
        if state.guard.deactivate(&mut doc) {
            info!(target = "agent.guard", "inspector mode off");
        }
        self.set_highlighted(&mut state, &mut doc, None);
        if let Some(overlay) = state.overlay {
            doc.remove(overlay);
        }
    }

    fn emit_dom_tree(&self) {
        let tree = {
            let state = self.state.lock();
            let doc = self.document.lock();
            serialize_tree(&doc, doc.body(), state.overlay, &self.config.highlight_class)
        };
        self.emit(&Event::DomTree(tree));
    }

    fn resolve(&self, selector: &str) -> AgentResult<NodeId> {
        self.document
            .lock()
            .query_selector(selector)?
            .ok_or_else(|| AgentError::ElementNotFound {
                selector: selector.to_string(),
            })
    }

    fn report_failure(&self, selector: String, err: &AgentError) {
        warn!(target = "agent.animation", selector = %selector, error = %err, "command failed");
        self.emit(&Event::error(err.to_string(), Some(selector)));
    }

    /// Resolves `selector` now, then queues the work behind every earlier
    /// library-bound command.
    fn enqueue(self: &Arc<Self>, selector: String, work: LibraryWork) -> Option<Pending> {
        let node = match self.resolve(&selector) {
            Ok(node) => node,
            Err(err) => {
                self.report_failure(selector, &err);
                return None;
            }
        };
        let (done, pending) = oneshot::channel();
        let job = LibraryJob {
            queued_at: Instant::now(),
            selector,
            node,
            work,
            done,
        };
        let mut queue = self.queue.lock();
        let tx = queue.get_or_insert_with(|| self.spawn_library_worker());
        if let Err(mpsc::error::SendError(job)) = tx.send(job) {
            warn!(target = "agent.animation", selector = %job.selector, "library queue closed; dropping command");
            return None;
        }
        Some(pending)
    }

    fn spawn_library_worker(self: &Arc<Self>) -> mpsc::UnboundedSender<LibraryJob> {
        let (tx, mut rx) = mpsc::unbounded_channel::<LibraryJob>();
        let agent: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let Some(agent) = agent.upgrade() else {
                    break;
                };
                agent.run_library_job(job).await;
            }
            debug!(target = "agent.animation", "library queue drained");
        });
        tx
    }

    async fn run_library_job(&self, job: LibraryJob) {
        let LibraryJob {
            queued_at,
            selector,
            node,
            work,
            done,
        } = job;
        let result = match self.library.ready_since(queued_at, self.config.library_wait).await {
            Ok(engine) => self.run_library_work(engine.as_ref(), node, &selector, &work),
            Err(err) => Err(err),
        };
        match (result, work) {
            (Ok(()), LibraryWork::Animation { op, .. }) => {
                debug!(target = "agent.animation", op = op.as_str(), selector = %selector, "animation command applied");
                self.emit(&Event::animation_status(
                    op,
                    AnimationStatus {
                        selector,
                        success: true,
                    },
                ));
            }
            (Ok(()), LibraryWork::Tweak { .. }) => {}
            (Err(err), _) => self.report_failure(selector, &err),
        }
        let _ = done.send(());
    }

    fn run_library_work(
        &self,
        engine: &dyn AnimationEngine,
        node: NodeId,
        selector: &str,
        work: &LibraryWork,
    ) -> AgentResult<()> {
        let mut doc = self.document.lock();
        if !doc.is_connected(node) {
            return Err(AgentError::ElementNotFound {
                selector: selector.to_string(),
            });
        }
        let outcome = match work {
            LibraryWork::Animation { op, params } => match op {
                AnimationOp::Apply => engine.to(&mut doc, node, params),
                AnimationOp::Remove => engine.kill_tweens_of(&mut doc, node),
                AnimationOp::Pause => engine.pause_tweens_of(&mut doc, node),
                AnimationOp::Resume => engine.resume_tweens_of(&mut doc, node),
                AnimationOp::Restart => engine.restart_tweens_of(&mut doc, node),
            },
            LibraryWork::Tweak { properties } => engine.set(&mut doc, node, properties),
        };
        outcome.map_err(|reason| AgentError::Engine {
            selector: selector.to_string(),
            reason,
        })
    }
}

impl LibraryWork {
    fn animation(op: AnimationOp, params: AnimationParams) -> Self {
        LibraryWork::Animation { op, params }
    }

    fn control(op: AnimationOp) -> Self {
        Self::animation(op, AnimationParams::new())
    }
}

/// Accepts finite, non-negative points inside the viewport.
fn surface_point(doc: &Document, pointer: PointerPayload) -> Option<Point> {
    let viewport = doc.viewport();
    let PointerPayload { x, y } = pointer;
    let inside = x.is_finite()
        && y.is_finite()
        && x >= 0.0
        && y >= 0.0
        && x < viewport.width
        && y < viewport.height;
    inside.then(|| Point::new(x, y))
}

fn highlight_box(rect: Rect) -> HighlightBox {
    HighlightBox {
        top: rect.y0,
        left: rect.x0,
        width: rect.width(),
        height: rect.height(),
    }
}

fn position_overlay(state: &mut AgentState, doc: &mut Document, rect: Rect) {
    let html = doc.document_element();
    let overlay = match state.overlay {
        Some(overlay) => overlay,
        None => {
            let overlay = doc
                .append_element(html, "div")
                .attr(OVERLAY_ATTRIBUTE, "")
                .build();
            state.overlay = Some(overlay);
            overlay
        }
    };
    if !doc.is_connected(overlay) {
        doc.append_child(html, overlay);
    }
    doc.set_layout_rect(overlay, rect);
    if state.guard.is_active() {
        state.guard.shield(doc, overlay);
    }
}

fn serialize_tree(doc: &Document, node: NodeId, overlay: Option<NodeId>, highlight_class: &str) -> SerializedNode {
    let classes: Vec<&str> = doc.classes(node).filter(|c| *c != highlight_class).collect();
    SerializedNode {
        tag_name: doc.tag(node).unwrap_or_default().to_string(),
        id: doc.id(node).unwrap_or_default().to_string(),
        classes: classes.join(" "),
        stable_selector: stable_selector(doc, node).unwrap_or_default(),
        children: doc
            .element_children(node)
            .filter(|child| Some(*child) != overlay)
            .map(|child| serialize_tree(doc, child, overlay, highlight_class))
            .collect(),
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
