//! Sandbox agent: the message handler resident inside the framed surface.
//!
//! Responsibilities:
//! - answering the host's handshake pings
//! - hit-testing the live document and reporting highlight boxes
//! - addressing elements with stable selectors
//! - holding the page's own hover effects still while the inspector is on
//! - forwarding animation commands to the page's animation library

use frame_bus::BusError;
use inspector_proto::ProtoError;
use thiserror::Error;

pub mod agent;
pub mod animation;
pub mod dom;
pub mod guard;
pub mod publisher;
pub mod selector;
pub mod subscriber;

pub use agent::{AgentConfig, Pending, SandboxAgent, HIGHLIGHT_CLASS, OVERLAY_ATTRIBUTE};
pub use animation::{AnimationEngine, LibraryGate, TweenRegistry, TweenState};
pub use guard::InspectorGuard;
pub use publisher::SurfaceBusPublisher;
pub use selector::stable_selector;
pub use subscriber::SurfaceBusSubscriber;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },
    #[error("invalid selector: {0}")]
    InvalidSelector(#[from] dom::QueryError),
    #[error("animation library unavailable after {waited_ms} ms")]
    DependencyUnavailable { waited_ms: u64 },
    #[error("{reason}")]
    Engine { selector: String, reason: String },
    #[error(transparent)]
    Proto(#[from] ProtoError),
    #[error(transparent)]
    Bus(#[from] BusError),
}

pub type AgentResult<T> = Result<T, AgentError>;
