//! Editor-side controller for a sandboxed surface.
//!
//! Owns the handshake with the surface agent, posts commands into the
//! surface, and folds the agent's events into [`EditorState`]. Only the host
//! listens on a window anyone can post to, so every inbound event is checked
//! against the expected origin before it is believed.

use frame_bus::BusError;
use inspector_proto::ProtoError;
use thiserror::Error;

pub mod config;
pub mod controller;
pub mod handshake;
pub mod state;
pub mod viewport;

#[cfg(test)]
mod testing;

pub use config::HostConfig;
pub use controller::HostController;
pub use handshake::{AckOutcome, Handshake, HandshakeState};
pub use state::{AnimationRecord, EditorState};
pub use viewport::{CanvasView, SurfaceGeometry, ViewportMapper};

#[derive(Debug, Error)]
pub enum HostError {
    #[error("no surface mounted")]
    NotMounted,
    #[error(transparent)]
    Proto(#[from] ProtoError),
    #[error(transparent)]
    Bus(#[from] BusError),
}

pub type HostResult<T> = Result<T, HostError>;
