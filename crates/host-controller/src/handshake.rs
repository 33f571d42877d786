//! Host side of the ping/ack handshake.
//!
//! Each surface load opens a new epoch. A ping task belongs to the epoch it
//! was started in and stops as soon as that epoch is no longer pinging.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeState {
    #[default]
    Disconnected,
    Pinging,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    BecameReady,
    AlreadyReady,
    /// No load is in flight; the ack is stale.
    Ignored,
}

#[derive(Debug, Default)]
pub struct Handshake {
    state: HandshakeState,
    epoch: u64,
    attempts: u64,
}

impl Handshake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == HandshakeState::Ready
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Pings sent in the current epoch.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// The surface (re)loaded: start pinging under a fresh epoch.
    pub fn begin(&mut self) -> u64 {
        self.epoch += 1;
        self.attempts = 0;
        self.state = HandshakeState::Pinging;
        self.epoch
    }

    pub fn reset(&mut self) {
        self.epoch += 1;
        self.attempts = 0;
        self.state = HandshakeState::Disconnected;
    }

    /// Counts a ping for `epoch`. `None` tells the ping task to stop.
    pub fn record_ping(&mut self, epoch: u64) -> Option<u64> {
        if epoch != self.epoch || self.state != HandshakeState::Pinging {
            return None;
        }
        self.attempts += 1;
        Some(self.attempts)
    }

    pub fn on_ack(&mut self) -> AckOutcome {
        match self.state {
            HandshakeState::Pinging => {
                self.state = HandshakeState::Ready;
                AckOutcome::BecameReady
            }
            HandshakeState::Ready => AckOutcome::AlreadyReady,
            HandshakeState::Disconnected => AckOutcome::Ignored,
        }
    }
}

/// Unanswered pings warn at `warn_after`, then again each time the count doubles.
pub fn should_warn(attempts: u64, warn_after: u64) -> bool {
    if warn_after == 0 || attempts < warn_after || attempts % warn_after != 0 {
        return false;
    }
    (attempts / warn_after).is_power_of_two()
}
