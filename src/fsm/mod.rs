//! Lifecycle state machines for the webhook listener and the store
//! connection.
//!
//! Transitions are explicit and fallible. An invalid transition is not a bug
//! to panic on: the coordinator treats a refused `Ready -> Draining`
//! transition as "a drain is already running" and skips the overlapping
//! request.

mod coordinator;

pub use coordinator::{Coordinator, WakeHandle};

use thiserror::Error;

/// Error returned when a lifecycle transition is not allowed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid transition from {from} on {event}")]
pub struct TransitionError {
    pub from: &'static str,
    pub event: &'static str,
}

/// Webhook listener lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Not yet serving.
    Init,
    /// Serving, no unprocessed wake-up.
    Ready,
    /// At least one webhook was accepted since the last completed drain.
    HookResponsed,
}

impl ListenerState {
    fn name(self) -> &'static str {
        match self {
            ListenerState::Init => "Init",
            ListenerState::Ready => "Ready",
            ListenerState::HookResponsed => "HookResponsed",
        }
    }
}

/// Tracks whether webhook arrivals are pending a drain.
///
/// `HookResponsed` is a level, not a counter: any number of webhooks accepted
/// between two drains collapse into one pending flag, which is what bounds
/// follow-up drains to one per burst.
#[derive(Debug)]
pub struct ListenerMachine {
    state: ListenerState,
}

impl ListenerMachine {
    pub fn new() -> Self {
        ListenerMachine {
            state: ListenerState::Init,
        }
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// The server has bound its socket and is accepting requests.
    pub fn server_started(&mut self) -> Result<(), TransitionError> {
        match self.state {
            ListenerState::Init => {
                self.state = ListenerState::Ready;
                Ok(())
            }
            from => Err(TransitionError {
                from: from.name(),
                event: "server_started",
            }),
        }
    }

    /// A webhook was accepted and enqueued. Idempotent while pending.
    pub fn hook_accepted(&mut self) -> Result<(), TransitionError> {
        match self.state {
            ListenerState::Ready | ListenerState::HookResponsed => {
                self.state = ListenerState::HookResponsed;
                Ok(())
            }
            ListenerState::Init => Err(TransitionError {
                from: "Init",
                event: "hook_accepted",
            }),
        }
    }

    /// Consumes the pending flag, returning whether it was set. Never fails:
    /// asking "is work pending" is valid in every state.
    pub fn take_pending(&mut self) -> bool {
        match self.state {
            ListenerState::HookResponsed => {
                self.state = ListenerState::Ready;
                true
            }
            ListenerState::Init | ListenerState::Ready => false,
        }
    }
}

impl Default for ListenerMachine {
    fn default() -> Self {
        ListenerMachine::new()
    }
}

/// Store connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection.
    Init,
    /// Connection attempt in flight.
    Connecting,
    /// Connected and idle.
    Ready,
    /// Connected and mid-drain. No second drain may start.
    Draining,
}

impl ConnectionState {
    fn name(self) -> &'static str {
        match self {
            ConnectionState::Init => "Init",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Ready => "Ready",
            ConnectionState::Draining => "Draining",
        }
    }
}

/// Guards drain mutual exclusion over the store connection.
#[derive(Debug)]
pub struct ConnectionMachine {
    state: ConnectionState,
}

impl ConnectionMachine {
    pub fn new() -> Self {
        ConnectionMachine {
            state: ConnectionState::Init,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn connect_started(&mut self) -> Result<(), TransitionError> {
        match self.state {
            ConnectionState::Init => {
                self.state = ConnectionState::Connecting;
                Ok(())
            }
            from => Err(TransitionError {
                from: from.name(),
                event: "connect_started",
            }),
        }
    }

    pub fn connected(&mut self) -> Result<(), TransitionError> {
        match self.state {
            ConnectionState::Connecting => {
                self.state = ConnectionState::Ready;
                Ok(())
            }
            from => Err(TransitionError {
                from: from.name(),
                event: "connected",
            }),
        }
    }

    /// Enters `Draining`. Refused from every state but `Ready`; in
    /// particular, refused while already draining.
    pub fn begin_drain(&mut self) -> Result<(), TransitionError> {
        match self.state {
            ConnectionState::Ready => {
                self.state = ConnectionState::Draining;
                Ok(())
            }
            from => Err(TransitionError {
                from: from.name(),
                event: "begin_drain",
            }),
        }
    }

    pub fn finish_drain(&mut self) -> Result<(), TransitionError> {
        match self.state {
            ConnectionState::Draining => {
                self.state = ConnectionState::Ready;
                Ok(())
            }
            from => Err(TransitionError {
                from: from.name(),
                event: "finish_drain",
            }),
        }
    }

    /// The connection is gone, whatever it was doing. Always valid.
    pub fn disconnected(&mut self) {
        self.state = ConnectionState::Init;
    }
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        ConnectionMachine::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ─── Listener ─────────────────────────────────────────────────────────

    #[test]
    fn listener_happy_path() {
        let mut listener = ListenerMachine::new();
        assert_eq!(listener.state(), ListenerState::Init);

        listener.server_started().unwrap();
        assert_eq!(listener.state(), ListenerState::Ready);

        listener.hook_accepted().unwrap();
        assert_eq!(listener.state(), ListenerState::HookResponsed);

        assert!(listener.take_pending());
        assert_eq!(listener.state(), ListenerState::Ready);
    }

    #[test]
    fn hooks_coalesce_into_one_pending_flag() {
        let mut listener = ListenerMachine::new();
        listener.server_started().unwrap();

        listener.hook_accepted().unwrap();
        listener.hook_accepted().unwrap();
        listener.hook_accepted().unwrap();

        // A burst of hooks is consumed by a single take
        assert!(listener.take_pending());
        assert!(!listener.take_pending());
    }

    #[test]
    fn hook_before_server_ready_is_refused() {
        let mut listener = ListenerMachine::new();
        let error = listener.hook_accepted().unwrap_err();
        assert_eq!(error.from, "Init");
        assert_eq!(listener.state(), ListenerState::Init);
    }

    #[test]
    fn take_pending_without_hooks_is_false() {
        let mut listener = ListenerMachine::new();
        assert!(!listener.take_pending());
        listener.server_started().unwrap();
        assert!(!listener.take_pending());
    }

    #[test]
    fn double_server_start_is_refused() {
        let mut listener = ListenerMachine::new();
        listener.server_started().unwrap();
        assert!(listener.server_started().is_err());
    }

    // ─── Connection ───────────────────────────────────────────────────────

    #[test]
    fn connection_happy_path() {
        let mut conn = ConnectionMachine::new();
        conn.connect_started().unwrap();
        conn.connected().unwrap();
        conn.begin_drain().unwrap();
        assert_eq!(conn.state(), ConnectionState::Draining);
        conn.finish_drain().unwrap();
        assert_eq!(conn.state(), ConnectionState::Ready);
    }

    #[test]
    fn overlapping_drain_is_refused() {
        let mut conn = ConnectionMachine::new();
        conn.connect_started().unwrap();
        conn.connected().unwrap();
        conn.begin_drain().unwrap();

        let error = conn.begin_drain().unwrap_err();
        assert_eq!(error.from, "Draining");
        // The in-flight drain is unaffected
        assert_eq!(conn.state(), ConnectionState::Draining);
        conn.finish_drain().unwrap();
    }

    #[test]
    fn drain_requires_a_connection() {
        let mut conn = ConnectionMachine::new();
        assert!(conn.begin_drain().is_err());
        conn.connect_started().unwrap();
        assert!(conn.begin_drain().is_err());
    }

    #[test]
    fn disconnect_is_valid_from_any_state() {
        let mut conn = ConnectionMachine::new();
        conn.connect_started().unwrap();
        conn.connected().unwrap();
        conn.begin_drain().unwrap();

        conn.disconnected();
        assert_eq!(conn.state(), ConnectionState::Init);

        // Reconnect from scratch
        conn.connect_started().unwrap();
        conn.connected().unwrap();
    }

    #[test]
    fn finish_without_begin_is_refused() {
        let mut conn = ConnectionMachine::new();
        conn.connect_started().unwrap();
        conn.connected().unwrap();
        assert!(conn.finish_drain().is_err());
    }
}
