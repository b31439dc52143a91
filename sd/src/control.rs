//! Worker control state machine
//!
//! Control signals arrive asynchronously (OS signals, CLI, tests) through a
//! [`ControlHandle`]. Receiving one only queues a message; the scheduler loop
//! applies queued messages when it polls its [`WorkerControl`], so a state
//! change never interrupts a dispatch in flight.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

/// Lifecycle state of a scheduler worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlState {
    /// Draining due jobs (initial)
    Running,
    /// Sleeping without draining until resumed
    Paused,
    /// Exiting at the next poll point (terminal)
    ShuttingDown,
}

/// External control events understood by a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Pause,
    Resume,
    /// Graceful termination request
    Terminate,
    /// Interactive interrupt
    Interrupt,
    Quit,
    /// Stop the current unit of work
    KillCurrent,
}

impl ControlSignal {
    /// True for every signal that maps to the graceful shutdown transition
    pub fn is_shutdown(self) -> bool {
        matches!(self, Self::Terminate | Self::Interrupt | Self::Quit | Self::KillCurrent)
    }
}

impl ControlState {
    /// State after applying `signal`
    ///
    /// | From | Signal | To |
    /// |---|---|---|
    /// | Running | pause | Paused |
    /// | Paused | resume | Running |
    /// | Running, Paused | any shutdown signal | ShuttingDown |
    ///
    /// Every other pair leaves the state unchanged.
    pub fn apply(self, signal: ControlSignal) -> ControlState {
        match (self, signal) {
            (Self::ShuttingDown, _) => Self::ShuttingDown,
            (_, s) if s.is_shutdown() => Self::ShuttingDown,
            (Self::Running, ControlSignal::Pause) => Self::Paused,
            (Self::Paused, ControlSignal::Resume) => Self::Running,
            (state, _) => state,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Self::ShuttingDown
    }
}

/// Cloneable sender for control signals
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: mpsc::UnboundedSender<ControlSignal>,
}

impl ControlHandle {
    /// Queue a signal for the worker
    ///
    /// Returns false once the worker has gone away.
    pub fn send(&self, signal: ControlSignal) -> bool {
        debug!(?signal, "ControlHandle::send: called");
        self.tx.send(signal).is_ok()
    }

    pub fn pause(&self) -> bool {
        self.send(ControlSignal::Pause)
    }

    pub fn resume(&self) -> bool {
        self.send(ControlSignal::Resume)
    }

    pub fn terminate(&self) -> bool {
        self.send(ControlSignal::Terminate)
    }
}

/// Loop-owned control state plus the receiving end of the signal channel
#[derive(Debug)]
pub struct WorkerControl {
    state: ControlState,
    rx: mpsc::UnboundedReceiver<ControlSignal>,
    /// Set once every handle is dropped
    closed: bool,
}

impl WorkerControl {
    /// Create a control in the Running state and a handle that drives it
    pub fn new() -> (Self, ControlHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let control = Self {
            state: ControlState::Running,
            rx,
            closed: false,
        };
        (control, ControlHandle { tx })
    }

    /// Current state without consuming pending signals
    pub fn state(&self) -> ControlState {
        self.state
    }

    /// Apply every pending signal and return the resulting state
    pub fn poll(&mut self) -> ControlState {
        loop {
            match self.rx.try_recv() {
                Ok(signal) => self.apply(signal),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
        self.state
    }

    fn apply(&mut self, signal: ControlSignal) {
        let next = self.state.apply(signal);
        if next != self.state {
            info!(from = ?self.state, to = ?next, ?signal, "Worker control transition");
        } else {
            debug!(state = ?self.state, ?signal, "WorkerControl::apply: signal has no effect");
        }
        self.state = next;
    }

    /// Sleep for `duration`, waking early when a signal changes the state
    ///
    /// Signals that leave the state unchanged do not cut the sleep short.
    pub async fn sleep(&mut self, duration: Duration) -> ControlState {
        let start = self.poll();
        if start.is_terminal() {
            return start;
        }

        let deadline = Instant::now() + duration;
        loop {
            if self.closed {
                tokio::time::sleep_until(deadline).await;
                return self.state;
            }

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return self.state,
                received = self.rx.recv() => match received {
                    Some(signal) => {
                        self.apply(signal);
                        if self.poll() != start {
                            debug!(state = ?self.state, "WorkerControl::sleep: woken by state change");
                            return self.state;
                        }
                    }
                    None => self.closed = true,
                },
            }
        }
    }
}
