//! OS signal boundary
//!
//! Signal handlers only forward a [`ControlSignal`] to the worker's
//! [`ControlHandle`]; the scheduler loop applies it at its next poll point.
//!
//! | OS signal | Control signal |
//! |---|---|
//! | SIGUSR2 | pause |
//! | SIGCONT | resume |
//! | SIGTERM | terminate |
//! | SIGINT | interrupt |
//! | SIGQUIT | quit |
//! | SIGUSR1 | kill-current |

use eyre::Result;
use tracing::{debug, info, warn};

use crate::control::{ControlHandle, ControlSignal};

/// OS signal that `sd` sends for a control signal
#[cfg(unix)]
pub fn os_signal_for(signal: ControlSignal) -> nix::sys::signal::Signal {
    use nix::sys::signal::Signal;

    match signal {
        ControlSignal::Pause => Signal::SIGUSR2,
        ControlSignal::Resume => Signal::SIGCONT,
        ControlSignal::Terminate => Signal::SIGTERM,
        ControlSignal::Interrupt => Signal::SIGINT,
        ControlSignal::Quit => Signal::SIGQUIT,
        ControlSignal::KillCurrent => Signal::SIGUSR1,
    }
}

/// Forward OS signals to `handle` until the worker goes away
#[cfg(unix)]
pub async fn forward_signals(handle: ControlHandle) -> Result<()> {
    use nix::sys::signal::Signal;
    use tokio::signal::unix::{SignalKind, signal};

    debug!("forward_signals: installing handlers");
    let mut sigusr2 = signal(SignalKind::user_defined2())?;
    let mut sigcont = signal(SignalKind::from_raw(Signal::SIGCONT as i32))?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigquit = signal(SignalKind::quit())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;

    loop {
        let received = tokio::select! {
            _ = sigusr2.recv() => ControlSignal::Pause,
            _ = sigcont.recv() => ControlSignal::Resume,
            _ = sigterm.recv() => ControlSignal::Terminate,
            _ = sigint.recv() => ControlSignal::Interrupt,
            _ = sigquit.recv() => ControlSignal::Quit,
            _ = sigusr1.recv() => ControlSignal::KillCurrent,
        };

        if received.is_shutdown() {
            warn!(signal = ?received, "Shutdown signal received");
        } else {
            info!(signal = ?received, "Control signal received");
        }
        if !handle.send(received) {
            debug!("forward_signals: worker gone, stopping");
            return Ok(());
        }
    }
}

/// Forward ctrl-c as an interrupt until the worker goes away
#[cfg(not(unix))]
pub async fn forward_signals(handle: ControlHandle) -> Result<()> {
    loop {
        tokio::signal::ctrl_c().await?;
        warn!("Ctrl-C received");
        if !handle.send(ControlSignal::Interrupt) {
            return Ok(());
        }
    }
}
