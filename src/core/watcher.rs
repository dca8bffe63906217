//! Background device watcher
//!
//! Polls a [`ConnectivityProbe`] on a fixed cadence and publishes each
//! result on a `watch` channel. A flash run suspends polling for its whole
//! duration (the probe's own fastboot calls would interleave with the
//! run's) and resumes it briefly when it needs to observe a reboot.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::infra::probe::{ConnectivityProbe, ConnectivityState};

/// Whether the watcher is polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Active,
    Suspended,
}

/// Handle to a running watcher
///
/// Cheap to clone. The watcher stops once every handle is dropped or
/// [`WatcherHandle::shutdown`] is called.
#[derive(Debug, Clone)]
pub struct WatcherHandle {
    state: watch::Receiver<ConnectivityState>,
    /// Number of live suspensions; polling only happens at zero
    suspensions: Arc<watch::Sender<usize>>,
    /// True while a probe is running
    busy: watch::Receiver<bool>,
    shutdown: CancellationToken,
}

/// Start polling `probe` every `interval`
///
/// Must be called from within a tokio runtime.
pub fn spawn(probe: Arc<dyn ConnectivityProbe>, interval: Duration) -> WatcherHandle {
    start(probe, interval, 0)
}

/// Start a watcher that does not probe until the returned suspension is dropped
///
/// No probe can run before the caller gets the guard, so a flash run can
/// own the device from its first command.
pub fn spawn_suspended(
    probe: Arc<dyn ConnectivityProbe>,
    interval: Duration,
) -> (WatcherHandle, WatcherSuspension) {
    let handle = start(probe, interval, 1);
    tracing::debug!("device watcher started suspended");
    let suspension = WatcherSuspension {
        handle: handle.clone(),
    };
    (handle, suspension)
}

fn start(
    probe: Arc<dyn ConnectivityProbe>,
    interval: Duration,
    suspended: usize,
) -> WatcherHandle {
    let (state_tx, state_rx) = watch::channel(ConnectivityState::default());
    let (suspend_tx, suspend_rx) = watch::channel(suspended);
    let (busy_tx, busy_rx) = watch::channel(false);
    let shutdown = CancellationToken::new();

    tokio::spawn(poll_loop(
        probe,
        interval,
        state_tx,
        suspend_rx,
        busy_tx,
        shutdown.clone(),
    ));

    WatcherHandle {
        state: state_rx,
        suspensions: Arc::new(suspend_tx),
        busy: busy_rx,
        shutdown,
    }
}

async fn poll_loop(
    probe: Arc<dyn ConnectivityProbe>,
    interval: Duration,
    state_tx: watch::Sender<ConnectivityState>,
    mut suspend_rx: watch::Receiver<usize>,
    busy_tx: watch::Sender<bool>,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
            changed = suspend_rx.changed() => {
                // All handles dropped
                if changed.is_err() {
                    break;
                }
            }
        }

        // Busy is set before the count check: a concurrent suspend either
        // skips this probe or waits for it in `settled`
        busy_tx.send_replace(true);
        if *suspend_rx.borrow_and_update() > 0 {
            busy_tx.send_replace(false);
            continue;
        }

        // A suspension drops the probe, killing its child processes
        let state = tokio::select! {
            biased;
            () = shutdown.cancelled() => None,
            _ = suspend_rx.changed() => None,
            state = probe.detect() => Some(state),
        };
        busy_tx.send_replace(false);

        if shutdown.is_cancelled() {
            break;
        }
        let Some(state) = state else {
            tracing::debug!("watcher probe dropped on suspension");
            continue;
        };
        tracing::trace!("watcher: {} {:?}", state.mode, state.serial);
        state_tx.send_replace(state);
    }

    tracing::debug!("device watcher stopped");
}

impl WatcherHandle {
    /// Receiver for state updates
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state.clone()
    }

    /// Most recently published state
    pub fn current(&self) -> ConnectivityState {
        self.state.borrow().clone()
    }

    pub fn subscription(&self) -> SubscriptionState {
        if *self.suspensions.borrow() > 0 {
            SubscriptionState::Suspended
        } else {
            SubscriptionState::Active
        }
    }

    /// Stop polling until the returned guard is dropped
    pub fn suspend(&self) -> WatcherSuspension {
        self.suspensions.send_modify(|n| *n += 1);
        tracing::debug!("device watcher suspended");
        WatcherSuspension {
            handle: self.clone(),
        }
    }

    /// Stop the watcher task
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Whether a probe is running right now
    pub fn is_probing(&self) -> bool {
        *self.busy.borrow()
    }

    fn release(&self) {
        self.suspensions.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Guard that keeps the watcher suspended while alive
#[derive(Debug)]
pub struct WatcherSuspension {
    handle: WatcherHandle,
}

impl WatcherSuspension {
    /// Wait until no probe is running
    ///
    /// Once this returns, no probe starts until the guard is dropped or
    /// [`observe`](Self::observe) resumes polling.
    pub async fn settled(&self) {
        let mut busy = self.handle.busy.clone();
        // Err only once the watcher task has exited
        let _ = busy.wait_for(|probing| !*probing).await;
    }

    /// Resume polling until a state matching `accept` is published or
    /// `timeout` elapses, then suspend again
    ///
    /// Only states published after the call count.
    pub async fn observe<F>(&self, timeout: Duration, mut accept: F) -> Option<ConnectivityState>
    where
        F: FnMut(&ConnectivityState) -> bool,
    {
        let mut rx = self.handle.subscribe();
        let _ = rx.borrow_and_update();

        self.handle.release();
        tracing::debug!("device watcher resumed for {:?}", timeout);

        let seen = tokio::time::timeout(timeout, async {
            while rx.changed().await.is_ok() {
                let state = rx.borrow_and_update().clone();
                if accept(&state) {
                    return Some(state);
                }
            }
            None
        })
        .await
        .ok()
        .flatten();

        self.handle.suspensions.send_modify(|n| *n += 1);
        self.settled().await;
        seen
    }
}

impl Drop for WatcherSuspension {
    fn drop(&mut self) {
        self.handle.release();
        tracing::debug!("device watcher resumed");
    }
}
