//! Background status polling.
//!
//! A [`StatusMonitor`] owns a [`StatusClient`] inside a tokio task, queries
//! it once per poll interval and broadcasts the outcome. Subscribers see
//! every snapshot, every failure, and a `Responsive` event whenever the
//! daemon starts or stops answering.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::client::StatusClient;
use crate::record::StatusRecord;

const EVENT_CAPACITY: usize = 64;

/// Shutdown signal sent via broadcast channel.
#[derive(Debug, Clone)]
pub struct ShutdownSignal;

/// Something the monitor observed.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Status(StatusRecord),
    Error(String),
    /// The daemon became responsive (`true`) or stopped responding.
    Responsive(bool),
}

/// Handle to a running polling task.
pub struct StatusMonitor {
    events: broadcast::Sender<MonitorEvent>,
    first_rx: Option<broadcast::Receiver<MonitorEvent>>,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
    task: JoinHandle<()>,
}

impl StatusMonitor {
    /// Start polling `client` every `poll_interval`. The first poll runs
    /// immediately.
    pub fn spawn(client: StatusClient, poll_interval: Duration) -> Self {
        let (events, first_rx) = broadcast::channel(EVENT_CAPACITY);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(run(client, poll_interval, events.clone(), shutdown_rx));

        Self {
            events,
            first_rx: Some(first_rx),
            shutdown_tx,
            task,
        }
    }

    /// Receive monitor events. The first subscriber also gets any events
    /// emitted before it subscribed.
    pub fn subscribe(&mut self) -> broadcast::Receiver<MonitorEvent> {
        self.first_rx
            .take()
            .unwrap_or_else(|| self.events.subscribe())
    }

    /// Ask the polling task to stop. A query already in flight runs to
    /// completion or timeout and its outcome is still published.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(ShutdownSignal);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the polling task to exit.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "Status monitor task panicked");
        }
    }
}

async fn run(
    mut client: StatusClient,
    poll_interval: Duration,
    events: broadcast::Sender<MonitorEvent>,
    mut shutdown_rx: broadcast::Receiver<ShutdownSignal>,
) {
    info!(
        endpoint = %client.endpoint(),
        interval_ms = poll_interval.as_millis() as u64,
        "Status monitor starting"
    );

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut responsive: Option<bool> = None;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {}
        }

        match client.get_status().await {
            Ok(record) => {
                if responsive != Some(true) {
                    info!(endpoint = %client.endpoint(), "Daemon responsive");
                    let _ = events.send(MonitorEvent::Responsive(true));
                }
                responsive = Some(true);
                let _ = events.send(MonitorEvent::Status(record));
            }
            Err(e) => {
                if responsive == Some(true) {
                    warn!(endpoint = %client.endpoint(), "Daemon stopped responding");
                    let _ = events.send(MonitorEvent::Responsive(false));
                }
                responsive = Some(false);
                debug!(endpoint = %client.endpoint(), error = %e, "Poll failed");
                let _ = events.send(MonitorEvent::Error(e.to_string()));
            }
        }

        if !matches!(shutdown_rx.try_recv(), Err(TryRecvError::Empty)) {
            break;
        }
    }

    client.close();
    info!(endpoint = %client.endpoint(), "Status monitor stopped");
}
