use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

/// Default idle window after the last heartbeat.
pub const DEFAULT_LIVENESS_WINDOW: Duration = Duration::from_secs(3);

/// Edge reported by [`LivenessMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessChange {
    Activated,
    Idle,
}

/// Heartbeat-driven activity flag with a fixed idle window.
///
/// Pure state machine: callers supply the clock.
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    window: Duration,
    active: bool,
    deadline: Option<Instant>,
}

impl Default for LivenessMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_LIVENESS_WINDOW)
    }
}

impl LivenessMonitor {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            active: false,
            deadline: None,
        }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// When the flag clears if no further heartbeat arrives.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Records a heartbeat. Reports `Activated` only on the inactive to active edge.
    pub fn heartbeat(&mut self, now: Instant) -> Option<LivenessChange> {
        self.deadline = Some(now + self.window);
        if self.active {
            return None;
        }
        self.active = true;
        Some(LivenessChange::Activated)
    }

    /// Reports `Idle` once when the window has elapsed since the last heartbeat.
    pub fn poll(&mut self, now: Instant) -> Option<LivenessChange> {
        match self.deadline {
            Some(deadline) if self.active && now >= deadline => {
                self.active = false;
                self.deadline = None;
                Some(LivenessChange::Idle)
            }
            _ => None,
        }
    }
}

/// Runs a [`LivenessMonitor`] on a Tokio task and publishes the flag.
///
/// Must be created inside a Tokio runtime. The task stops when the tracker
/// is dropped.
#[derive(Debug)]
pub struct LivenessTracker {
    beats: mpsc::UnboundedSender<Instant>,
    publish: Arc<watch::Sender<bool>>,
    state: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl LivenessTracker {
    #[must_use]
    pub fn spawn(window: Duration) -> Self {
        let (beats, rx) = mpsc::unbounded_channel::<Instant>();
        let (publish, state) = watch::channel(false);
        let publish = Arc::new(publish);

        let task = tokio::spawn(run_monitor(window, rx, Arc::clone(&publish)));

        Self {
            beats,
            publish,
            state,
            task,
        }
    }

    /// Marks the agent active immediately; the idle transition follows from
    /// the window.
    pub fn heartbeat(&self) {
        set_flag(&self.publish, true);
        if self.beats.send(Instant::now()).is_err() {
            trace!("liveness task has stopped");
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        *self.state.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.clone()
    }
}

async fn run_monitor(
    window: Duration,
    mut beats: mpsc::UnboundedReceiver<Instant>,
    publish: Arc<watch::Sender<bool>>,
) {
    let mut monitor = LivenessMonitor::new(window);
    loop {
        let idle_at = monitor.deadline();
        tokio::select! {
            beat = beats.recv() => {
                let Some(at) = beat else { break };
                if monitor.heartbeat(at) == Some(LivenessChange::Activated) {
                    trace!("agent activity started");
                    set_flag(&publish, true);
                }
            }
            _ = sleep_until(idle_at.unwrap_or_else(|| Instant::now() + window)), if idle_at.is_some() => {
                if monitor.poll(Instant::now()) == Some(LivenessChange::Idle) {
                    trace!("agent activity went idle");
                    set_flag(&publish, false);
                }
            }
        }
    }
}

fn set_flag(publish: &watch::Sender<bool>, active: bool) {
    publish.send_if_modified(|current| {
        let changed = *current != active;
        *current = active;
        changed
    });
}

impl Drop for LivenessTracker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeats_inside_window_activate_once() {
        let start = Instant::now();
        let mut monitor = LivenessMonitor::default();

        let mut changes = Vec::new();
        for offset_ms in [0, 1000, 2500, 4000, 6900] {
            let now = start + Duration::from_millis(offset_ms);
            changes.extend(monitor.poll(now));
            changes.extend(monitor.heartbeat(now));
        }

        assert_eq!(changes, vec![LivenessChange::Activated]);
        assert!(monitor.is_active());
    }

    #[test]
    fn gap_at_or_beyond_window_clears_exactly_once() {
        let start = Instant::now();
        let mut monitor = LivenessMonitor::new(Duration::from_secs(3));
        monitor.heartbeat(start);

        assert_eq!(monitor.poll(start + Duration::from_millis(2999)), None);
        assert_eq!(
            monitor.poll(start + Duration::from_secs(3)),
            Some(LivenessChange::Idle)
        );
        assert_eq!(monitor.poll(start + Duration::from_secs(10)), None);
        assert!(!monitor.is_active());
        assert_eq!(
            monitor.heartbeat(start + Duration::from_secs(11)),
            Some(LivenessChange::Activated)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn tracker_publishes_edges() {
        let tracker = LivenessTracker::spawn(Duration::from_secs(3));
        let mut updates = tracker.subscribe();
        assert!(!tracker.is_active());

        tracker.heartbeat();
        updates.changed().await.expect("tracker is running");
        assert!(*updates.borrow_and_update());

        tokio::time::sleep(Duration::from_secs(2)).await;
        tracker.heartbeat();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(tracker.is_active());

        updates.changed().await.expect("tracker is running");
        assert!(!*updates.borrow_and_update());
        assert!(!tracker.is_active());
    }
}
