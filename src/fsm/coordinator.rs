//! Event loop connecting webhook wake-ups to drain cycles.
//!
//! The coordinator owns both lifecycle machines and is the only caller of
//! [`QueueHandler::drain`], so cycles are serialized by construction; the
//! connection machine makes the exclusion explicit and refuses overlap if a
//! second trigger path is ever added.
//!
//! Wake-ups coalesce: any number of webhooks accepted during a cycle leave a
//! single pending flag, and the loop runs exactly one follow-up cycle for
//! them. Cancellation is observed between cycles only; an in-flight cycle
//! always runs to completion so the store is never left mid-write.

use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::executor::{ActionExecutor, TrackerApi};
use crate::fsm::{ConnectionMachine, ListenerMachine, ListenerState};
use crate::queue::QueueHandler;
use crate::store::Store;

/// Cloneable handle the webhook server uses to signal accepted events.
#[derive(Clone)]
pub struct WakeHandle {
    listener: Arc<Mutex<ListenerMachine>>,
    notify: Arc<Notify>,
}

impl WakeHandle {
    /// Records an accepted webhook and wakes the coordinator.
    ///
    /// Dropped with a warning if the listener is not serving yet; the
    /// startup backlog drain covers anything enqueued that early.
    pub async fn hook_accepted(&self) {
        {
            let mut listener = self.listener.lock().await;
            if let Err(error) = listener.hook_accepted() {
                warn!(%error, "webhook accepted before listener ready; wake-up dropped");
                return;
            }
        }
        self.notify.notify_one();
    }
}

/// Owns the drain loop and the lifecycle machines.
pub struct Coordinator<S, E, T> {
    queue: QueueHandler<S>,
    executor: E,
    tracker: T,
    listener: Arc<Mutex<ListenerMachine>>,
    connection: Mutex<ConnectionMachine>,
    notify: Arc<Notify>,
    cancel: CancellationToken,
}

impl<S, E, T> Coordinator<S, E, T>
where
    S: Store,
    E: ActionExecutor,
    T: TrackerApi,
{
    /// Builds a coordinator and the wake handle the server signals through.
    pub fn new(
        queue: QueueHandler<S>,
        executor: E,
        tracker: T,
        cancel: CancellationToken,
    ) -> (Self, WakeHandle) {
        let listener = Arc::new(Mutex::new(ListenerMachine::new()));
        let notify = Arc::new(Notify::new());
        let handle = WakeHandle {
            listener: Arc::clone(&listener),
            notify: Arc::clone(&notify),
        };
        let coordinator = Coordinator {
            queue,
            executor,
            tracker,
            listener,
            connection: Mutex::new(ConnectionMachine::new()),
            notify,
            cancel,
        };
        (coordinator, handle)
    }

    /// Runs until cancelled.
    ///
    /// Drains once at startup to pick up work left over from a previous run,
    /// then sleeps until a wake-up.
    pub async fn run(self) {
        {
            let mut connection = self.connection.lock().await;
            // The store handle was connected by the caller; these transitions
            // record that fact in the lifecycle machine.
            if let Err(error) = connection
                .connect_started()
                .and_then(|()| connection.connected())
            {
                error!(%error, "connection machine in unexpected state at startup");
                return;
            }
        }
        {
            let mut listener = self.listener.lock().await;
            if let Err(error) = listener.server_started() {
                error!(%error, "listener machine in unexpected state at startup");
                return;
            }
        }
        info!("coordinator started; draining startup backlog");
        self.drain_until_quiet().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("shutdown requested; coordinator stopping");
                    break;
                }
                _ = self.notify.notified() => {
                    self.drain_until_quiet().await;
                }
            }
        }

        self.connection.lock().await.disconnected();
    }

    /// Runs drain cycles until no webhook arrived during the last one.
    async fn drain_until_quiet(&self) {
        loop {
            // Clear the pending flag before draining so arrivals during the
            // cycle are observed afterwards
            self.listener.lock().await.take_pending();
            self.run_one_cycle().await;

            let more = self.listener.lock().await.state() == ListenerState::HookResponsed;
            if !more {
                break;
            }
            debug!("webhooks arrived during drain; running follow-up cycle");
        }
    }

    async fn run_one_cycle(&self) {
        {
            let mut connection = self.connection.lock().await;
            if let Err(error) = connection.begin_drain() {
                warn!(%error, "drain refused by connection machine; skipped");
                return;
            }
        }

        let result = self.queue.drain(&self.executor, &self.tracker).await;

        {
            let mut connection = self.connection.lock().await;
            if let Err(error) = connection.finish_drain() {
                error!(%error, "connection machine lost the draining state");
            }
        }

        if let Err(error) = result {
            // Durable state is untouched past the failure point; the next
            // wake-up retries from it.
            warn!(%error, "drain cycle aborted");
        }
    }
}
