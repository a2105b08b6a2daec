//! # Event fan-out from the bus to subscribers.
//!
//! [`SubscriberSet`] gives every subscriber its own lane: a bounded queue drained by a
//! dedicated worker task. Controllers publish on the [`Bus`] and never wait for a
//! subscriber.
//!
//! ## Architecture
//! ```text
//! Bus ──► listen() ──► emit(event) ──► Arc<Event>
//!                                         │ try_send
//!                    ┌────────────────────┼────────────────────┐
//!                    ▼                    ▼                    ▼
//!               lane "log"           lane "metrics"        lane "custom"
//!            [queue] ► worker      [queue] ► worker      [queue] ► worker
//!                         │
//!                         └─ panic in on_event ─► Bus: SubscriberPanicked
//! ```
//!
//! ## Rules
//! - Each lane sees events in bus order; lanes never wait for each other
//! - A full or closed lane drops the event for that subscriber only and reports
//!   `SubscriberOverflow` on the bus (overflow reports themselves are never re-reported)
//! - A panic inside `on_event` is reported as `SubscriberPanicked` and the lane keeps going
//!
//! **Warning**: delivery runs under `AssertUnwindSafe`; a subscriber that panics while
//! holding a lock on its own shared state may leave that state inconsistent.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::events::{Bus, Event};
use crate::subscribers::Subscribe;

/// One subscriber's queue and the worker draining it.
struct Lane {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
    worker: JoinHandle<()>,
}

impl Lane {
    fn open(sub: Arc<dyn Subscribe>, bus: Bus) -> Self {
        let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
        Self {
            name: sub.name(),
            tx,
            worker: tokio::spawn(drain_lane(sub, rx, bus)),
        }
    }

    /// Queues `event` without waiting; `Err` carries the reason the lane refused it.
    fn offer(&self, event: &Arc<Event>) -> Result<(), &'static str> {
        self.tx.try_send(Arc::clone(event)).map_err(|err| match err {
            TrySendError::Full(_) => "full",
            TrySendError::Closed(_) => "closed",
        })
    }
}

async fn drain_lane(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(event) = rx.recv().await {
        let delivery = AssertUnwindSafe(sub.on_event(&event)).catch_unwind();
        if let Err(payload) = delivery.await {
            bus.publish(Event::subscriber_panicked(
                sub.name(),
                panic_message(&*payload),
            ));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&'static str>()
        .map(|msg| (*msg).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Fans controller events out to subscribers, one isolated lane each.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    bus: Bus,
}

impl SubscriberSet {
    /// Opens one lane per subscriber.
    ///
    /// Must be called from within a tokio runtime. Queue capacity is at least 1.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let lanes = subs
            .into_iter()
            .map(|sub| Lane::open(sub, bus.clone()))
            .collect();
        Self { lanes, bus }
    }

    /// Names of the subscribers, in lane order.
    pub fn names(&self) -> Vec<&'static str> {
        self.lanes.iter().map(|lane| lane.name).collect()
    }

    /// Forwards every bus event to [`emit`](Self::emit) until `token` is cancelled or
    /// the bus closes. Lagged events are skipped.
    pub fn listen(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(ev) => set.emit(ev),
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        })
    }

    /// Queues `event` on every lane without waiting.
    pub fn emit(&self, event: Event) {
        let event = Arc::new(event);
        let reportable = !event.is_subscriber_overflow();

        for lane in &self.lanes {
            if let Err(reason) = lane.offer(&event) {
                if reportable {
                    self.bus.publish(Event::subscriber_overflow(lane.name, reason));
                }
            }
        }
    }

    /// Closes every lane and waits until its worker has delivered what was queued.
    pub async fn shutdown(self) {
        let workers: Vec<JoinHandle<()>> = self
            .lanes
            .into_iter()
            .map(|lane| {
                drop(lane.tx);
                lane.worker
            })
            .collect();

        for worker in workers {
            let _ = worker.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recorder {
        seen: Arc<Mutex<Vec<EventKind>>>,
        capacity: usize,
    }

    impl Recorder {
        fn new(seen: &Arc<Mutex<Vec<EventKind>>>) -> Self {
            Self {
                seen: Arc::clone(seen),
                capacity: 16,
            }
        }
    }

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, ev: &Event) {
            self.seen.lock().unwrap().push(ev.kind);
        }
        fn name(&self) -> &'static str {
            "recorder"
        }
        fn queue_capacity(&self) -> usize {
            self.capacity
        }
    }

    struct Panicky;

    #[async_trait]
    impl Subscribe for Panicky {
        async fn on_event(&self, _ev: &Event) {
            panic!("subscriber exploded");
        }
        fn name(&self) -> &'static str {
            "panicky"
        }
    }

    #[tokio::test]
    async fn test_emit_delivers_in_order_and_shutdown_drains() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let set = SubscriberSet::new(vec![Arc::new(Recorder::new(&seen))], Bus::new(16));
        assert_eq!(set.names(), vec!["recorder"]);

        set.emit(Event::new(EventKind::ExecuteStarted));
        set.emit(Event::new(EventKind::TaskSucceeded));
        set.shutdown().await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventKind::ExecuteStarted, EventKind::TaskSucceeded]
        );
    }

    #[tokio::test]
    async fn test_panic_is_reported_on_bus() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let set = SubscriberSet::new(vec![Arc::new(Panicky)], bus.clone());

        set.emit(Event::new(EventKind::CacheHit));
        set.shutdown().await;

        let ev = rx.recv().await.unwrap();
        assert!(ev.is_subscriber_panic());
        assert_eq!(ev.task.as_deref(), Some("panicky"));
        assert_eq!(ev.reason.as_deref(), Some("subscriber exploded"));
    }

    #[tokio::test]
    async fn test_full_lane_reports_overflow_and_keeps_others() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let tight = Arc::new(Mutex::new(Vec::new()));
        let roomy = Arc::new(Mutex::new(Vec::new()));
        let set = SubscriberSet::new(
            vec![
                Arc::new(Recorder {
                    seen: Arc::clone(&tight),
                    capacity: 1,
                }),
                Arc::new(Recorder::new(&roomy)),
            ],
            bus.clone(),
        );

        // The workers have not run yet, so the one-slot lane is full after one event.
        set.emit(Event::new(EventKind::ExecuteStarted));
        set.emit(Event::new(EventKind::TaskSucceeded));
        set.emit(Event::subscriber_overflow("elsewhere", "full"));
        set.shutdown().await;

        let ev = rx.recv().await.unwrap();
        assert!(ev.is_subscriber_overflow());
        assert_eq!(ev.reason.as_deref(), Some("subscriber=recorder reason=full"));
        assert!(rx.try_recv().is_err());

        assert_eq!(*tight.lock().unwrap(), vec![EventKind::ExecuteStarted]);
        assert_eq!(roomy.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_listen_forwards_bus_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let bus = Bus::new(16);
        let set = Arc::new(SubscriberSet::new(
            vec![Arc::new(Recorder::new(&seen))],
            bus.clone(),
        ));
        let token = CancellationToken::new();
        let listener = set.listen(token.clone());

        bus.publish(Event::new(EventKind::PollScheduled));
        for _ in 0..50 {
            if !seen.lock().unwrap().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        token.cancel();
        listener.await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![EventKind::PollScheduled]);
    }

    #[test]
    fn test_panic_message_reads_common_payloads() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u8), "unknown panic");
    }
}
