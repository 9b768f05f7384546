//! Dispatcher
//!
//! Publication walks a snapshot of the topic's subscriptions in registration
//! order. For each live subscription it evaluates the filter on the
//! publishing thread and then routes the callback through the executor:
//!
//! | wants home | mode  | route                                         |
//! |------------|-------|-----------------------------------------------|
//! | yes        | Sync  | home thread, publisher waits (inline if none) |
//! | yes        | Async | home thread, no wait (inline if none)         |
//! | no         | Sync  | inline                                        |
//! | no         | Async | worker pool                                   |
//!
//! A panicking filter or callback is contained to that one delivery.
//! After the loop a purge is scheduled on the worker pool.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, trace};

use crate::broker::message::Publication;
use crate::broker::registry::Registry;
use crate::broker::subscription::{Affinity, Subscription, SubscriptionId};
use crate::executor::Executor;

/// Whether the publisher waits for its deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Sync,
    Async,
}

/// Where a single delivery runs. See the table in the module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Inline,
    HomeBlocking,
    HomePosted,
    Pool,
}

impl Route {
    pub fn select(affinity: Affinity, mode: DeliveryMode, has_home: bool) -> Route {
        match (affinity.wants_home(has_home), mode) {
            (true, DeliveryMode::Sync) => Route::HomeBlocking,
            (true, DeliveryMode::Async) if has_home => Route::HomePosted,
            (true, DeliveryMode::Async) => Route::Inline,
            (false, DeliveryMode::Sync) => Route::Inline,
            (false, DeliveryMode::Async) => Route::Pool,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultStage {
    Filter,
    Callback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFault {
    pub subscription: SubscriptionId,
    pub stage: FaultStage,
    pub message: String,
}

/// Outcome of one publication.
///
/// For async publications `dispatched` counts scheduled deliveries and
/// `faults` only holds what was observed before `publish` returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Entries in the snapshot.
    pub matched: usize,
    pub dispatched: usize,
    /// Rejected by their filter.
    pub filtered: usize,
    /// Unsubscribed or owner gone.
    pub skipped: usize,
    pub faults: Vec<DeliveryFault>,
}

type FaultSink = Arc<Mutex<Vec<DeliveryFault>>>;

/// Fans a publication out to the live subscribers of its topic.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    executor: Arc<Executor>,
    purge_after_publish: bool,
    purge_pending: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        executor: Arc<Executor>,
        purge_after_publish: bool,
    ) -> Self {
        Self {
            registry,
            executor,
            purge_after_publish,
            purge_pending: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn publish(&self, publication: Publication, mode: DeliveryMode) -> PublishReport {
        let snapshot = self.registry.snapshot(&publication.topic);
        let mut report = PublishReport {
            matched: snapshot.len(),
            ..PublishReport::default()
        };
        if snapshot.is_empty() {
            trace!(topic = %publication.topic, "no subscribers");
            return report;
        }

        let publication = Arc::new(publication);
        let has_home = self.executor.has_home();
        let sink: FaultSink = Arc::new(Mutex::new(Vec::new()));

        for subscription in snapshot {
            if !subscription.is_live() {
                report.skipped += 1;
                continue;
            }

            match guarded(|| subscription.accepts(&publication)) {
                Ok(true) => {}
                Ok(false) => {
                    report.filtered += 1;
                    continue;
                }
                Err(message) => {
                    error!(
                        id = %subscription.id(),
                        topic = %publication.topic,
                        %message,
                        "subscriber filter panicked"
                    );
                    report.faults.push(DeliveryFault {
                        subscription: subscription.id(),
                        stage: FaultStage::Filter,
                        message,
                    });
                    continue;
                }
            }

            let route = Route::select(subscription.affinity(), mode, has_home);
            trace!(id = %subscription.id(), topic = %publication.topic, ?route, "dispatching");

            let job = self.delivery(subscription, publication.clone(), sink.clone());
            match route {
                Route::Inline => self.executor.run_here(job),
                Route::HomeBlocking => self.executor.run_on_home(job, true),
                Route::HomePosted => self.executor.run_on_home(job, false),
                Route::Pool => self.executor.run_async(job),
            }
            report.dispatched += 1;
        }

        // faults recorded so far; late async ones are only logged
        report
            .faults
            .extend(sink.lock().unwrap_or_else(PoisonError::into_inner).drain(..));

        self.schedule_purge();
        report
    }

    fn delivery(
        &self,
        subscription: Arc<Subscription>,
        publication: Arc<Publication>,
        sink: FaultSink,
    ) -> crate::executor::Job {
        let registry = self.registry.clone();
        Box::new(move || {
            // unsubscribed between snapshot and now
            if !subscription.is_live() {
                return;
            }
            let id = subscription.id();
            let handle = registry.handle_for(subscription.clone());
            if let Err(message) = guarded(|| subscription.invoke(&publication, &handle)) {
                error!(%id, topic = %publication.topic, %message, "subscriber callback panicked");
                sink.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(DeliveryFault {
                        subscription: id,
                        stage: FaultStage::Callback,
                        message,
                    });
            }
        })
    }

    /// Coalesced: at most one purge is queued at any time.
    fn schedule_purge(&self) {
        if !self.purge_after_publish || self.purge_pending.swap(true, Ordering::AcqRel) {
            return;
        }
        let registry = self.registry.clone();
        let pending = self.purge_pending.clone();
        self.executor.run_async(Box::new(move || {
            pending.store(false, Ordering::Release);
            let purged = registry.purge();
            if purged > 0 {
                debug!(purged, "post-publish purge");
            }
        }));
    }
}

fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
