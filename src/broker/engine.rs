//! Broker engine
//!
//! `Broker` is the public entry point. It owns a `Registry`, an `Executor`
//! and a `Dispatcher`, and offers two addressing schemes over them:
//! - name-addressed topics, with a weakly held owner object and a
//!   `UserData` payload bag
//! - type-addressed topics, keyed by the message type, with no owner
//!
//! Usage notes:
//! - A `Broker` is `Send + Sync`; share it behind an `Arc` and pass it to
//!   whatever needs it. There is no global instance.
//! - `publish`/`send` block until inline and home-thread deliveries have run.
//!   Inside a multi-thread tokio runtime the wait goes through
//!   `block_in_place`; on a current-thread runtime home deliveries run inline
//!   instead. `publish_async`/`send_async` never wait.
//! - Subscribing the same owner to the same topic twice yields two
//!   independent subscriptions and two deliveries per publication.

use std::any::Any;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::broker::dispatch::{DeliveryMode, Dispatcher, PublishReport};
use crate::broker::message::{Payload, Publication, Sender, UserData};
use crate::broker::registry::Registry;
use crate::broker::subscription::{
    Callback, Filter, SubscribeOptions, Subscription, SubscriptionHandle, downgrade_owner,
};
use crate::broker::topic::TopicKey;
use crate::config::BrokerSettings;
use crate::executor::{Executor, HomeContext};
use crate::utils::{BrokerError, Result};

/// In-process publish/subscribe broker.
#[derive(Debug)]
pub struct Broker {
    registry: Arc<Registry>,
    executor: Arc<Executor>,
    dispatcher: Dispatcher,
}

impl Broker {
    /// Broker with default settings and its own worker pool.
    pub fn new() -> Result<Self> {
        Self::with_settings(&BrokerSettings::default())
    }

    pub fn with_settings(settings: &BrokerSettings) -> Result<Self> {
        let executor = Executor::with_threads(settings.worker_threads)?;
        info!(worker_threads = settings.worker_threads, "broker started");
        Ok(Self::from_parts(executor, settings.purge_after_publish))
    }

    /// Broker whose asynchronous deliveries run on an existing tokio runtime.
    pub fn with_runtime(handle: Handle, settings: &BrokerSettings) -> Self {
        Self::from_parts(Executor::with_handle(handle), settings.purge_after_publish)
    }

    fn from_parts(executor: Executor, purge_after_publish: bool) -> Self {
        let registry = Registry::new();
        let executor = Arc::new(executor);
        let dispatcher = Dispatcher::new(registry.clone(), executor.clone(), purge_after_publish);
        Self {
            registry,
            executor,
            dispatcher,
        }
    }

    /// Installs or removes the home context used by home-affine subscribers.
    /// `None` means "run on whichever thread publishes".
    pub fn set_home_context(&self, home: Option<Arc<dyn HomeContext>>) {
        debug!(installed = home.is_some(), "home context changed");
        self.executor.set_home(home);
    }

    pub fn home_context(&self) -> Option<Arc<dyn HomeContext>> {
        self.executor.home()
    }

    /// Subscribes `callback` to the named `topic` on behalf of `owner`.
    ///
    /// The broker keeps only a weak reference to `owner`; once it is dropped
    /// the subscription stops receiving and is purged.
    pub fn subscribe<O, F>(
        &self,
        owner: &Arc<O>,
        topic: &str,
        callback: F,
    ) -> Result<SubscriptionHandle>
    where
        O: Any + Send + Sync,
        F: Fn(&Publication, &SubscriptionHandle) + Send + Sync + 'static,
    {
        self.subscribe_with(owner, topic, SubscribeOptions::new(), callback)
    }

    pub fn subscribe_with<O, F>(
        &self,
        owner: &Arc<O>,
        topic: &str,
        options: SubscribeOptions<UserData>,
        callback: F,
    ) -> Result<SubscriptionHandle>
    where
        O: Any + Send + Sync,
        F: Fn(&Publication, &SubscriptionHandle) + Send + Sync + 'static,
    {
        let topic = validated_topic(topic)?;
        let filter = options.filter.map(|filter| -> Filter {
            Arc::new(move |publication: &Publication| {
                publication.data().is_some_and(|data| filter(data))
            })
        });
        let subscription = Subscription::new(
            topic,
            Some(downgrade_owner(owner)),
            Arc::new(callback),
            filter,
            options.affinity,
        );
        self.register(subscription)
    }

    /// Subscribes `callback` to every message of type `M`.
    pub fn subscribe_to<M, F>(&self, callback: F) -> Result<SubscriptionHandle>
    where
        M: Any + Send + Sync,
        F: Fn(&M, &SubscriptionHandle) + Send + Sync + 'static,
    {
        self.subscribe_to_with(SubscribeOptions::new(), callback)
    }

    pub fn subscribe_to_with<M, F>(
        &self,
        options: SubscribeOptions<M>,
        callback: F,
    ) -> Result<SubscriptionHandle>
    where
        M: Any + Send + Sync,
        F: Fn(&M, &SubscriptionHandle) + Send + Sync + 'static,
    {
        let erased: Callback =
            Arc::new(move |publication: &Publication, handle: &SubscriptionHandle| {
                if let Some(message) = publication.content::<M>() {
                    callback(message, handle);
                }
            });
        let filter = options.filter.map(|filter| -> Filter {
            Arc::new(move |publication: &Publication| {
                publication.content::<M>().is_some_and(|m| filter(m))
            })
        });
        let subscription =
            Subscription::new(TopicKey::of::<M>(), None, erased, filter, options.affinity);
        self.register(subscription)
    }

    fn register(&self, subscription: Subscription) -> Result<SubscriptionHandle> {
        self.registry
            .register(subscription)
            .ok_or(BrokerError::InvalidArgument("topic"))
    }

    /// Idempotent.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        handle.unsubscribe();
    }

    /// Removes the first subscription `owner` holds on `topic`. Returns
    /// `false` if there was none.
    pub fn unsubscribe_owner<O: Any + Send + Sync>(&self, owner: &Arc<O>, topic: &str) -> bool {
        self.registry.unregister(owner, &TopicKey::name(topic))
    }

    /// Drops every subscription on `topic`, or on all topics for `None`.
    pub fn unsubscribe_all(&self, topic: Option<TopicKey>) -> usize {
        self.registry.unregister_all(topic.as_ref())
    }

    /// Publishes to a named topic and waits for inline and home-thread
    /// deliveries. A missing payload is replaced with an empty bag.
    pub fn publish(
        &self,
        sender: Option<Sender>,
        topic: &str,
        data: Option<UserData>,
    ) -> Result<PublishReport> {
        let topic = validated_topic(topic)?;
        Ok(self.dispatch(sender, topic, Payload::from(data), DeliveryMode::Sync))
    }

    /// Publishes to a named topic without waiting for any subscriber.
    pub fn publish_async(
        &self,
        sender: Option<Sender>,
        topic: &str,
        data: Option<UserData>,
    ) -> Result<PublishReport> {
        let topic = validated_topic(topic)?;
        Ok(self.dispatch(sender, topic, Payload::from(data), DeliveryMode::Async))
    }

    /// Typed counterpart of `publish`.
    pub fn send<M: Any + Send + Sync>(&self, sender: Option<Sender>, message: M) -> PublishReport {
        self.dispatch(sender, TopicKey::of::<M>(), Payload::typed(message), DeliveryMode::Sync)
    }

    /// Typed counterpart of `publish_async`.
    pub fn send_async<M: Any + Send + Sync>(
        &self,
        sender: Option<Sender>,
        message: M,
    ) -> PublishReport {
        self.dispatch(sender, TopicKey::of::<M>(), Payload::typed(message), DeliveryMode::Async)
    }

    fn dispatch(
        &self,
        sender: Option<Sender>,
        topic: TopicKey,
        payload: Payload,
        mode: DeliveryMode,
    ) -> PublishReport {
        self.dispatcher.publish(Publication::new(topic, sender, payload), mode)
    }

    /// Sweeps dead and unsubscribed entries now instead of after the next
    /// publication.
    pub fn purge(&self) -> usize {
        self.registry.purge()
    }

    pub fn subscriber_count(&self, topic: &TopicKey) -> usize {
        self.registry.subscriber_count(topic)
    }

    pub fn topic_count(&self) -> usize {
        self.registry.topic_count()
    }
}

fn validated_topic(topic: &str) -> Result<TopicKey> {
    let topic = TopicKey::name(topic);
    if topic.is_empty() {
        return Err(BrokerError::InvalidArgument("topic"));
    }
    Ok(topic)
}
