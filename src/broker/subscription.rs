//! Subscriptions
//!
//! A `Subscription` is one registered handler: callback, optional filter,
//! thread affinity and lifecycle state. The registry owns every
//! `Subscription`; consumers only ever hold a `SubscriptionHandle`, an
//! unsubscribe capability pointing back at the registry.
//!
//! Lifecycle: `Active -> Unsubscribed`, exactly once. The transition happens
//! on an explicit unsubscribe, on `unsubscribe_all`, or when a purge finds the
//! owner gone. An unsubscribed subscription is never invoked again.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tracing::debug;
use uuid::Uuid;

use crate::broker::message::Publication;
use crate::broker::registry::Registry;
use crate::broker::topic::TopicKey;

pub type SubscriptionId = Uuid;

pub(crate) type Callback = Arc<dyn Fn(&Publication, &SubscriptionHandle) + Send + Sync>;
pub(crate) type Filter = Arc<dyn Fn(&Publication) -> bool + Send + Sync>;
pub(crate) type Owner = Weak<dyn Any + Send + Sync>;

/// Where a subscriber wants to be invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Affinity {
    /// Always on the home thread.
    Home,
    /// On whichever thread the broker picks.
    Anywhere,
    /// `Home` when a home context is installed, `Anywhere` otherwise.
    #[default]
    Unspecified,
}

impl Affinity {
    pub fn wants_home(self, has_home: bool) -> bool {
        match self {
            Affinity::Home => true,
            Affinity::Anywhere => false,
            Affinity::Unspecified => has_home,
        }
    }
}

/// Filter and affinity for a new subscription. `P` is what the filter sees:
/// `UserData` for name-addressed topics, the message type for typed ones.
pub struct SubscribeOptions<P: ?Sized> {
    pub(crate) filter: Option<Arc<dyn Fn(&P) -> bool + Send + Sync>>,
    pub(crate) affinity: Affinity,
}

impl<P: ?Sized> SubscribeOptions<P> {
    pub fn new() -> Self {
        Self {
            filter: None,
            affinity: Affinity::default(),
        }
    }

    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&P) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn affinity(mut self, affinity: Affinity) -> Self {
        self.affinity = affinity;
        self
    }
}

impl<P: ?Sized> Default for SubscribeOptions<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// One registered callback, with its topic, optional owner, optional filter
/// and affinity.
///
/// Once unsubscribed a subscription never becomes active again.
pub struct Subscription {
    id: SubscriptionId,
    topic: TopicKey,
    owner: Option<Owner>,
    callback: Callback,
    filter: Option<Filter>,
    affinity: Affinity,
    unsubscribed: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(
        topic: TopicKey,
        owner: Option<Owner>,
        callback: Callback,
        filter: Option<Filter>,
        affinity: Affinity,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic,
            owner,
            callback,
            filter,
            affinity,
            unsubscribed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn topic(&self) -> &TopicKey {
        &self.topic
    }

    pub fn affinity(&self) -> Affinity {
        self.affinity
    }

    pub fn is_active(&self) -> bool {
        !self.unsubscribed.load(Ordering::Acquire)
    }

    /// Subscriptions without an owner never die on their own.
    pub fn is_owner_alive(&self) -> bool {
        self.owner.as_ref().is_none_or(|owner| owner.strong_count() > 0)
    }

    /// Active and still owned: eligible for delivery.
    pub fn is_live(&self) -> bool {
        self.is_active() && self.is_owner_alive()
    }

    /// Returns `true` only for the call that performed the transition.
    pub(crate) fn mark_unsubscribed(&self) -> bool {
        !self.unsubscribed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_owned_by(&self, owner: *const ()) -> bool {
        self.owner
            .as_ref()
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr() as *const (), owner))
    }

    pub(crate) fn accepts(&self, publication: &Publication) -> bool {
        self.filter.as_ref().is_none_or(|filter| filter(publication))
    }

    pub(crate) fn invoke(&self, publication: &Publication, handle: &SubscriptionHandle) {
        (self.callback)(publication, handle)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("owned", &self.owner.is_some())
            .field("filtered", &self.filter.is_some())
            .field("affinity", &self.affinity)
            .field("active", &self.is_active())
            .finish()
    }
}

pub(crate) fn downgrade_owner<O: Any + Send + Sync>(owner: &Arc<O>) -> Owner {
    let owner: Arc<dyn Any + Send + Sync> = owner.clone();
    Arc::downgrade(&owner)
}

/// Unsubscribe capability returned by `subscribe`.
///
/// Dropping a handle does not unsubscribe. Cloning is cheap; every clone
/// refers to the same subscription.
#[derive(Clone)]
pub struct SubscriptionHandle {
    subscription: Arc<Subscription>,
    registry: Weak<Registry>,
}

impl SubscriptionHandle {
    pub(crate) fn new(subscription: Arc<Subscription>, registry: Weak<Registry>) -> Self {
        Self {
            subscription,
            registry,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.subscription.id
    }

    pub fn topic(&self) -> &TopicKey {
        &self.subscription.topic
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }

    /// Idempotent. Safe to call from inside this subscription's own callback;
    /// a publication already in flight is unaffected beyond this subscriber.
    pub fn unsubscribe(&self) {
        if !self.subscription.mark_unsubscribed() {
            return;
        }
        debug!(id = %self.subscription.id, topic = %self.subscription.topic, "unsubscribed");
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.subscription.topic, self.subscription.id);
        }
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.subscription.id)
            .field("topic", &self.subscription.topic)
            .field("active", &self.subscription.is_active())
            .finish()
    }
}

impl PartialEq for SubscriptionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.subscription.id == other.subscription.id
    }
}

impl Eq for SubscriptionHandle {}
