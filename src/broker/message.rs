//! Message definitions for the broker
//!
//! `Publication` is what every subscriber callback receives. Its payload is
//! opaque to the broker and takes one of two shapes:
//! - `Payload::Data`: a key/value bag (`UserData`) used by name-addressed
//!   topics. Publishing without one substitutes an empty bag.
//! - `Payload::Typed`: a typed message object used by type-addressed topics.
//!
//! Notes on metadata:
//! - `id`: unique per publication, generated by the broker
//! - `published_at`: set when the publication is created
//! - `sender`: optional publisher object, shared as `Arc<dyn Any>`

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::broker::topic::TopicKey;

/// Key/value payload of a name-addressed publication.
pub type UserData = HashMap<String, serde_json::Value>;

/// The object that published a message.
pub type Sender = Arc<dyn Any + Send + Sync>;

/// What a publication carries: a key/value bag on named topics, or the
/// message value itself on typed topics.
#[derive(Clone)]
pub enum Payload {
    Data(UserData),
    Typed(Arc<dyn Any + Send + Sync>),
}

impl Payload {
    pub fn empty() -> Self {
        Payload::Data(UserData::new())
    }

    pub fn typed<M: Any + Send + Sync>(message: M) -> Self {
        Payload::Typed(Arc::new(message))
    }

    pub fn as_data(&self) -> Option<&UserData> {
        match self {
            Payload::Data(data) => Some(data),
            Payload::Typed(_) => None,
        }
    }

    pub fn downcast_ref<M: Any>(&self) -> Option<&M> {
        match self {
            Payload::Typed(message) => message.downcast_ref::<M>(),
            Payload::Data(_) => None,
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Payload::empty()
    }
}

impl From<Option<UserData>> for Payload {
    fn from(data: Option<UserData>) -> Self {
        Payload::Data(data.unwrap_or_default())
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Data(data) => f.debug_tuple("Data").field(data).finish(),
            Payload::Typed(_) => f.debug_tuple("Typed").field(&"dyn Any").finish(),
        }
    }
}

/// One published message as seen by subscribers.
///
/// Every publication gets a fresh id and the time it was published.
pub struct Publication {
    pub id: Uuid,
    pub topic: TopicKey,
    pub sender: Option<Sender>,
    pub payload: Payload,
    pub published_at: DateTime<Utc>,
}

impl Publication {
    pub fn new(topic: TopicKey, sender: Option<Sender>, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic,
            sender,
            payload,
            published_at: Utc::now(),
        }
    }

    /// The sender, if there is one and it is a `T`.
    pub fn sender_as<T: Any>(&self) -> Option<&T> {
        self.sender.as_ref()?.downcast_ref::<T>()
    }

    /// The key/value bag. Typed publications have none.
    pub fn data(&self) -> Option<&UserData> {
        self.payload.as_data()
    }

    pub fn content<M: Any>(&self) -> Option<&M> {
        self.payload.downcast_ref::<M>()
    }
}

impl fmt::Debug for Publication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publication")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("has_sender", &self.sender.is_some())
            .field("payload", &self.payload)
            .field("published_at", &self.published_at)
            .finish()
    }
}

/// A ready-made typed message carrying arbitrary content.
///
/// `BroadcastMessage<String>` and `BroadcastMessage<Content>` are different
/// types and therefore different topics.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastMessage<T> {
    pub content: T,
}

impl<T> BroadcastMessage<T> {
    pub fn new(content: T) -> Self {
        Self { content }
    }
}
