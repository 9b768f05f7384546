//! Topic addressing
//!
//! A `TopicKey` is either a string name or the runtime type id of a message
//! type. Both schemes share the same registry; the typed form is what the
//! generic `Broker::subscribe_to` / `Broker::send` wrappers use.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Identifies a topic.
///
/// Named topics are compared by name. Typed topics are compared by the
/// message type, so a name can never collide with a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TopicKey {
    Name(Arc<str>),
    Type { id: TypeId, name: &'static str },
}

impl TopicKey {
    pub fn name(name: &str) -> Self {
        TopicKey::Name(Arc::from(name))
    }

    /// Key for messages of type `M`.
    pub fn of<M: Any>() -> Self {
        TopicKey::Type {
            id: TypeId::of::<M>(),
            name: std::any::type_name::<M>(),
        }
    }

    /// An empty name is not a valid topic.
    pub fn is_empty(&self) -> bool {
        matches!(self, TopicKey::Name(name) if name.trim().is_empty())
    }
}

impl From<&str> for TopicKey {
    fn from(name: &str) -> Self {
        TopicKey::name(name)
    }
}

impl From<String> for TopicKey {
    fn from(name: String) -> Self {
        TopicKey::Name(Arc::from(name))
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicKey::Name(name) => write!(f, "{name}"),
            TopicKey::Type { name, .. } => write!(f, "<{name}>"),
        }
    }
}
