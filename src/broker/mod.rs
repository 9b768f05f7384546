pub mod dispatch;
pub mod engine;
pub mod message;
pub mod registry;
pub mod subscription;
pub mod topic;

pub use dispatch::{DeliveryFault, DeliveryMode, FaultStage, PublishReport, Route};
pub use engine::Broker;
pub use message::{BroadcastMessage, Payload, Publication, Sender, UserData};
pub use registry::Registry;
pub use subscription::{
    Affinity, SubscribeOptions, Subscription, SubscriptionHandle, SubscriptionId,
};
pub use topic::TopicKey;
