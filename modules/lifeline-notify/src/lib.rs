pub mod channels;
pub mod directory;
pub mod dispatch;
pub mod store;

pub use channels::{ChannelKind, DeliveryChannel, EmailChannel, PushChannel, SmsChannel};
pub use directory::{MemoryDirectory, ResponderContact, ResponderDirectory};
pub use dispatch::{ChannelReport, DeliveryOutcome, DeliveryReport, NotificationDispatcher, TargetReport};
pub use store::NotificationStore;
