// Messaging module
// Lock-free channels and the process-wide notification sink

pub mod channels;
pub mod notification;

pub use channels::{
    MessageConsumer, MessageProducer, NotificationConsumer, NotificationProducer,
    create_message_channel, create_notification_channel,
};
pub use notification::{Notification, NotificationCategory, NotificationLevel, Notifier};
