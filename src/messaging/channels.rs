// Communication channels lock-free

use crate::messaging::notification::Notification;
use crate::transport::message::TimedMessage;
use ringbuf::{HeapRb, traits::Split};

pub type NotificationProducer = ringbuf::HeapProd<Notification>;
pub type NotificationConsumer = ringbuf::HeapCons<Notification>;

pub fn create_notification_channel(
    capacity: usize,
) -> (NotificationProducer, NotificationConsumer) {
    let rb = HeapRb::<Notification>::new(capacity);
    rb.split()
}

pub type MessageProducer = ringbuf::HeapProd<TimedMessage>;
pub type MessageConsumer = ringbuf::HeapCons<TimedMessage>;

pub fn create_message_channel(capacity: usize) -> (MessageProducer, MessageConsumer) {
    let rb = HeapRb::<TimedMessage>::new(capacity);
    rb.split()
}
