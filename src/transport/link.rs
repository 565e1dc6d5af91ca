// Transport link - non-blocking outbound path to the message sink
// Producers push onto a lock-free ring; a worker thread does the I/O

use crate::messaging::channels::{MessageProducer, create_message_channel};
use crate::messaging::notification::{NotificationCategory, Notifier};
use crate::transport::message::TimedMessage;
use crate::transport::sink::MessageSink;
use ringbuf::traits::{Consumer, Producer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// How long the worker parks when the outbound ring is empty
const IDLE_POLL: Duration = Duration::from_millis(1);

/// Cloneable sending handle. `send` pushes onto the ring buffer and
/// returns immediately; it never suspends the caller. A full ring drops
/// the message and reports it, exactly like a failed delivery.
#[derive(Clone)]
pub struct TransportLink {
    tx: Arc<Mutex<MessageProducer>>,
    notifier: Notifier,
}

impl TransportLink {
    pub fn send(&self, message: TimedMessage) {
        // try_lock: le scheduler ne doit jamais bloquer ici
        let Ok(mut tx) = self.tx.try_lock() else {
            self.notifier.error(
                NotificationCategory::Transport,
                "outbound channel contended, message dropped".to_string(),
            );
            return;
        };

        if tx.try_push(message).is_err() {
            self.notifier.error(
                NotificationCategory::Transport,
                "outbound queue full, message dropped".to_string(),
            );
        }
    }
}

/// Owns the worker thread that drains the outbound ring and drives the
/// sink. Delivery failures are reported to the notification sink and
/// never reach the voice that originated the message.
pub struct Transport {
    link: TransportLink,
    running: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Transport {
    pub fn start(sink: Box<dyn MessageSink>, capacity: usize, notifier: Notifier) -> Self {
        let (tx, mut rx) = create_message_channel(capacity);
        let running = Arc::new(AtomicBool::new(true));

        let worker = {
            let running = Arc::clone(&running);
            let notifier = notifier.clone();
            let mut sink = sink;
            thread::spawn(move || {
                log::debug!("transport worker started");
                loop {
                    let mut drained = false;
                    while let Some(message) = rx.try_pop() {
                        drained = true;
                        if let Err(e) = sink.deliver(&message) {
                            notifier.error(
                                NotificationCategory::Transport,
                                format!("delivery failed: {}", e),
                            );
                        }
                    }
                    if !running.load(Ordering::Relaxed) {
                        // Drained once after the stop flag: nothing left behind
                        if !drained {
                            break;
                        }
                        continue;
                    }
                    thread::sleep(IDLE_POLL);
                }
                log::debug!("transport worker stopped");
            })
        };

        Self {
            link: TransportLink {
                tx: Arc::new(Mutex::new(tx)),
                notifier,
            },
            running,
            worker: Some(worker),
        }
    }

    /// Cloneable sending handle for the scheduler and the voices.
    pub fn link(&self) -> TransportLink {
        self.link.clone()
    }

    /// Stop the worker after it has drained pending messages.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::messaging::channels::create_notification_channel;
    use crate::messaging::notification::NotificationLevel;
    use std::time::SystemTime;

    struct MemorySink {
        delivered: Arc<Mutex<Vec<TimedMessage>>>,
    }

    impl MessageSink for MemorySink {
        fn deliver(&mut self, message: &TimedMessage) -> Result<(), TransportError> {
            self.delivered.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl MessageSink for FailingSink {
        fn deliver(&mut self, _message: &TimedMessage) -> Result<(), TransportError> {
            Err(TransportError::QueueFull)
        }
    }

    #[test]
    fn test_send_is_asynchronous_and_delivers() {
        let (ntx, _nrx) = create_notification_channel(16);
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = MemorySink {
            delivered: Arc::clone(&delivered),
        };

        let mut transport = Transport::start(Box::new(sink), 32, Notifier::new(ntx));
        let link = transport.link();

        for i in 0..5 {
            link.send(TimedMessage::new(vec![i], SystemTime::now()));
        }
        transport.shutdown();

        let delivered = delivered.lock().unwrap();
        assert_eq!(delivered.len(), 5);
        // Delivery preserves send order
        assert_eq!(delivered[0].payload, vec![0]);
        assert_eq!(delivered[4].payload, vec![4]);
    }

    #[test]
    fn test_delivery_failure_reported_not_propagated() {
        let (ntx, mut nrx) = create_notification_channel(16);
        let mut transport = Transport::start(Box::new(FailingSink), 8, Notifier::new(ntx));
        let link = transport.link();

        // send() itself never errors
        link.send(TimedMessage::new(vec![1], SystemTime::now()));
        transport.shutdown();

        let notif = nrx.try_pop().expect("failure was reported");
        assert_eq!(notif.category, NotificationCategory::Transport);
        assert_eq!(notif.level, NotificationLevel::Error);
    }

    #[test]
    fn test_queue_full_drops_and_reports() {
        let (ntx, mut nrx) = create_notification_channel(16);
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = MemorySink {
            delivered: Arc::clone(&delivered),
        };

        // Tiny ring with no worker progress yet: start paused by filling
        // faster than the 1ms poll can drain
        let mut transport = Transport::start(Box::new(sink), 1, Notifier::new(ntx));
        let link = transport.link();
        for i in 0..50 {
            link.send(TimedMessage::new(vec![i], SystemTime::now()));
        }
        transport.shutdown();

        // At least one push hit a full ring and was reported
        let mut saw_drop = false;
        while let Some(n) = nrx.try_pop() {
            if n.message.contains("queue full") {
                saw_drop = true;
            }
        }
        assert!(saw_drop);
        assert!(delivered.lock().unwrap().len() < 50);
    }
}
