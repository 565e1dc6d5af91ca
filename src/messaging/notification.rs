// Système de notifications pour la gestion d'erreurs

use crate::messaging::channels::NotificationProducer;
use ringbuf::traits::Producer;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// Niveau de sévérité d'une notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Catégorie de notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationCategory {
    Clock,
    Scheduler,
    Voice,
    Transport,
    Sync,
    Generic,
}

/// Notification avec timestamp et métadonnées
#[derive(Debug, Clone)]
pub struct Notification {
    pub level: NotificationLevel,
    pub category: NotificationCategory,
    pub message: String,
    pub timestamp: u64, // Unix timestamp en millisecondes
}

impl Notification {
    /// Crée une nouvelle notification avec le timestamp actuel
    pub fn new(level: NotificationLevel, category: NotificationCategory, message: String) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        Self {
            level,
            category,
            message,
            timestamp,
        }
    }

    /// Helper pour créer une notification Info
    pub fn info(category: NotificationCategory, message: String) -> Self {
        Self::new(NotificationLevel::Info, category, message)
    }

    /// Helper pour créer une notification Warning
    pub fn warning(category: NotificationCategory, message: String) -> Self {
        Self::new(NotificationLevel::Warning, category, message)
    }

    /// Helper pour créer une notification Error
    pub fn error(category: NotificationCategory, message: String) -> Self {
        Self::new(NotificationLevel::Error, category, message)
    }
}

/// Shared, non-blocking handle onto the notification channel.
///
/// The scheduler loop, the transport worker and the sync client all
/// report through one of these. `try_lock` + `try_push` so a report
/// from a timing-sensitive context never blocks; if the channel is
/// full or contended the notification is dropped and only logged.
#[derive(Clone)]
pub struct Notifier {
    tx: Arc<Mutex<NotificationProducer>>,
}

impl Notifier {
    pub fn new(tx: NotificationProducer) -> Self {
        Self {
            tx: Arc::new(Mutex::new(tx)),
        }
    }

    /// Push une notification sans bloquer
    pub fn push(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Info => log::info!("{:?}: {}", notification.category, notification.message),
            NotificationLevel::Warning => log::warn!("{:?}: {}", notification.category, notification.message),
            NotificationLevel::Error => log::error!("{:?}: {}", notification.category, notification.message),
        }

        if let Ok(mut tx) = self.tx.try_lock() {
            let _ = tx.try_push(notification);
        }
    }

    pub fn info(&self, category: NotificationCategory, message: String) {
        self.push(Notification::info(category, message));
    }

    pub fn warning(&self, category: NotificationCategory, message: String) {
        self.push(Notification::warning(category, message));
    }

    pub fn error(&self, category: NotificationCategory, message: String) {
        self.push(Notification::error(category, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::channels::create_notification_channel;
    use ringbuf::traits::Consumer;

    #[test]
    fn test_notification_creation() {
        let notif = Notification::error(NotificationCategory::Voice, "Test error".to_string());

        assert_eq!(notif.level, NotificationLevel::Error);
        assert_eq!(notif.category, NotificationCategory::Voice);
        assert_eq!(notif.message, "Test error");
        assert!(notif.timestamp > 0);
    }

    #[test]
    fn test_notification_helpers() {
        let info = Notification::info(NotificationCategory::Clock, "Info".to_string());
        let warning = Notification::warning(NotificationCategory::Sync, "Warning".to_string());
        let error = Notification::error(NotificationCategory::Generic, "Error".to_string());

        assert_eq!(info.level, NotificationLevel::Info);
        assert_eq!(warning.level, NotificationLevel::Warning);
        assert_eq!(error.level, NotificationLevel::Error);
    }

    #[test]
    fn test_notifier_delivers_without_blocking() {
        let (tx, mut rx) = create_notification_channel(4);
        let notifier = Notifier::new(tx);

        notifier.error(NotificationCategory::Transport, "send failed".to_string());
        notifier.info(NotificationCategory::Scheduler, "started".to_string());

        let first = rx.try_pop().expect("first notification");
        assert_eq!(first.category, NotificationCategory::Transport);
        let second = rx.try_pop().expect("second notification");
        assert_eq!(second.category, NotificationCategory::Scheduler);
        assert!(rx.try_pop().is_none());
    }

    #[test]
    fn test_notifier_drops_on_full_channel() {
        let (tx, mut rx) = create_notification_channel(2);
        let notifier = Notifier::new(tx);

        for i in 0..5 {
            notifier.info(NotificationCategory::Generic, format!("n{}", i));
        }

        // Capacity 2: the rest were dropped, not blocked on
        assert!(rx.try_pop().is_some());
        assert!(rx.try_pop().is_some());
        assert!(rx.try_pop().is_none());
    }
}
