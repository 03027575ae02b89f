//! Fire-and-forget notification of rule set changes.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::thread;

use crate::model::FirewallRule;

/// Hands the rule set to a subscriber after every change, on a background thread.
///
/// Notifications are queued without waiting: when the queue is full (the subscriber is too
/// slow) the notification is dropped. A subscriber panic is logged and does not stop later
/// notifications.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    sender: Option<SyncSender<Vec<FirewallRule>>>,
}

impl Notifier {
    /// A notifier without subscriber.
    pub fn none() -> Self {
        Notifier { sender: None }
    }

    /// Starts a worker thread calling `callback` for every notification, with at most `capacity`
    /// notifications waiting.
    pub fn new<F>(capacity: usize, callback: F) -> Self
    where
        F: Fn(&[FirewallRule]) + Send + 'static,
    {
        let (sender, receiver) = sync_channel::<Vec<FirewallRule>>(capacity.max(1));
        let worker = thread::Builder::new()
            .name("hostwall-notify".to_string())
            .spawn(move || {
                for rules in receiver {
                    if catch_unwind(AssertUnwindSafe(|| callback(&rules))).is_err() {
                        warn!("The rule change subscriber panicked");
                    }
                }
                debug!("Notification worker stopped");
            });
        match worker {
            Ok(_) => Notifier {
                sender: Some(sender),
            },
            Err(e) => {
                warn!("Unable to start the notification worker, changes won't be notified: {}", e);
                Notifier::none()
            }
        }
    }

    pub fn notify(&self, rules: Vec<FirewallRule>) {
        let sender = match &self.sender {
            Some(sender) => sender,
            None => return,
        };
        match sender.try_send(rules) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("Notification queue full, dropping a notification"),
            Err(TrySendError::Disconnected(_)) => {
                warn!("Notification worker is gone, dropping a notification")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn absent_subscriber() {
        Notifier::none().notify(vec![]);
        Notifier::default().notify(vec![]);
    }

    #[test]
    fn delivers_in_order() {
        let (tx, rx) = channel();
        let tx = Mutex::new(tx);
        let notifier = Notifier::new(4, move |rules: &[FirewallRule]| {
            let _ = tx.lock().unwrap().send(rules.len());
        });
        notifier.notify(vec![]);
        notifier.notify(Vec::with_capacity(3));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 0);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 0);
    }

    #[test]
    fn slow_subscriber_never_blocks() {
        let (gate, gate_rx) = channel::<()>();
        let gate_rx = Mutex::new(gate_rx);
        let notifier = Notifier::new(1, move |_: &[FirewallRule]| {
            // blocks until the gate is dropped
            let _ = gate_rx.lock().unwrap().recv();
        });
        for _ in 0..10 {
            notifier.notify(vec![]);
        }
        drop(gate);
    }

    #[test]
    fn panicking_subscriber() {
        let (tx, rx) = channel();
        let tx = Mutex::new(tx);
        let notifier = Notifier::new(4, move |rules: &[FirewallRule]| {
            if rules.is_empty() {
                panic!("boom");
            }
            let _ = tx.lock().unwrap().send(rules.len());
        });
        notifier.notify(vec![]);
        notifier.notify(vec![crate::model::FirewallRule {
            handle: 1,
            chain: crate::model::ChainKind::Input,
            protocol: crate::model::Protocol::Any,
            port: 0,
            source_ip: None,
            action: crate::model::Action::Accept,
            comment: String::new(),
        }]);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
    }
}
