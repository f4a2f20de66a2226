//! Outbound alerting: repeat suppression, message text, and delivery.

mod messages;
mod notifier;

pub use messages::{format_prediction, format_result};
pub use notifier::{
    notifier_from_config, AlertDispatcher, LogNotifier, Notifier, TelegramNotifier,
    WebhookNotifier,
};

/// Suppresses repeats of the last dispatched message.
///
/// A new signature always goes out. The same signature is held back until it
/// has been repeated `threshold` times, then sent again and the count restarts.
#[derive(Debug, Clone)]
pub struct AlertGate {
    last_signature: Option<String>,
    repeats: u32,
    threshold: u32,
}

impl AlertGate {
    pub fn new(threshold: u32) -> Self {
        Self {
            last_signature: None,
            repeats: 0,
            threshold,
        }
    }

    pub fn should_send(&mut self, signature: &str) -> bool {
        if self.last_signature.as_deref() != Some(signature) {
            self.last_signature = Some(signature.to_string());
            self.repeats = 0;
            return true;
        }

        self.repeats += 1;
        if self.repeats >= self.threshold {
            self.repeats = 0;
            return true;
        }
        false
    }

    pub fn last_signature(&self) -> Option<&str> {
        self.last_signature.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_threshold() {
        let mut gate = AlertGate::new(3);
        let sent: Vec<bool> = ["A", "A", "A", "A"].iter().map(|s| gate.should_send(s)).collect();
        assert_eq!(sent, vec![true, false, false, true]);
    }

    #[test]
    fn test_change_resets_counter() {
        let mut gate = AlertGate::new(3);
        assert!(gate.should_send("A"));
        assert!(!gate.should_send("A"));
        assert!(gate.should_send("B"));
        assert!(!gate.should_send("B"));
        assert!(!gate.should_send("B"));
        assert!(gate.should_send("B"));
        assert!(gate.should_send("A"));
        assert_eq!(gate.last_signature(), Some("A"));
    }
}
