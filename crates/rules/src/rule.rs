//! Compiled rule model shared by the matcher and the dispatchers.

use std::collections::{BTreeSet, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use regex::Regex;

/// One alerting policy: a tag/level predicate plus its two channels.
#[derive(Debug)]
pub struct Rule {
    /// Unique name derived from the sorted tags and levels.
    pub name: String,
    /// Upper-cased tags; all of them must be present on an event.
    pub tags: BTreeSet<String>,
    /// Upper-cased levels. Empty means any level.
    pub levels: BTreeSet<String>,
    /// Case-sensitive substrings that suppress the rule for an event.
    pub ignore_contains: Vec<String>,
    pub chat: ChatChannel,
    pub mail: MailChannel,
}

impl Rule {
    /// `event_tags` must already be upper-cased.
    pub fn matches_tags(&self, event_tags: &HashSet<String>) -> bool {
        self.tags.iter().all(|t| event_tags.contains(t))
    }

    /// `level` must already be upper-cased.
    pub fn matches_level(&self, level: &str) -> bool {
        self.levels.is_empty() || self.levels.contains(level)
    }

    /// The first ignore pattern contained in `message`, if any.
    pub fn suppressed_by(&self, message: &str) -> Option<&str> {
        self.ignore_contains
            .iter()
            .find(|p| !p.is_empty() && message.contains(p.as_str()))
            .map(|p| p.as_str())
    }

    /// Tags joined for display in subjects and logs.
    pub fn tag_label(&self) -> String {
        self.tags.iter().cloned().collect::<Vec<_>>().join(",")
    }
}

/// Derive the rule name from normalized tags and levels, e.g. `DB+PROD@ERROR`.
///
/// An empty side is written as `*`.
pub fn derive_name(tags: &BTreeSet<String>, levels: &BTreeSet<String>) -> String {
    fn join(set: &BTreeSet<String>) -> String {
        if set.is_empty() {
            "*".to_string()
        } else {
            set.iter().cloned().collect::<Vec<_>>().join("+")
        }
    }
    format!("{}@{}", join(tags), join(levels))
}

// ── Chat ──────────────────────────────────────────────────────

/// Push notification path to one or more bot tokens.
#[derive(Debug)]
pub struct ChatChannel {
    pub enabled: bool,
    pub match_regex: Regex,
    /// Maximum event age; `None` disables the check.
    pub expiry: Option<Duration>,
    /// Bot tokens in configuration order.
    pub senders: Vec<String>,
}

// ── Mail ──────────────────────────────────────────────────────

/// SMTP credentials for one sender in the failover pool.
#[derive(Clone)]
pub struct MailSender {
    pub smtp: String,
    pub port: u16,
    pub sender: String,
    pub password: String,
    pub tls: bool,
}

impl std::fmt::Debug for MailSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailSender")
            .field("smtp", &self.smtp)
            .field("port", &self.port)
            .field("sender", &self.sender)
            .field("password", &"***")
            .field("tls", &self.tls)
            .finish()
    }
}

/// Messages taken from the pending queue by one flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailBatch {
    /// Earliest-enqueued entries, at most `max_batch_size` of them.
    pub entries: Vec<String>,
    /// Entries discarded because the queue held more than the cap.
    pub dropped: usize,
}

#[derive(Debug, Default)]
struct MailState {
    pending: Vec<String>,
    next_sender: usize,
}

/// Aggregating mail path. The pending queue and the round-robin cursor share
/// one lock, which is only held for the short critical sections below.
#[derive(Debug)]
pub struct MailChannel {
    pub enabled: bool,
    pub flush_interval: Duration,
    pub expiry: Option<Duration>,
    pub recipients: Vec<String>,
    pub senders: Vec<MailSender>,
    pub max_batch_size: usize,
    state: Mutex<MailState>,
}

impl MailChannel {
    pub fn new(
        enabled: bool,
        flush_interval: Duration,
        expiry: Option<Duration>,
        recipients: Vec<String>,
        senders: Vec<MailSender>,
        max_batch_size: usize,
    ) -> Self {
        Self {
            enabled,
            flush_interval,
            expiry,
            recipients,
            senders,
            max_batch_size,
            state: Mutex::new(MailState::default()),
        }
    }

    /// Append a rendered message. Returns the queue length after the append.
    pub fn enqueue(&self, message: String) -> usize {
        let mut state = self.state.lock().expect("mail state lock poisoned");
        state.pending.push(message);
        state.pending.len()
    }

    /// Snapshot up to `max_batch_size` entries and clear the queue.
    ///
    /// Returns `None` when nothing is pending.
    pub fn take_batch(&self) -> Option<MailBatch> {
        let mut state = self.state.lock().expect("mail state lock poisoned");
        if state.pending.is_empty() {
            return None;
        }
        let mut entries = std::mem::take(&mut state.pending);
        let keep = entries.len().min(self.max_batch_size);
        let dropped = entries.len() - keep;
        entries.truncate(keep);
        Some(MailBatch { entries, dropped })
    }

    /// Return the sender under the cursor and advance the cursor by one.
    pub fn next_sender(&self) -> Option<(usize, &MailSender)> {
        if self.senders.is_empty() {
            return None;
        }
        let mut state = self.state.lock().expect("mail state lock poisoned");
        let idx = state.next_sender % self.senders.len();
        state.next_sender = (idx + 1) % self.senders.len();
        Some((idx, &self.senders[idx]))
    }

    /// Current round-robin cursor.
    pub fn cursor(&self) -> usize {
        self.state.lock().expect("mail state lock poisoned").next_sender
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().expect("mail state lock poisoned").pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender(name: &str) -> MailSender {
        MailSender {
            smtp: "smtp.example.com".into(),
            port: 587,
            sender: format!("{name}@example.com"),
            password: "pw".into(),
            tls: true,
        }
    }

    fn channel(max_batch_size: usize, senders: usize) -> MailChannel {
        MailChannel::new(
            true,
            Duration::from_secs(60),
            None,
            vec!["ops@example.com".into()],
            (0..senders).map(|i| sender(&format!("s{i}"))).collect(),
            max_batch_size,
        )
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn name_is_sorted_and_stable() {
        assert_eq!(derive_name(&set(&["PROD", "DB"]), &set(&["ERROR"])), "DB+PROD@ERROR");
        assert_eq!(derive_name(&set(&[]), &set(&[])), "*@*");
        assert_eq!(derive_name(&set(&["A"]), &set(&["WARN", "ERROR"])), "A@ERROR+WARN");
    }

    #[test]
    fn take_batch_caps_and_clears() {
        let ch = channel(3, 1);
        for i in 0..5 {
            ch.enqueue(format!("m{i}"));
        }
        let batch = ch.take_batch().unwrap();
        assert_eq!(batch.entries, vec!["m0", "m1", "m2"]);
        assert_eq!(batch.dropped, 2);
        assert_eq!(ch.pending_len(), 0);
        assert!(ch.take_batch().is_none());
    }

    #[test]
    fn take_batch_under_cap_drops_nothing() {
        let ch = channel(10, 1);
        ch.enqueue("only".into());
        let batch = ch.take_batch().unwrap();
        assert_eq!(batch.entries, vec!["only"]);
        assert_eq!(batch.dropped, 0);
    }

    #[test]
    fn cursor_wraps_around() {
        let ch = channel(10, 3);
        let picked: Vec<usize> = (0..7).map(|_| ch.next_sender().unwrap().0).collect();
        assert_eq!(picked, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(ch.cursor(), 7 % 3);
    }

    #[test]
    fn next_sender_on_empty_pool() {
        let ch = channel(10, 0);
        assert!(ch.next_sender().is_none());
    }

    #[test]
    fn sender_debug_hides_password() {
        let dbg = format!("{:?}", sender("a"));
        assert!(!dbg.contains("pw"));
    }
}
