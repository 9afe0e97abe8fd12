//! Per-recipient fan-out for channels that address individual users.
//!
//! A subscription with its own recipient list goes only to those recipients;
//! otherwise it goes to every id in the channel's global list. Items are
//! replicated into each of their groups, not partitioned.

use std::collections::BTreeMap;

use subtrack_core::{ReminderDecision, Subscription};

/// Group key used when no recipient is configured anywhere.
pub const NO_RECIPIENT: &str = "";

/// Anything that may carry a recipient override.
pub trait Recipients {
    /// Comma-separated override, if any.
    fn recipient_override(&self) -> Option<&str>;
}

impl Recipients for Subscription {
    fn recipient_override(&self) -> Option<&str> {
        self.notify_recipients.as_deref()
    }
}

impl Recipients for ReminderDecision {
    fn recipient_override(&self) -> Option<&str> {
        self.subscription.notify_recipients.as_deref()
    }
}

/// Split a comma-separated id list, trimming blanks and duplicates.
pub fn split_ids(list: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for id in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !ids.iter().any(|known| known == id) {
            ids.push(id.to_string());
        }
    }
    ids
}

/// Map each recipient id to the items it should receive.
pub fn distribute<'a, T: Recipients>(
    items: &'a [T],
    global_recipients: &str,
) -> BTreeMap<String, Vec<&'a T>> {
    let global = split_ids(global_recipients);
    let mut groups: BTreeMap<String, Vec<&'a T>> = BTreeMap::new();

    for item in items {
        let overrides = item.recipient_override().map(split_ids).unwrap_or_default();
        let targets = if !overrides.is_empty() {
            overrides
        } else if !global.is_empty() {
            global.clone()
        } else {
            vec![NO_RECIPIENT.to_string()]
        };
        for target in targets {
            groups.entry(target).or_default().push(item);
        }
    }
    groups
}
