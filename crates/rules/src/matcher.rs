//! Tag/level predicate evaluation and ignore-list suppression.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use logpush_core::LogEvent;

use crate::rule::Rule;

/// Return the rules that fire for `event`.
///
/// A rule fires when all of its tags are on the event and the event level is
/// one of its levels (an empty level list accepts every level), both compared
/// case-insensitively. Rules whose ignore list hits the message are dropped.
pub fn match_event(event: &LogEvent, rules: &[Arc<Rule>]) -> Vec<Arc<Rule>> {
    let level = event.level.trim().to_uppercase();
    let tags: HashSet<String> = event.tags.iter().map(|t| t.trim().to_uppercase()).collect();

    rules
        .iter()
        .filter(|rule| rule.matches_tags(&tags) && rule.matches_level(&level))
        .filter(|rule| match rule.suppressed_by(&event.message) {
            Some(pattern) => {
                debug!(rule = %rule.name, pattern, "event suppressed by ignore list");
                false
            }
            None => true,
        })
        .cloned()
        .collect()
}
