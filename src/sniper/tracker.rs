use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// How a guild's vanity code was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationKind {
    /// Bootstrap data from a ready payload or a guild becoming visible
    Snapshot,
    Update,
    /// The guild disappeared from a session's view
    Delete,
}

/// Last-known vanity code per guild, shared by every session.
///
/// A guild missing from the map is unknown, which is distinct from a guild
/// known to have no code (stored as an empty string).
#[derive(Default)]
pub struct AliasTracker {
    codes: Mutex<HashMap<String, String>>,
}

impl AliasTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation and return the code to claim when the guild lost
    /// a vanity code it previously held.
    pub fn observe(&self, guild_id: &str, new_code: &str, kind: ObservationKind) -> Option<String> {
        self.observe_gated(guild_id, new_code, kind, |_| true)
    }

    /// Same as [`observe`](Self::observe), but an actionable transition is only
    /// committed when `gate` accepts the target code. A refused transition
    /// leaves the stored code untouched so a later event can fire again.
    ///
    /// `gate` runs while the tracker lock is held.
    pub fn observe_gated<F>(
        &self,
        guild_id: &str,
        new_code: &str,
        kind: ObservationKind,
        gate: F,
    ) -> Option<String>
    where
        F: FnOnce(&str) -> bool,
    {
        let mut codes = self.codes();

        match kind {
            ObservationKind::Snapshot => {
                codes.insert(guild_id.to_string(), new_code.to_string());
                None
            }
            ObservationKind::Update => {
                let old = match codes.get(guild_id) {
                    Some(old) if old == new_code => return None,
                    Some(old) => old.clone(),
                    None => String::new(),
                };

                if old.is_empty() {
                    codes.insert(guild_id.to_string(), new_code.to_string());
                    return None;
                }

                if !gate(&old) {
                    return None;
                }

                codes.insert(guild_id.to_string(), new_code.to_string());
                Some(old)
            }
            ObservationKind::Delete => {
                let old = codes.get(guild_id).filter(|code| !code.is_empty())?;
                if gate(old) {
                    Some(old.clone())
                } else {
                    None
                }
            }
        }
    }

    pub fn known_code(&self, guild_id: &str) -> Option<String> {
        self.codes().get(guild_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.codes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn codes(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.codes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_records_without_transition() {
        let tracker = AliasTracker::new();
        assert_eq!(tracker.observe("g1", "foo", ObservationKind::Snapshot), None);
        assert_eq!(tracker.observe("g2", "", ObservationKind::Snapshot), None);
        assert_eq!(tracker.known_code("g1").as_deref(), Some("foo"));
        assert_eq!(tracker.known_code("g2").as_deref(), Some(""));
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn unchanged_updates_never_fire() {
        let tracker = AliasTracker::new();
        tracker.observe("g1", "foo", ObservationKind::Snapshot);
        for _ in 0..5 {
            assert_eq!(tracker.observe("g1", "foo", ObservationKind::Update), None);
        }
        assert_eq!(tracker.known_code("g1").as_deref(), Some("foo"));
    }

    #[test]
    fn cleared_code_fires_with_previous_code() {
        let tracker = AliasTracker::new();
        tracker.observe("g1", "foo", ObservationKind::Snapshot);
        assert_eq!(
            tracker.observe("g1", "", ObservationKind::Update).as_deref(),
            Some("foo")
        );
        assert_eq!(tracker.known_code("g1").as_deref(), Some(""));
    }

    #[test]
    fn changed_code_fires_with_previous_code() {
        let tracker = AliasTracker::new();
        tracker.observe("g1", "foo", ObservationKind::Snapshot);
        assert_eq!(
            tracker.observe("g1", "bar", ObservationKind::Update).as_deref(),
            Some("foo")
        );
        assert_eq!(tracker.known_code("g1").as_deref(), Some("bar"));
    }

    #[test]
    fn guild_without_prior_code_never_fires() {
        let tracker = AliasTracker::new();
        // unknown guild
        assert_eq!(tracker.observe("g1", "new", ObservationKind::Update), None);
        assert_eq!(tracker.known_code("g1").as_deref(), Some("new"));

        // known empty guild
        tracker.observe("g2", "", ObservationKind::Snapshot);
        assert_eq!(tracker.observe("g2", "gained", ObservationKind::Update), None);
        assert_eq!(tracker.known_code("g2").as_deref(), Some("gained"));

        // unknown guild observed empty
        assert_eq!(tracker.observe("g3", "", ObservationKind::Update), None);
        assert_eq!(tracker.known_code("g3").as_deref(), Some(""));
    }

    #[test]
    fn delete_after_known_code_fires() {
        let tracker = AliasTracker::new();
        tracker.observe("g1", "foo", ObservationKind::Snapshot);
        assert_eq!(
            tracker.observe("g1", "", ObservationKind::Delete).as_deref(),
            Some("foo")
        );
        // record is left in place
        assert_eq!(tracker.known_code("g1").as_deref(), Some("foo"));
    }

    #[test]
    fn delete_after_empty_or_unknown_does_not_fire() {
        let tracker = AliasTracker::new();
        tracker.observe("g1", "", ObservationKind::Snapshot);
        assert_eq!(tracker.observe("g1", "", ObservationKind::Delete), None);
        assert_eq!(tracker.observe("unknown", "", ObservationKind::Delete), None);
        assert!(tracker.known_code("unknown").is_none());
    }

    #[test]
    fn duplicate_delivery_fires_once() {
        let tracker = AliasTracker::new();
        tracker.observe("g1", "foo", ObservationKind::Snapshot);
        assert!(tracker.observe("g1", "", ObservationKind::Update).is_some());
        assert!(tracker.observe("g1", "", ObservationKind::Update).is_none());
    }

    #[test]
    fn refused_gate_leaves_record_untouched() {
        let tracker = AliasTracker::new();
        tracker.observe("g1", "foo", ObservationKind::Snapshot);

        let fired = tracker.observe_gated("g1", "", ObservationKind::Update, |target| {
            assert_eq!(target, "foo");
            false
        });
        assert_eq!(fired, None);
        assert_eq!(tracker.known_code("g1").as_deref(), Some("foo"));

        // the same event fires once the gate opens
        assert_eq!(
            tracker.observe("g1", "", ObservationKind::Update).as_deref(),
            Some("foo")
        );
    }

    #[test]
    fn gate_not_consulted_for_inactionable_events() {
        let tracker = AliasTracker::new();
        tracker.observe("g1", "", ObservationKind::Snapshot);
        let fired = tracker.observe_gated("g1", "x", ObservationKind::Update, |_| {
            panic!("gate should not run")
        });
        assert_eq!(fired, None);
    }
}
