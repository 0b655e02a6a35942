use crate::error::AppError;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A destination guild resolved from the rotation cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub index: usize,
    pub guild_id: String,
}

/// What settling a successful claim did to the rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The cursor now points at the next destination
    Advanced,
    /// The list was used up and the cursor went back to the first destination
    Wrapped,
    /// Another claim already moved the cursor past this slot
    Stale,
}

struct LedgerState {
    cursor: usize,
    cooldowns: HashMap<String, Instant>,
}

/// Rotation cursor and per-destination cooldowns.
///
/// All reads and writes go through one mutex, so the compound operations below
/// are atomic with respect to every session's event handlers. The cursor and
/// cooldown map are never handed out.
pub struct Ledger {
    destinations: Vec<String>,
    rotate: bool,
    state: Mutex<LedgerState>,
}

impl Ledger {
    pub fn new(destinations: Vec<String>, rotate: bool) -> Result<Self, AppError> {
        if destinations.is_empty() {
            return Err(AppError::Config(
                "at least one destination guild is required".into(),
            ));
        }

        Ok(Self {
            destinations,
            rotate,
            state: Mutex::new(LedgerState {
                cursor: 0,
                cooldowns: HashMap::new(),
            }),
        })
    }

    pub fn cursor(&self) -> usize {
        self.state().cursor
    }

    /// Resolve the destination the next claim should target.
    pub fn current_destination(&self) -> Result<Slot, AppError> {
        let state = self.state();
        self.slot_at(state.cursor)
    }

    pub fn is_on_cooldown(&self, destination: &str) -> bool {
        self.cooldown_remaining(destination).is_some()
    }

    pub fn is_on_cooldown_at(&self, destination: &str, now: Instant) -> bool {
        self.cooldown_remaining_at(destination, now).is_some()
    }

    pub fn cooldown_remaining(&self, destination: &str) -> Option<Duration> {
        self.cooldown_remaining_at(destination, Instant::now())
    }

    /// Time left on the destination's cooldown. An expired entry is dropped.
    pub fn cooldown_remaining_at(&self, destination: &str, now: Instant) -> Option<Duration> {
        let mut state = self.state();
        let expiry = *state.cooldowns.get(destination)?;
        if now < expiry {
            Some(expiry - now)
        } else {
            state.cooldowns.remove(destination);
            None
        }
    }

    /// Install the slot's cooldown and advance the cursor past it.
    ///
    /// The cursor only moves when it still points at `slot`, so two claims
    /// settled against the same slot advance it once. Returns whether it moved.
    pub fn record_success(&self, slot: &Slot, cooldown: Duration) -> bool {
        let mut state = self.state();
        Self::record(&mut state, slot, cooldown, Instant::now())
    }

    /// Wrap the cursor back to the first destination once the list is used up.
    /// Returns `true` on wrap, or [`AppError::DestinationsExhausted`] when
    /// rotation is disabled.
    pub fn advance_if_exhausted(&self) -> Result<bool, AppError> {
        let mut state = self.state();
        self.wrap(&mut state)
    }

    /// [`record_success`](Self::record_success) and
    /// [`advance_if_exhausted`](Self::advance_if_exhausted) under a single lock.
    pub fn settle_success(&self, slot: &Slot, cooldown: Duration) -> Result<Settlement, AppError> {
        self.settle_success_at(slot, cooldown, Instant::now())
    }

    pub fn settle_success_at(
        &self,
        slot: &Slot,
        cooldown: Duration,
        now: Instant,
    ) -> Result<Settlement, AppError> {
        let mut state = self.state();
        if !Self::record(&mut state, slot, cooldown, now) {
            return Ok(Settlement::Stale);
        }
        if self.wrap(&mut state)? {
            Ok(Settlement::Wrapped)
        } else {
            Ok(Settlement::Advanced)
        }
    }

    fn record(state: &mut LedgerState, slot: &Slot, cooldown: Duration, now: Instant) -> bool {
        if !cooldown.is_zero() {
            state.cooldowns.insert(slot.guild_id.clone(), now + cooldown);
        }
        if state.cursor != slot.index {
            return false;
        }
        state.cursor += 1;
        true
    }

    fn wrap(&self, state: &mut LedgerState) -> Result<bool, AppError> {
        if state.cursor < self.destinations.len() {
            return Ok(false);
        }
        if !self.rotate {
            return Err(AppError::DestinationsExhausted);
        }
        state.cursor = 0;
        Ok(true)
    }

    fn slot_at(&self, index: usize) -> Result<Slot, AppError> {
        match self.destinations.get(index) {
            Some(guild_id) => Ok(Slot {
                index,
                guild_id: guild_id.clone(),
            }),
            // cursor sits past the end until the next wrap
            None if self.rotate => Ok(Slot {
                index,
                guild_id: self.destinations[index % self.destinations.len()].clone(),
            }),
            None => Err(AppError::DestinationsExhausted),
        }
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(ids: &[&str], rotate: bool) -> Ledger {
        Ledger::new(ids.iter().map(|s| s.to_string()).collect(), rotate).unwrap()
    }

    #[test]
    fn empty_destination_list_rejected() {
        assert!(matches!(
            Ledger::new(vec![], true),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn current_destination_follows_cursor() {
        let ledger = ledger(&["a", "b"], false);
        let slot = ledger.current_destination().unwrap();
        assert_eq!(slot, Slot { index: 0, guild_id: "a".into() });

        assert!(ledger.record_success(&slot, Duration::ZERO));
        assert_eq!(ledger.cursor(), 1);
        assert_eq!(ledger.current_destination().unwrap().guild_id, "b");
    }

    #[test]
    fn cooldown_boundaries_are_strict() {
        let ledger = ledger(&["a"], true);
        let start = Instant::now();
        let slot = ledger.current_destination().unwrap();
        ledger
            .settle_success_at(&slot, Duration::from_secs(10), start)
            .unwrap();

        assert!(ledger.is_on_cooldown_at("a", start));
        assert!(ledger.is_on_cooldown_at("a", start + Duration::from_millis(9_999)));
        assert_eq!(
            ledger.cooldown_remaining_at("a", start + Duration::from_secs(4)),
            Some(Duration::from_secs(6))
        );
        assert!(!ledger.is_on_cooldown_at("a", start + Duration::from_secs(10)));
    }

    #[test]
    fn expired_entry_is_removed_by_the_check() {
        let ledger = ledger(&["a"], true);
        let start = Instant::now();
        let slot = ledger.current_destination().unwrap();
        ledger
            .settle_success_at(&slot, Duration::from_secs(1), start)
            .unwrap();

        let later = start + Duration::from_secs(5);
        assert!(!ledger.is_on_cooldown_at("a", later));
        assert!(ledger.state().cooldowns.is_empty());
        // checking an earlier instant afterwards finds nothing left
        assert!(!ledger.is_on_cooldown_at("a", start));
    }

    #[test]
    fn zero_cooldown_installs_nothing() {
        let ledger = ledger(&["a", "b"], true);
        let slot = ledger.current_destination().unwrap();
        ledger.settle_success(&slot, Duration::ZERO).unwrap();
        assert!(!ledger.is_on_cooldown("a"));
        assert!(ledger.state().cooldowns.is_empty());
    }

    #[test]
    fn rotation_wraps_to_start() {
        let ledger = ledger(&["a", "b"], true);
        let first = ledger.current_destination().unwrap();
        assert_eq!(
            ledger.settle_success(&first, Duration::ZERO).unwrap(),
            Settlement::Advanced
        );
        let second = ledger.current_destination().unwrap();
        assert_eq!(second.guild_id, "b");
        assert_eq!(
            ledger.settle_success(&second, Duration::ZERO).unwrap(),
            Settlement::Wrapped
        );
        assert_eq!(ledger.cursor(), 0);
        assert_eq!(ledger.current_destination().unwrap().guild_id, "a");
    }

    #[test]
    fn exhaustion_without_rotation() {
        let ledger = ledger(&["a", "b"], false);
        let first = ledger.current_destination().unwrap();
        ledger.settle_success(&first, Duration::ZERO).unwrap();
        let second = ledger.current_destination().unwrap();
        assert!(matches!(
            ledger.settle_success(&second, Duration::ZERO),
            Err(AppError::DestinationsExhausted)
        ));
        assert!(matches!(
            ledger.current_destination(),
            Err(AppError::DestinationsExhausted)
        ));
        assert!(matches!(
            ledger.advance_if_exhausted(),
            Err(AppError::DestinationsExhausted)
        ));
    }

    #[test]
    fn advance_if_exhausted_is_noop_mid_list() {
        let ledger = ledger(&["a", "b"], false);
        assert!(!ledger.advance_if_exhausted().unwrap());
        assert_eq!(ledger.cursor(), 0);
    }

    #[test]
    fn stale_slot_does_not_advance_twice() {
        let ledger = ledger(&["a", "b", "c"], false);
        let slot = ledger.current_destination().unwrap();
        let same = ledger.current_destination().unwrap();

        assert_eq!(
            ledger.settle_success(&slot, Duration::from_secs(30)).unwrap(),
            Settlement::Advanced
        );
        assert_eq!(
            ledger.settle_success(&same, Duration::from_secs(30)).unwrap(),
            Settlement::Stale
        );
        assert_eq!(ledger.cursor(), 1);
    }

    #[test]
    fn concurrent_settlements_advance_once_per_slot() {
        use std::sync::Arc;

        let ledger = Arc::new(ledger(&["a", "b", "c", "d"], true));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    let slot = ledger.current_destination().unwrap();
                    ledger.settle_success(&slot, Duration::ZERO).unwrap()
                })
            })
            .collect();

        let advanced = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|s| *s != Settlement::Stale)
            .count();

        assert_eq!(ledger.cursor(), advanced % 4);
    }
}
