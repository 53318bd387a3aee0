use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{
    error::DomainError, export::ExportState, profile::ProfileRecord, role::RoleTier,
};

/// Point-in-time copy of a card session, safe to hand to templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardSnapshot {
    pub id: Uuid,
    pub handle_input: String,
    pub role: Option<RoleTier>,
    pub profile: Option<ProfileRecord>,
    pub export_state: ExportState,
    pub message: Option<String>,
}

impl CardSnapshot {
    pub fn is_generated(&self) -> bool {
        self.profile.is_some() && self.role.is_some()
    }

    pub fn status_text(&self) -> &'static str {
        self.export_state.status_text()
    }
}

/// The profile and role an export works from, tagged with their cycle.
#[derive(Debug, Clone)]
pub struct BoundCard {
    pub cycle: u64,
    pub profile: ProfileRecord,
    pub role: RoleTier,
}

#[derive(Debug)]
struct CardSlot {
    handle_input: String,
    role: Option<RoleTier>,
    profile: Option<ProfileRecord>,
    export_state: ExportState,
    message: Option<String>,
    cycle: u64,
    touched_at: Instant,
}

impl CardSlot {
    fn new() -> Self {
        Self {
            handle_input: String::new(),
            role: None,
            profile: None,
            export_state: ExportState::Idle,
            message: None,
            cycle: 0,
            touched_at: Instant::now(),
        }
    }
}

/// One user's card: at most one profile and one role at a time.
///
/// Every generation or reset starts a new cycle. Export progress reported
/// against an older cycle is dropped.
#[derive(Debug)]
pub struct CardSession {
    id: Uuid,
    slot: Mutex<CardSlot>,
}

impl CardSession {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            slot: Mutex::new(CardSlot::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, CardSlot> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.touched_at = Instant::now();
        slot
    }

    pub fn snapshot(&self) -> CardSnapshot {
        let slot = self.lock();
        CardSnapshot {
            id: self.id,
            handle_input: slot.handle_input.clone(),
            role: slot.role,
            profile: slot.profile.clone(),
            export_state: slot.export_state,
            message: slot.message.clone(),
        }
    }

    pub fn cycle(&self) -> u64 {
        self.lock().cycle
    }

    pub fn bound(&self) -> Option<BoundCard> {
        let slot = self.lock();
        match (&slot.profile, slot.role) {
            (Some(profile), Some(role)) => Some(BoundCard {
                cycle: slot.cycle,
                profile: profile.clone(),
                role,
            }),
            _ => None,
        }
    }

    /// Replace profile and role together, starting a new cycle.
    pub fn bind(&self, handle_input: &str, role: RoleTier, profile: ProfileRecord) -> u64 {
        let mut slot = self.lock();
        slot.cycle += 1;
        slot.handle_input = handle_input.trim().to_string();
        slot.role = Some(role);
        slot.profile = Some(profile);
        slot.export_state = ExportState::Idle;
        slot.message = None;
        slot.cycle
    }

    /// Keep the user's input and show a validation message without
    /// touching the bound card.
    pub fn reject(&self, handle_input: &str, message: impl Into<String>) {
        let mut slot = self.lock();
        slot.handle_input = handle_input.trim().to_string();
        slot.message = Some(message.into());
    }

    /// Clear everything. Repeating a reset yields the same state.
    pub fn reset(&self) {
        let mut slot = self.lock();
        slot.cycle += 1;
        slot.handle_input.clear();
        slot.role = None;
        slot.profile = None;
        slot.export_state = ExportState::Idle;
        slot.message = None;
    }

    /// Move the export state forward. Returns `false` when `cycle` is stale
    /// and the update was discarded.
    pub fn advance(&self, cycle: u64, next: ExportState) -> Result<bool, DomainError> {
        let mut slot = self.lock();
        if slot.cycle != cycle {
            return Ok(false);
        }
        slot.export_state = slot.export_state.transition(next)?;
        Ok(true)
    }

    fn idle_for(&self, now: Instant) -> Duration {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        now.saturating_duration_since(slot.touched_at)
    }
}

/// Process-wide card session store.
#[derive(Default, Clone)]
pub struct CardSessions {
    sessions: Arc<DashMap<Uuid, Arc<CardSession>>>,
}

impl CardSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self) -> Arc<CardSession> {
        let session = Arc::new(CardSession::new(Uuid::new_v4()));
        self.sessions.insert(session.id(), Arc::clone(&session));
        session
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<CardSession>> {
        self.sessions.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop sessions idle for at least `ttl`, except those `keep` vetoes.
    pub fn sweep(&self, ttl: Duration, keep: impl Fn(Uuid) -> bool) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions
            .retain(|id, session| keep(*id) || session.idle_for(now) < ttl);
        before.saturating_sub(self.sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::handle::Handle;

    fn profile(raw: &str) -> ProfileRecord {
        ProfileRecord::handle_only(Handle::parse(raw).unwrap())
    }

    #[test]
    fn bind_replaces_profile_and_role() {
        let sessions = CardSessions::new();
        let session = sessions.create();

        session.bind("@one", RoleTier::Mage, profile("one"));
        let second = session.bind("@two", RoleTier::Forerunner, profile("two"));

        let snapshot = session.snapshot();
        assert_eq!(second, 2);
        assert_eq!(snapshot.handle_input, "@two");
        assert_eq!(snapshot.role, Some(RoleTier::Forerunner));
        assert_eq!(snapshot.profile.unwrap().handle.as_str(), "two");
    }

    #[test]
    fn reset_is_idempotent() {
        let session = CardSessions::new().create();
        session.bind("x", RoleTier::Mage, profile("x"));

        session.reset();
        let once = session.snapshot();
        session.reset();
        let twice = session.snapshot();

        assert_eq!(once, twice);
        assert!(!once.is_generated());
        assert_eq!(once.export_state, ExportState::Idle);
        assert!(once.handle_input.is_empty());
    }

    #[test]
    fn reset_after_success_matches_fresh_session() {
        let sessions = CardSessions::new();
        let session = sessions.create();
        let cycle = session.bind("x", RoleTier::Mage, profile("x"));
        for state in [
            ExportState::Rendering,
            ExportState::Rasterizing,
            ExportState::PreparingDelivery,
            ExportState::DeliveryInProgress,
            ExportState::Succeeded,
        ] {
            assert!(session.advance(cycle, state).unwrap());
        }

        session.reset();
        let once = session.snapshot();
        session.reset();
        let twice = session.snapshot();
        let fresh = sessions.create().snapshot();

        assert_eq!(once, twice);
        assert_eq!(
            (&twice.handle_input, twice.role, &twice.profile, twice.export_state),
            (&fresh.handle_input, fresh.role, &fresh.profile, fresh.export_state)
        );
        assert_eq!(twice.status_text(), "");
    }

    #[test]
    fn stale_cycle_updates_are_discarded() {
        let session = CardSessions::new().create();
        let cycle = session.bind("x", RoleTier::Mage, profile("x"));

        assert!(session.advance(cycle, ExportState::Rendering).unwrap());
        session.reset();
        assert!(!session.advance(cycle, ExportState::Rasterizing).unwrap());
        assert_eq!(session.snapshot().export_state, ExportState::Idle);
    }

    #[test]
    fn invalid_transition_is_reported() {
        let session = CardSessions::new().create();
        let cycle = session.bind("x", RoleTier::Mage, profile("x"));
        assert!(session.advance(cycle, ExportState::Succeeded).is_err());
    }

    #[test]
    fn reject_keeps_bound_card() {
        let session = CardSessions::new().create();
        session.bind("x", RoleTier::Mage, profile("x"));
        session.reject("  ", "Enter a handle");

        let snapshot = session.snapshot();
        assert!(snapshot.is_generated());
        assert_eq!(snapshot.message.as_deref(), Some("Enter a handle"));
    }

    #[test]
    fn sweep_honours_keep_predicate() {
        let sessions = CardSessions::new();
        let kept = sessions.create();
        sessions.create();

        let removed = sessions.sweep(Duration::ZERO, |id| id == kept.id());

        assert_eq!(removed, 1);
        assert_eq!(sessions.len(), 1);
        assert!(sessions.get(kept.id()).is_some());
    }
}
