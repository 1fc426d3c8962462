//! A player's game session as spectators see it
//!
//! Holds the cast password, the caster client's known-creature cache and
//! the transports of everyone watching. Lives on the game thread.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cast::known::{KnownCheck, KnownCreatureSet};
use crate::game::creature::CreatureId;
use crate::net::protocol::ServerMessage;
use crate::net::session::SpectatorId;
use crate::net::transport::Transport;

pub struct CasterSession {
    player_id: CreatureId,
    transport: Arc<dyn Transport>,
    /// `None` or empty while not casting
    password: RefCell<Option<String>>,
    known_creatures: RefCell<KnownCreatureSet>,
    spectators: RefCell<BTreeMap<SpectatorId, Arc<dyn Transport>>>,
}

impl CasterSession {
    pub fn new(player_id: CreatureId, transport: Arc<dyn Transport>, known_creature_limit: usize) -> Self {
        Self {
            player_id,
            transport,
            password: RefCell::new(None),
            known_creatures: RefCell::new(KnownCreatureSet::with_capacity(known_creature_limit)),
            spectators: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn player_id(&self) -> CreatureId {
        self.player_id
    }

    /// Open the cast. An empty password leaves casting disabled.
    pub fn start_cast(&self, password: impl Into<String>) -> bool {
        let password = password.into();
        let enabled = !password.is_empty();
        *self.password.borrow_mut() = enabled.then_some(password);
        if enabled {
            info!("Player {} started casting", self.player_id);
        }
        enabled
    }

    /// Close the cast and forget every spectator. Returns who was watching
    /// so the caller can disconnect them.
    pub fn stop_cast(&self) -> Vec<SpectatorId> {
        *self.password.borrow_mut() = None;
        let watching = std::mem::take(&mut *self.spectators.borrow_mut());
        watching.into_keys().collect()
    }

    pub fn is_live_caster(&self) -> bool {
        self.password.borrow().as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Never true while casting is disabled
    pub fn password_matches(&self, candidate: &str) -> bool {
        match self.password.borrow().as_deref() {
            Some(password) if !password.is_empty() => password == candidate,
            _ => false,
        }
    }

    /// Record that the caster's client was sent `id`
    pub fn note_creature_known(&self, id: CreatureId) -> KnownCheck {
        self.known_creatures.borrow_mut().check_as_known(id)
    }

    /// Caster's cache, oldest first
    pub fn known_creature_ids(&self) -> Vec<CreatureId> {
        self.known_creatures.borrow().iter().collect()
    }

    /// Returns false if the spectator was already registered
    pub fn add_spectator(&self, id: SpectatorId, transport: Arc<dyn Transport>) -> bool {
        let mut spectators = self.spectators.borrow_mut();
        if spectators.contains_key(&id) {
            return false;
        }
        spectators.insert(id, transport);
        debug!("{} watching player {}", id, self.player_id);
        true
    }

    pub fn remove_spectator(&self, id: SpectatorId) -> bool {
        self.spectators.borrow_mut().remove(&id).is_some()
    }

    pub fn has_spectator(&self, id: SpectatorId) -> bool {
        self.spectators.borrow().contains_key(&id)
    }

    pub fn spectator_count(&self) -> usize {
        self.spectators.borrow().len()
    }

    /// Send a spectator's chat line to the caster and every spectator.
    /// Returns the number of recipients.
    pub fn broadcast_spectator_message(&self, text: &str) -> usize {
        let message = ServerMessage::spectator_talk(text);
        self.transport.send(vec![message.clone()]);

        let spectators = self.spectators.borrow();
        for transport in spectators.values() {
            transport.send(vec![message.clone()]);
        }
        spectators.len() + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::transport::testing::RecordingTransport;

    fn caster() -> (CasterSession, Arc<RecordingTransport>) {
        let transport = RecordingTransport::new();
        (CasterSession::new(101, transport.clone(), 1300), transport)
    }

    #[test]
    fn test_empty_password_disables_casting() {
        let (caster, _) = caster();
        assert!(!caster.start_cast(""));
        assert!(!caster.is_live_caster());
        assert!(!caster.password_matches(""));
        assert!(!caster.password_matches("anything"));
    }

    #[test]
    fn test_password_matching() {
        let (caster, _) = caster();
        assert!(caster.start_cast("secret"));
        assert!(caster.is_live_caster());
        assert!(caster.password_matches("secret"));
        assert!(!caster.password_matches("Secret"));
        assert!(!caster.password_matches(""));
    }

    #[test]
    fn test_spectators_are_registered_once() {
        let (caster, _) = caster();
        let id = SpectatorId::from_raw(1);
        assert!(caster.add_spectator(id, RecordingTransport::new()));
        assert!(!caster.add_spectator(id, RecordingTransport::new()));
        assert_eq!(caster.spectator_count(), 1);

        assert!(caster.remove_spectator(id));
        assert!(!caster.remove_spectator(id));
        assert!(!caster.has_spectator(id));
    }

    #[test]
    fn test_stop_cast_returns_watchers() {
        let (caster, _) = caster();
        caster.start_cast("secret");
        caster.add_spectator(SpectatorId::from_raw(2), RecordingTransport::new());
        caster.add_spectator(SpectatorId::from_raw(1), RecordingTransport::new());

        let watching = caster.stop_cast();
        assert_eq!(watching, vec![SpectatorId::from_raw(1), SpectatorId::from_raw(2)]);
        assert!(!caster.is_live_caster());
        assert_eq!(caster.spectator_count(), 0);
    }

    #[test]
    fn test_broadcast_reaches_caster_and_spectators() {
        let (caster, caster_transport) = caster();
        let a = RecordingTransport::new();
        let b = RecordingTransport::new();
        caster.add_spectator(SpectatorId::from_raw(1), a.clone());
        caster.add_spectator(SpectatorId::from_raw(2), b.clone());

        assert_eq!(caster.broadcast_spectator_message("nice"), 3);
        let expected = vec![ServerMessage::spectator_talk("nice")];
        assert_eq!(caster_transport.messages(), expected);
        assert_eq!(a.messages(), expected);
        assert_eq!(b.messages(), expected);
    }

    #[test]
    fn test_known_creatures_are_bounded() {
        let transport = RecordingTransport::new();
        let caster = CasterSession::new(101, transport, 2);
        caster.note_creature_known(1);
        caster.note_creature_known(2);
        assert_eq!(
            caster.note_creature_known(3),
            KnownCheck::Added { evicted: Some(1) }
        );
        assert_eq!(caster.known_creature_ids(), vec![2, 3]);
    }
}
