#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative battle server.
//!
//! [`WorldServer`] owns the canonical [`BattleState`], the ability
//! registry, and a table of transport endpoints. Hosts drive it
//! synchronously: [`WorldServer::handle_message`] for each inbound
//! message and [`WorldServer::poll`] between them. Both resolve due
//! motions before anything else, so motion commits always serialize with
//! command processing instead of racing it on a timer.

use tracing::{debug, warn};

use skirmish_core::protocol::{
    CharacterUpdate, ClientMessage, MotionWire, ProtocolError, ServerMessage,
};
use skirmish_core::transport::MessageSink;
use skirmish_core::{CharacterId, Event, Timestamp};
use skirmish_system_abilities::{AbilityBook, CastCheck};
use skirmish_world::{BattleState, WorldError};

/// Stable identifier of a connected endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EndpointId(u32);

impl EndpointId {
    /// Wraps a raw endpoint identifier.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// Errors surfaced to the embedding host.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The endpoint identifier is not in the endpoint table.
    #[error("unknown endpoint {}", .0.get())]
    UnknownEndpoint(EndpointId),
    /// A cast named a title absent from the registry; the roster and the
    /// registry disagree, which is a configuration error, not bad input.
    #[error("no ability registered under title {0:?}")]
    UnknownSpell(String),
    /// A wire message could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Battle state and inputs disagree structurally.
    #[error(transparent)]
    World(#[from] WorldError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AuthState {
    Unauthenticated,
    Authenticated,
}

struct Endpoint {
    id: EndpointId,
    sink: Box<dyn MessageSink>,
    auth: AuthState,
}

/// The authoritative server for one battle.
pub struct WorldServer {
    state: BattleState,
    book: AbilityBook,
    secret: String,
    endpoints: Vec<Endpoint>,
    next_endpoint: u32,
}

impl WorldServer {
    /// Creates a server over an initial state and ability registry.
    #[must_use]
    pub fn new(state: BattleState, book: AbilityBook, secret: impl Into<String>) -> Self {
        Self {
            state,
            book,
            secret: secret.into(),
            endpoints: Vec::new(),
            next_endpoint: 0,
        }
    }

    /// Read access to the canonical state, for queries and tests.
    #[must_use]
    pub const fn state(&self) -> &BattleState {
        &self.state
    }

    /// Registers a transport endpoint; it stays unauthenticated until a
    /// valid hello arrives.
    pub fn connect(&mut self, sink: Box<dyn MessageSink>) -> EndpointId {
        let id = EndpointId::new(self.next_endpoint);
        self.next_endpoint += 1;
        self.endpoints.push(Endpoint {
            id,
            sink,
            auth: AuthState::Unauthenticated,
        });
        id
    }

    /// Closes and removes an endpoint; unknown ids are ignored.
    pub fn disconnect(&mut self, id: EndpointId) {
        if let Some(index) = self.endpoints.iter().position(|endpoint| endpoint.id == id) {
            let mut endpoint = self.endpoints.remove(index);
            endpoint.sink.close();
        }
    }

    /// Commits any due motions and broadcasts the resulting changes.
    ///
    /// Hosts call this periodically so replicas observe motion commits
    /// even while no commands arrive.
    pub fn poll(&mut self, now: Timestamp) -> Result<(), ServerError> {
        let mut events = Vec::new();
        self.state.resolve_due_motions(now, &mut events);
        self.flush(&events)
    }

    /// Processes one inbound message from `endpoint`.
    ///
    /// A malformed message, a wrong secret, or any pre-authentication
    /// message other than a hello terminates that endpoint only. Invalid
    /// but well-formed casts are silent no-ops; the client pre-checks and
    /// needs no rejection traffic.
    pub fn handle_message(
        &mut self,
        endpoint: EndpointId,
        text: &str,
        now: Timestamp,
    ) -> Result<(), ServerError> {
        let mut events = Vec::new();
        self.state.resolve_due_motions(now, &mut events);
        self.flush(&events)?;

        if !self.endpoints.iter().any(|entry| entry.id == endpoint) {
            return Err(ServerError::UnknownEndpoint(endpoint));
        }

        let message = match ClientMessage::decode(text) {
            Ok(message) => message,
            Err(error) => {
                warn!(endpoint = endpoint.get(), %error, "terminating endpoint on malformed message");
                self.disconnect(endpoint);
                return Ok(());
            }
        };

        let auth = self
            .endpoints
            .iter()
            .find(|entry| entry.id == endpoint)
            .map(|entry| entry.auth)
            .ok_or(ServerError::UnknownEndpoint(endpoint))?;

        match (auth, message) {
            (AuthState::Unauthenticated, ClientMessage::Hello { team, password }) => {
                if password == self.secret {
                    debug!(endpoint = endpoint.get(), team = %team, "endpoint authenticated");
                    self.authenticate(endpoint)?;
                } else {
                    warn!(endpoint = endpoint.get(), "terminating endpoint on bad secret");
                    self.disconnect(endpoint);
                }
                Ok(())
            }
            (AuthState::Unauthenticated, ClientMessage::CastSpell { .. }) => {
                warn!(
                    endpoint = endpoint.get(),
                    "terminating endpoint casting before authentication"
                );
                self.disconnect(endpoint);
                Ok(())
            }
            (AuthState::Authenticated, ClientMessage::Hello { .. }) => {
                debug!(endpoint = endpoint.get(), "ignoring repeated hello");
                Ok(())
            }
            (AuthState::Authenticated, ClientMessage::CastSpell { spell, target }) => {
                self.cast(endpoint, &spell, target, now)
            }
        }
    }

    /// Marks the endpoint authenticated and pushes the full state to it,
    /// in the order a rejoining client needs: graph, roster, turn queue.
    fn authenticate(&mut self, endpoint: EndpointId) -> Result<(), ServerError> {
        let hello = ServerMessage::Hello {
            nodes: self.state.graph().to_wire(),
        }
        .encode()?;
        // Corpses linger in the roster only so their terminal broadcast can
        // flush; a fresh endpoint must not see them, since the living may
        // have claimed their nodes since.
        let roster: Vec<CharacterId> = self
            .state
            .characters()
            .filter(|entry| entry.is_alive())
            .map(|entry| entry.id)
            .collect();
        let characters = ServerMessage::UpdateCharacters {
            characters: self.character_updates(&roster),
        }
        .encode()?;
        let queue = ServerMessage::UpdateTurnQueue {
            queue: self.state.turn_order(),
        }
        .encode()?;

        let Some(entry) = self
            .endpoints
            .iter_mut()
            .find(|entry| entry.id == endpoint)
        else {
            return Err(ServerError::UnknownEndpoint(endpoint));
        };
        entry.auth = AuthState::Authenticated;
        let delivered = entry
            .sink
            .send(&hello)
            .and_then(|()| entry.sink.send(&characters))
            .and_then(|()| entry.sink.send(&queue));
        if delivered.is_err() {
            warn!(endpoint = endpoint.get(), "dropping endpoint on failed state push");
            self.disconnect(endpoint);
        }
        Ok(())
    }

    /// Validates and applies a cast from an authenticated endpoint.
    ///
    /// The author is always the turn queue's active character, regardless
    /// of which endpoint sent the command.
    fn cast(
        &mut self,
        endpoint: EndpointId,
        spell: &str,
        target: Option<skirmish_core::NodeId>,
        now: Timestamp,
    ) -> Result<(), ServerError> {
        let Some(author) = self.state.active_character() else {
            debug!(endpoint = endpoint.get(), spell, "ignoring cast with an empty turn queue");
            return Ok(());
        };
        let Some(ability) = self.book.get(spell) else {
            return Err(ServerError::UnknownSpell(spell.to_string()));
        };
        let verdict = self.book.check(&self.state, author, spell, target, now)?;
        if verdict != CastCheck::Accepted {
            debug!(
                endpoint = endpoint.get(),
                spell,
                author = author.get(),
                ?verdict,
                "ignoring rejected cast"
            );
            return Ok(());
        }

        let mut events = vec![Event::AbilityCast {
            spell: spell.to_string(),
            author,
            target,
        }];
        ability.apply(&mut self.state, author, target, now, &mut events)?;
        self.flush(&events)
    }

    /// Maps mutation events onto wire broadcasts for every authenticated
    /// endpoint.
    fn flush(&mut self, events: &[Event]) -> Result<(), ServerError> {
        for event in events {
            let message = match event {
                Event::AbilityCast {
                    spell,
                    author,
                    target,
                } => ServerMessage::ShowCastedSpell {
                    spell: spell.clone(),
                    author: *author,
                    target: *target,
                },
                Event::RosterChanged { ids } => ServerMessage::UpdateCharacters {
                    characters: self.character_updates(ids),
                },
                Event::TurnQueueChanged => ServerMessage::UpdateTurnQueue {
                    queue: self.state.turn_order(),
                },
            };
            self.broadcast(&message)?;
        }
        Ok(())
    }

    fn character_updates(&self, ids: &[CharacterId]) -> Vec<CharacterUpdate> {
        ids.iter()
            .filter_map(|id| {
                let character = self.state.character(*id)?;
                let node = self.state.node_of(*id)?;
                let motion = self.state.motion(*id).map(|motion| MotionWire {
                    started_at: motion.started_at(),
                    path: motion.path().to_vec(),
                });
                Some(CharacterUpdate {
                    node,
                    character: character.clone(),
                    motion,
                })
            })
            .collect()
    }

    fn broadcast(&mut self, message: &ServerMessage) -> Result<(), ServerError> {
        let text = message.encode()?;
        let mut dropped = Vec::new();
        for endpoint in &mut self.endpoints {
            if endpoint.auth != AuthState::Authenticated {
                continue;
            }
            if endpoint.sink.send(&text).is_err() {
                warn!(endpoint = endpoint.id.get(), "dropping endpoint on failed send");
                dropped.push(endpoint.id);
            }
        }
        for id in dropped {
            self.disconnect(id);
        }
        Ok(())
    }
}

impl std::fmt::Debug for WorldServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldServer")
            .field("endpoints", &self.endpoints.len())
            .field("characters", &self.state.characters().count())
            .finish()
    }
}
