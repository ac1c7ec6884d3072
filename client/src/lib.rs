#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Passive replica of the battle state.
//!
//! [`WorldClient`] mirrors the server's [`BattleState`] from pushed
//! messages and exposes the same query surface, so UIs and bots read the
//! replica exactly the way the server reads its canonical copy. It never
//! mutates on its own: every change arrives over the wire, and outbound
//! casts are best-effort sends that the server re-validates.

use tracing::warn;

use skirmish_core::protocol::{ClientMessage, ProtocolError, ServerMessage};
use skirmish_core::transport::{MessageSink, TransportError};
use skirmish_core::{CharacterId, NodeId, Timestamp};
use skirmish_system_abilities::{AbilityBook, CastCheck};
use skirmish_world::{BattleState, FieldGraph, Motion, WorldError};

/// Errors surfaced to the embedding UI or bot.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No snapshot has been received yet.
    #[error("no world snapshot received yet")]
    NotConnected,
    /// A wire message could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The transport refused a send.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Replica state and a pushed message disagree structurally.
    #[error(transparent)]
    World(#[from] WorldError),
}

/// Observation queued for the embedding UI or bot to drain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    /// The turn queue changed; `active` is its new head.
    TurnChanged {
        /// Character whose turn it now is.
        active: Option<CharacterId>,
    },
    /// The server accepted an ability cast somewhere in the world.
    SpellCast {
        /// Title of the cast ability.
        spell: String,
        /// Character the cast is attributed to.
        author: CharacterId,
        /// Chosen target node, if any.
        target: Option<NodeId>,
    },
}

/// Replica endpoint over one transport sink.
pub struct WorldClient<S: MessageSink> {
    sink: S,
    book: AbilityBook,
    state: Option<BattleState>,
    notices: Vec<Notice>,
}

impl<S: MessageSink> WorldClient<S> {
    /// Creates a replica that will speak through `sink`.
    #[must_use]
    pub fn new(sink: S, book: AbilityBook) -> Self {
        Self {
            sink,
            book,
            state: None,
            notices: Vec::new(),
        }
    }

    /// Sends the authentication handshake.
    pub fn hello(&mut self, team: &str, password: &str) -> Result<(), ClientError> {
        let text = ClientMessage::Hello {
            team: team.to_string(),
            password: password.to_string(),
        }
        .encode()?;
        self.sink.send(&text)?;
        Ok(())
    }

    /// The mirrored state, once the graph snapshot has arrived.
    #[must_use]
    pub fn state(&self) -> Option<&BattleState> {
        self.state.as_ref()
    }

    /// The underlying transport, for hosts that also read from it.
    #[must_use]
    pub fn transport(&self) -> &S {
        &self.sink
    }

    /// Drains the queued notices in arrival order.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Applies one pushed server message to the replica.
    pub fn handle_message(&mut self, text: &str) -> Result<(), ClientError> {
        match ServerMessage::decode(text)? {
            ServerMessage::Hello { nodes } => {
                let graph = FieldGraph::from_wire(&nodes)?;
                self.state = Some(BattleState::empty(graph));
                Ok(())
            }
            ServerMessage::UpdateCharacters { characters } => {
                let state = self.state.as_mut().ok_or(ClientError::NotConnected)?;
                for update in characters {
                    let id = update.character.id;
                    // A dead entry is pruned without ever touching occupancy;
                    // its node may legitimately hold a living character by now.
                    if !update.character.is_alive() {
                        state.remove_character(id);
                        continue;
                    }
                    if state.character(id).is_some() {
                        // Merge in place; external holders keep the id and
                        // observe the new fields on their next lookup.
                        if let Some(existing) = state.character_mut(id) {
                            *existing = update.character;
                        }
                        state.relocate(id, update.node)?;
                    } else {
                        state.insert_character(update.character, update.node)?;
                    }
                    state.set_motion(
                        id,
                        update
                            .motion
                            .map(|wire| Motion::new(wire.started_at, wire.path)),
                    );
                }
                Ok(())
            }
            ServerMessage::UpdateTurnQueue { queue } => {
                let state = self.state.as_mut().ok_or(ClientError::NotConnected)?;
                state.replace_queue(queue)?;
                self.notices.push(Notice::TurnChanged {
                    active: state.active_character(),
                });
                Ok(())
            }
            ServerMessage::ShowCastedSpell {
                spell,
                author,
                target,
            } => {
                let known = self
                    .state
                    .as_ref()
                    .is_some_and(|state| state.character(author).is_some());
                if !known {
                    warn!(spell = %spell, author = author.get(), "dropping cast notice for unknown author");
                    return Ok(());
                }
                self.notices.push(Notice::SpellCast {
                    spell,
                    author,
                    target,
                });
                Ok(())
            }
        }
    }

    /// Pre-checks and sends a cast request for the active character.
    ///
    /// The check is the same one the server runs, purely to save a round
    /// trip on casts that would be rejected anyway; an accepted send still
    /// carries no guarantee until the server broadcasts the effect.
    pub fn cast(
        &mut self,
        spell: &str,
        target: Option<NodeId>,
        now: Timestamp,
    ) -> Result<CastCheck, ClientError> {
        let state = self.state.as_ref().ok_or(ClientError::NotConnected)?;
        let Some(author) = state.active_character() else {
            return Ok(CastCheck::NotAllowed);
        };
        let verdict = self.book.check(state, author, spell, target, now)?;
        if verdict != CastCheck::Accepted {
            return Ok(verdict);
        }
        let text = ClientMessage::CastSpell {
            spell: spell.to_string(),
            target,
        }
        .encode()?;
        self.sink.send(&text)?;
        Ok(verdict)
    }
}

impl<S: MessageSink> std::fmt::Debug for WorldClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldClient")
            .field("connected", &self.state.is_some())
            .field("pending_notices", &self.notices.len())
            .finish()
    }
}
