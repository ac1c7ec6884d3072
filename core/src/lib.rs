#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Skirmish engine.
//!
//! This crate defines the surface that connects the authoritative world
//! server, its replica clients, and the ability system: stable identifiers,
//! the mutable [`Character`] record, the internal [`Event`] set emitted by
//! world mutations, the JSON wire [`protocol`], and the [`transport`]
//! contract that carries it. Everything here is plain data; behaviour lives
//! in the `world`, `abilities`, `server`, and `client` crates.

use serde::{Deserialize, Serialize};

pub mod protocol;
pub mod transport;

/// Unique identifier assigned to a field node.
///
/// Node identifiers are dense: a generated graph numbers its nodes
/// `0..len` in creation order, and the wire carries the same values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    /// Creates a new node identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Index form used by dense per-node bookkeeping.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Unique identifier assigned to a character.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharacterId(u32);

impl CharacterId {
    /// Creates a new character identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Team tag shared by allied characters.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Team(String);

impl Team {
    /// Creates a team tag from the provided name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrowed form of the team name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Milliseconds elapsed since the start of the session.
///
/// All time-derived state is a pure function of an explicit `now` argument;
/// nothing in the engine reads a wall clock on its own. Host loops sample
/// time once and thread the value through queries and mutations.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp from a millisecond count.
    #[must_use]
    pub const fn from_millis(value: u64) -> Self {
        Self(value)
    }

    /// Millisecond count carried by the timestamp.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Milliseconds elapsed since `earlier`, saturating at zero.
    #[must_use]
    pub const fn since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Timestamp advanced by the provided number of milliseconds.
    #[must_use]
    pub const fn plus_millis(&self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }
}

/// Timed status effect attached to a character.
///
/// `duration` counts the owner's remaining turns; it is decremented when the
/// owner ends its turn and the effect is dropped once it reaches zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEffect {
    /// Name of the effect, unique per character.
    pub title: String,
    /// Owner turns remaining before the effect expires.
    pub duration: u32,
}

/// Mutable record describing a single combatant.
///
/// The authoritative copy lives in the server's battle state; replicas hold
/// mirrors keyed by [`CharacterId`] and merge incoming fields in place so
/// that id-holding UI code stays valid across updates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    /// Stable identity shared between server and replicas.
    pub id: CharacterId,
    /// Display name.
    pub name: String,
    /// Visual-type tag consumed by presentation layers.
    pub kind: String,
    /// Team the character fights for.
    pub team: Team,
    /// Per-turn movement budget.
    pub max_move_points: u32,
    /// Movement points remaining this turn.
    pub move_points: u32,
    /// Per-turn action budget.
    pub max_action_points: u32,
    /// Action points remaining this turn.
    pub action_points: u32,
    /// Current hit points; zero or below means dead.
    pub health: i32,
    /// Hit point cap that healing never exceeds.
    pub max_health: i32,
    /// Wall-clock duration of a single movement step, in milliseconds.
    pub step_duration_ms: u64,
    /// Initiative used once for the initial turn ordering.
    pub initiative: i32,
    /// Titles of the abilities the character knows, in display order.
    pub spells: Vec<String>,
    /// Active timed status effects.
    pub effects: Vec<StatusEffect>,
}

impl Character {
    /// Reports whether the character still counts as alive.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.health > 0
    }

    /// Reports whether the character knows the ability with this title.
    #[must_use]
    pub fn knows_spell(&self, title: &str) -> bool {
        self.spells.iter().any(|known| known == title)
    }
}

/// Events emitted by world mutations.
///
/// The server maps these onto wire broadcasts; tests and systems observe
/// them directly, keeping mutation code free of transport concerns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// An accepted ability cast, announced before its effect is applied.
    AbilityCast {
        /// Title of the ability that was cast.
        spell: String,
        /// Character the cast is attributed to.
        author: CharacterId,
        /// Chosen target node for targeted abilities.
        target: Option<NodeId>,
    },
    /// The listed characters changed and replicas need fresh records.
    RosterChanged {
        /// Characters whose record, occupancy, or motion changed.
        ids: Vec<CharacterId>,
    },
    /// The turn queue changed membership or rotated.
    TurnQueueChanged,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_since_saturates() {
        let early = Timestamp::from_millis(100);
        let late = Timestamp::from_millis(450);
        assert_eq!(late.since(early), 350);
        assert_eq!(early.since(late), 0);
    }

    #[test]
    fn knows_spell_matches_exact_title() {
        let character = sample_character();
        assert!(character.knows_spell("kick"));
        assert!(!character.knows_spell("bomb"));
    }

    #[test]
    fn zero_health_is_dead() {
        let mut character = sample_character();
        character.health = 0;
        assert!(!character.is_alive());
        character.health = -2;
        assert!(!character.is_alive());
    }

    fn sample_character() -> Character {
        Character {
            id: CharacterId::new(7),
            name: "Brann".to_string(),
            kind: "knight".to_string(),
            team: Team::new("azure"),
            max_move_points: 3,
            move_points: 3,
            max_action_points: 1,
            action_points: 1,
            health: 10,
            max_health: 10,
            step_duration_ms: 300,
            initiative: 4,
            spells: vec!["end-turn".to_string(), "kick".to_string()],
            effects: Vec::new(),
        }
    }
}
