#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Battle state shared by the Skirmish server and its replicas.
//!
//! [`BattleState`] holds the field graph, the character roster, the
//! occupancy relation, outstanding motions, and the turn queue. The server
//! owns the authoritative copy and mutates it through the primitives below;
//! replicas hold mirrors rebuilt from broadcasts and reuse the same type so
//! both sides answer queries through one [`query`] surface. Mutations report
//! what changed by pushing [`Event`] values into a caller-provided vector.

use std::collections::{BTreeMap, VecDeque};

use skirmish_core::{Character, CharacterId, Event, NodeId, Timestamp};

pub mod field;
pub mod query;

pub use field::{FieldGraph, FieldNode};

/// Error raised when state and inputs disagree.
///
/// Every variant signals a configuration or data-integrity violation
/// between server and client; none is reachable through well-formed
/// command validation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    /// The node identifier is not part of the graph.
    #[error("unknown node {}", .0.get())]
    UnknownNode(NodeId),
    /// The character identifier is not part of the roster.
    #[error("unknown character {}", .0.get())]
    UnknownCharacter(CharacterId),
    /// A second character was placed onto an occupied node.
    #[error("node {} is already occupied", .0.get())]
    NodeOccupied(NodeId),
    /// The character has no recorded occupancy.
    #[error("character {} has no known occupancy", .0.get())]
    MissingOccupancy(CharacterId),
    /// An operation expected an occupant on an empty node.
    #[error("no occupant at node {}", .0.get())]
    VacantNode(NodeId),
    /// A wire graph failed structural validation.
    #[error("malformed graph: {0}")]
    MalformedGraph(String),
}

/// Ephemeral record of an in-progress traversal.
///
/// While present it supersedes the character's static occupancy for
/// display and query purposes; it is discarded when the final node is
/// committed. State at any instant derives from the timestamps alone,
/// never from a simulation tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Motion {
    started_at: Timestamp,
    path: Vec<NodeId>,
}

impl Motion {
    /// Creates a motion that began at `started_at` along `path`.
    #[must_use]
    pub const fn new(started_at: Timestamp, path: Vec<NodeId>) -> Self {
        Self { started_at, path }
    }

    /// Session timestamp at which the traversal began.
    #[must_use]
    pub const fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// Ordered node path, first entry being the origin.
    #[must_use]
    pub fn path(&self) -> &[NodeId] {
        &self.path
    }

    /// Final node of the path, if the path is non-empty.
    #[must_use]
    pub fn destination(&self) -> Option<NodeId> {
        self.path.last().copied()
    }

    /// Total traversal duration for a given per-step duration.
    #[must_use]
    pub fn total_duration_ms(&self, step_duration_ms: u64) -> u64 {
        (self.path.len().saturating_sub(1) as u64).saturating_mul(step_duration_ms.max(1))
    }
}

/// Complete battle state over one field graph.
#[derive(Clone, Debug, Default)]
pub struct BattleState {
    graph: FieldGraph,
    characters: BTreeMap<CharacterId, Character>,
    occupancy: BTreeMap<NodeId, CharacterId>,
    // Retains the last known node of dead characters until they are fully
    // removed, so their final broadcast still carries an occupancy.
    positions: BTreeMap<CharacterId, NodeId>,
    motions: BTreeMap<CharacterId, Motion>,
    queue: VecDeque<CharacterId>,
}

impl BattleState {
    /// Creates an empty state over the provided graph.
    #[must_use]
    pub fn empty(graph: FieldGraph) -> Self {
        Self {
            graph,
            characters: BTreeMap::new(),
            occupancy: BTreeMap::new(),
            positions: BTreeMap::new(),
            motions: BTreeMap::new(),
            queue: VecDeque::new(),
        }
    }

    /// Creates a state with the provided roster placed on the graph.
    ///
    /// The turn queue is built once, sorted ascending by initiative with
    /// identifier order breaking ties; afterwards it only rotates.
    pub fn with_roster(
        graph: FieldGraph,
        spawns: Vec<(Character, NodeId)>,
    ) -> Result<Self, WorldError> {
        let mut state = Self::empty(graph);
        for (character, node) in spawns {
            state.insert_character(character, node)?;
        }
        let mut order: Vec<CharacterId> = state.characters.keys().copied().collect();
        order.sort_by_key(|id| {
            let initiative = state
                .characters
                .get(id)
                .map_or(i32::MAX, |character| character.initiative);
            (initiative, *id)
        });
        state.queue = order.into();
        Ok(state)
    }

    /// The field graph this state lives on.
    #[must_use]
    pub const fn graph(&self) -> &FieldGraph {
        &self.graph
    }

    /// Character record for the provided identifier, if present.
    #[must_use]
    pub fn character(&self, id: CharacterId) -> Option<&Character> {
        self.characters.get(&id)
    }

    /// Mutable character record; replica merges and abilities go through it.
    #[must_use]
    pub fn character_mut(&mut self, id: CharacterId) -> Option<&mut Character> {
        self.characters.get_mut(&id)
    }

    /// All characters in identifier order.
    pub fn characters(&self) -> impl Iterator<Item = &Character> {
        self.characters.values()
    }

    /// Character occupying the provided node, if any.
    #[must_use]
    pub fn occupant(&self, node: NodeId) -> Option<CharacterId> {
        self.occupancy.get(&node).copied()
    }

    /// Node the character stands on (its last node, once dead).
    #[must_use]
    pub fn node_of(&self, id: CharacterId) -> Option<NodeId> {
        self.positions.get(&id).copied()
    }

    /// Outstanding motion for the character, if any.
    #[must_use]
    pub fn motion(&self, id: CharacterId) -> Option<&Motion> {
        self.motions.get(&id)
    }

    /// Character whose turn it currently is.
    #[must_use]
    pub fn active_character(&self) -> Option<CharacterId> {
        self.queue.front().copied()
    }

    /// The turn queue in order; index 0 is active.
    #[must_use]
    pub fn turn_order(&self) -> Vec<CharacterId> {
        self.queue.iter().copied().collect()
    }

    /// Places a new character on a free node.
    pub fn insert_character(
        &mut self,
        character: Character,
        node: NodeId,
    ) -> Result<(), WorldError> {
        if self.graph.node(node).is_none() {
            return Err(WorldError::UnknownNode(node));
        }
        if self.occupancy.contains_key(&node) {
            return Err(WorldError::NodeOccupied(node));
        }
        let id = character.id;
        let _ = self.characters.insert(id, character);
        let _ = self.occupancy.insert(node, id);
        let _ = self.positions.insert(id, node);
        Ok(())
    }

    /// Moves a character's occupancy to another node.
    pub fn relocate(&mut self, id: CharacterId, node: NodeId) -> Result<(), WorldError> {
        if self.graph.node(node).is_none() {
            return Err(WorldError::UnknownNode(node));
        }
        if !self.characters.contains_key(&id) {
            return Err(WorldError::UnknownCharacter(id));
        }
        if let Some(holder) = self.occupancy.get(&node) {
            if *holder != id {
                return Err(WorldError::NodeOccupied(node));
            }
        }
        if let Some(previous) = self.positions.insert(id, node) {
            if self.occupancy.get(&previous) == Some(&id) {
                let _ = self.occupancy.remove(&previous);
            }
        }
        let _ = self.occupancy.insert(node, id);
        Ok(())
    }

    /// Installs or clears a motion record; replica merges go through this.
    pub fn set_motion(&mut self, id: CharacterId, motion: Option<Motion>) {
        match motion {
            Some(motion) => {
                let _ = self.motions.insert(id, motion);
            }
            None => {
                let _ = self.motions.remove(&id);
            }
        }
    }

    /// Removes a character from every structure at once.
    pub fn remove_character(&mut self, id: CharacterId) {
        let _ = self.characters.remove(&id);
        let _ = self.motions.remove(&id);
        if let Some(node) = self.positions.remove(&id) {
            if self.occupancy.get(&node) == Some(&id) {
                let _ = self.occupancy.remove(&node);
            }
        }
        self.queue.retain(|entry| *entry != id);
    }

    /// Replaces the turn queue wholesale; replicas apply broadcasts here.
    pub fn replace_queue(&mut self, order: Vec<CharacterId>) -> Result<(), WorldError> {
        for id in &order {
            if !self.characters.contains_key(id) {
                return Err(WorldError::UnknownCharacter(*id));
            }
        }
        self.queue = order.into();
        Ok(())
    }

    /// Starts a move toward `destination` along the cheapest free path.
    ///
    /// The path is truncated so its step count never exceeds the mover's
    /// remaining move points, the consumed points are deducted immediately,
    /// and the motion is timestamped `now`. No reachable path or a zero
    /// step budget is a silent no-op. Callers gate on the mover resting;
    /// starting a second move while one is outstanding corrupts occupancy.
    pub fn begin_move(
        &mut self,
        id: CharacterId,
        destination: NodeId,
        now: Timestamp,
        out_events: &mut Vec<Event>,
    ) -> Result<(), WorldError> {
        let origin = self.node_of(id).ok_or(WorldError::MissingOccupancy(id))?;
        let Some(mut path) = query::path_search(self, origin, destination)? else {
            return Ok(());
        };
        let mover = self
            .characters
            .get_mut(&id)
            .ok_or(WorldError::UnknownCharacter(id))?;
        let steps = path.len().saturating_sub(1).min(mover.move_points as usize);
        if steps == 0 {
            return Ok(());
        }
        path.truncate(steps + 1);
        mover.move_points -= steps as u32;
        let _ = self.motions.insert(id, Motion::new(now, path));
        out_events.push(Event::RosterChanged { ids: vec![id] });
        Ok(())
    }

    /// Starts a direct two-node motion regardless of adjacency.
    ///
    /// Used by teleport-style effects; costs no move points. An occupied
    /// destination is a silent no-op, an unknown one a configuration error.
    pub fn begin_jump(
        &mut self,
        id: CharacterId,
        destination: NodeId,
        now: Timestamp,
        out_events: &mut Vec<Event>,
    ) -> Result<(), WorldError> {
        if self.graph.node(destination).is_none() {
            return Err(WorldError::UnknownNode(destination));
        }
        let origin = self.node_of(id).ok_or(WorldError::MissingOccupancy(id))?;
        if origin == destination || self.occupant(destination).is_some() {
            return Ok(());
        }
        let _ = self
            .motions
            .insert(id, Motion::new(now, vec![origin, destination]));
        out_events.push(Event::RosterChanged { ids: vec![id] });
        Ok(())
    }

    /// Commits every motion whose traversal time has fully elapsed.
    ///
    /// Runs at the top of command processing and from the host's poll, so
    /// commits serialize with commands instead of racing them. A committed
    /// character lands on its path's final node; if someone claimed that
    /// node in the meantime the character stays put and only the motion is
    /// discarded.
    pub fn resolve_due_motions(&mut self, now: Timestamp, out_events: &mut Vec<Event>) {
        let due: Vec<(CharacterId, Option<NodeId>)> = self
            .motions
            .iter()
            .filter(|(id, motion)| {
                let step = self
                    .characters
                    .get(id)
                    .map_or(1, |character| character.step_duration_ms);
                now.since(motion.started_at()) >= motion.total_duration_ms(step)
            })
            .map(|(id, motion)| (*id, motion.destination()))
            .collect();

        let mut committed = Vec::new();
        for (id, destination) in due {
            let _ = self.motions.remove(&id);
            if let Some(node) = destination {
                if self.occupant(node).is_none_or(|holder| holder == id) {
                    // Both maps were validated when the motion began.
                    if self.relocate(id, node).is_ok() {
                        committed.push(id);
                        continue;
                    }
                }
            }
            committed.push(id);
        }
        if !committed.is_empty() {
            out_events.push(Event::RosterChanged { ids: committed });
        }
    }

    /// Applies a batch of health deltas; positive damages, negative heals.
    ///
    /// Healing clamps at the target's cap; damage has no floor. A character
    /// whose health drops to zero or below is removed from the turn queue,
    /// occupancy, and motion table immediately, while the record itself
    /// stays in the roster so replicas observe the terminal health.
    pub fn apply_damage(
        &mut self,
        deltas: &[(CharacterId, i32)],
        out_events: &mut Vec<Event>,
    ) -> Result<(), WorldError> {
        let mut ids = Vec::with_capacity(deltas.len());
        for (id, delta) in deltas {
            let target = self
                .characters
                .get_mut(id)
                .ok_or(WorldError::UnknownCharacter(*id))?;
            target.health -= delta;
            if *delta < 0 && target.health > target.max_health {
                target.health = target.max_health;
            }
            ids.push(*id);
        }

        let mut queue_changed = false;
        for id in &ids {
            let alive = self
                .characters
                .get(id)
                .is_some_and(Character::is_alive);
            if alive {
                continue;
            }
            let _ = self.motions.remove(id);
            if let Some(node) = self.positions.get(id) {
                if self.occupancy.get(node) == Some(id) {
                    let _ = self.occupancy.remove(node);
                }
            }
            let length_before = self.queue.len();
            self.queue.retain(|entry| entry != id);
            if self.queue.len() != length_before {
                queue_changed = true;
            }
        }

        out_events.push(Event::RosterChanged { ids });
        if queue_changed {
            out_events.push(Event::TurnQueueChanged);
        }
        Ok(())
    }

    /// Ends the active character's turn.
    ///
    /// Refills its move points to the per-turn cap, decays its status
    /// effects by one turn, and rotates it to the tail of the queue. A
    /// no-op when the queue is empty.
    pub fn end_turn(&mut self, out_events: &mut Vec<Event>) -> Result<(), WorldError> {
        let Some(active) = self.queue.front().copied() else {
            return Ok(());
        };
        let character = self
            .characters
            .get_mut(&active)
            .ok_or(WorldError::UnknownCharacter(active))?;
        character.move_points = character.max_move_points;
        for effect in &mut character.effects {
            effect.duration = effect.duration.saturating_sub(1);
        }
        character.effects.retain(|effect| effect.duration > 0);
        let _ = self.queue.pop_front();
        self.queue.push_back(active);
        out_events.push(Event::RosterChanged { ids: vec![active] });
        out_events.push(Event::TurnQueueChanged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_core::{StatusEffect, Team};

    fn character(id: u32, initiative: i32) -> Character {
        Character {
            id: CharacterId::new(id),
            name: format!("fighter-{id}"),
            kind: "knight".to_string(),
            team: Team::new("azure"),
            max_move_points: 3,
            move_points: 3,
            max_action_points: 1,
            action_points: 1,
            health: 5,
            max_health: 5,
            step_duration_ms: 100,
            initiative,
            spells: vec!["move".to_string()],
            effects: Vec::new(),
        }
    }

    fn line_state(length: u32, spawns: &[(u32, u32, i32)]) -> BattleState {
        let graph = query::tests_support::line_graph(length);
        let roster = spawns
            .iter()
            .map(|&(id, node, initiative)| (character(id, initiative), NodeId::new(node)))
            .collect();
        BattleState::with_roster(graph, roster).expect("valid roster")
    }

    #[test]
    fn roster_queue_sorts_by_initiative_ascending() {
        let state = line_state(5, &[(1, 0, 9), (2, 2, 3), (3, 4, 6)]);
        let order: Vec<u32> = state.turn_order().iter().map(CharacterId::get).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn double_placement_is_an_error() {
        let graph = query::tests_support::line_graph(3);
        let result = BattleState::with_roster(
            graph,
            vec![
                (character(1, 1), NodeId::new(0)),
                (character(2, 2), NodeId::new(0)),
            ],
        );
        assert_eq!(result.err(), Some(WorldError::NodeOccupied(NodeId::new(0))));
    }

    #[test]
    fn begin_move_truncates_to_move_points() {
        let mut state = line_state(6, &[(1, 0, 1)]);
        let mut events = Vec::new();
        state
            .begin_move(
                CharacterId::new(1),
                NodeId::new(5),
                Timestamp::from_millis(0),
                &mut events,
            )
            .expect("move");

        let motion = state.motion(CharacterId::new(1)).expect("motion installed");
        assert_eq!(motion.path().len(), 4, "three steps plus the origin");
        assert_eq!(
            state.character(CharacterId::new(1)).expect("mover").move_points,
            0
        );
        assert_eq!(
            events,
            vec![Event::RosterChanged {
                ids: vec![CharacterId::new(1)]
            }]
        );
    }

    #[test]
    fn begin_move_without_path_is_a_no_op() {
        // 1 sits at node 0; 2 blocks node 1 on a line, so node 2 is
        // unreachable and no motion may be fabricated.
        let mut state = line_state(3, &[(1, 0, 1), (2, 1, 2)]);
        let mut events = Vec::new();
        state
            .begin_move(
                CharacterId::new(1),
                NodeId::new(2),
                Timestamp::from_millis(0),
                &mut events,
            )
            .expect("no-op");
        assert!(state.motion(CharacterId::new(1)).is_none());
        assert!(events.is_empty());
        assert_eq!(
            state.character(CharacterId::new(1)).expect("mover").move_points,
            3
        );
    }

    #[test]
    fn due_motion_commits_to_final_node() {
        let mut state = line_state(4, &[(1, 0, 1)]);
        let mut events = Vec::new();
        state
            .begin_move(
                CharacterId::new(1),
                NodeId::new(2),
                Timestamp::from_millis(1000),
                &mut events,
            )
            .expect("move");
        events.clear();

        // Two steps at 100ms per step.
        state.resolve_due_motions(Timestamp::from_millis(1100), &mut events);
        assert!(events.is_empty(), "motion not yet due");

        state.resolve_due_motions(Timestamp::from_millis(1200), &mut events);
        assert!(state.motion(CharacterId::new(1)).is_none());
        assert_eq!(state.node_of(CharacterId::new(1)), Some(NodeId::new(2)));
        assert_eq!(state.occupant(NodeId::new(2)), Some(CharacterId::new(1)));
        assert_eq!(state.occupant(NodeId::new(0)), None);
        assert_eq!(
            events,
            vec![Event::RosterChanged {
                ids: vec![CharacterId::new(1)]
            }]
        );
    }

    #[test]
    fn colliding_motion_commit_leaves_the_loser_in_place() {
        // Both movers race for node 2; character 1 commits first, so
        // character 2 keeps its origin occupancy and only its motion and
        // already-spent move points are gone.
        let mut state = line_state(5, &[(1, 0, 1), (2, 4, 2)]);
        let mut events = Vec::new();
        state
            .begin_move(
                CharacterId::new(1),
                NodeId::new(2),
                Timestamp::from_millis(0),
                &mut events,
            )
            .expect("first move");
        state
            .begin_move(
                CharacterId::new(2),
                NodeId::new(2),
                Timestamp::from_millis(0),
                &mut events,
            )
            .expect("second move");
        events.clear();

        state.resolve_due_motions(Timestamp::from_millis(200), &mut events);

        assert_eq!(state.occupant(NodeId::new(2)), Some(CharacterId::new(1)));
        assert_eq!(state.node_of(CharacterId::new(2)), Some(NodeId::new(4)));
        assert_eq!(state.occupant(NodeId::new(4)), Some(CharacterId::new(2)));
        assert!(state.motion(CharacterId::new(1)).is_none());
        assert!(state.motion(CharacterId::new(2)).is_none());
        assert_eq!(
            state.character(CharacterId::new(2)).expect("loser").move_points,
            1
        );
        assert_eq!(
            events,
            vec![Event::RosterChanged {
                ids: vec![CharacterId::new(1), CharacterId::new(2)]
            }],
            "both movers are rebroadcast so replicas settle on the outcome"
        );
    }

    #[test]
    fn lethal_damage_prunes_queue_and_occupancy_but_keeps_record() {
        let mut state = line_state(4, &[(1, 0, 1), (2, 2, 2)]);
        let mut events = Vec::new();
        state
            .apply_damage(&[(CharacterId::new(2), 5)], &mut events)
            .expect("damage");

        let corpse = state.character(CharacterId::new(2)).expect("record kept");
        assert_eq!(corpse.health, 0);
        assert!(!corpse.is_alive());
        assert_eq!(state.occupant(NodeId::new(2)), None);
        assert_eq!(state.node_of(CharacterId::new(2)), Some(NodeId::new(2)));
        let order: Vec<u32> = state.turn_order().iter().map(CharacterId::get).collect();
        assert_eq!(order, vec![1]);
        assert!(events.contains(&Event::TurnQueueChanged));
    }

    #[test]
    fn healing_clamps_at_max_health() {
        let mut state = line_state(3, &[(1, 0, 1)]);
        let mut events = Vec::new();
        state
            .apply_damage(&[(CharacterId::new(1), 2)], &mut events)
            .expect("damage");
        state
            .apply_damage(&[(CharacterId::new(1), -10)], &mut events)
            .expect("heal");
        assert_eq!(state.character(CharacterId::new(1)).expect("target").health, 5);
    }

    #[test]
    fn end_turn_rotates_refills_and_decays_effects() {
        let mut state = line_state(5, &[(1, 0, 1), (2, 2, 2)]);
        {
            let active = state.character_mut(CharacterId::new(1)).expect("active");
            active.move_points = 0;
            active.effects = vec![
                StatusEffect {
                    title: "scorched".to_string(),
                    duration: 2,
                },
                StatusEffect {
                    title: "blessed".to_string(),
                    duration: 1,
                },
            ];
        }
        let mut events = Vec::new();
        state.end_turn(&mut events).expect("end turn");

        let order: Vec<u32> = state.turn_order().iter().map(CharacterId::get).collect();
        assert_eq!(order, vec![2, 1]);
        let rested = state.character(CharacterId::new(1)).expect("rested");
        assert_eq!(rested.move_points, rested.max_move_points);
        assert_eq!(rested.effects.len(), 1);
        assert_eq!(rested.effects[0].title, "scorched");
        assert_eq!(rested.effects[0].duration, 1);
        assert!(events.contains(&Event::TurnQueueChanged));
    }
}
