#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! The closed ability set and its title registry.
//!
//! Every combat action travels through one of the six statically
//! registered [`Ability`] behaviors. The server resolves casts through an
//! [`AbilityBook`] and validates them with [`AbilityBook::check`]; the
//! client runs the identical check before sending, so a rejected cast
//! never leaves the machine in the common case while the server stays
//! authoritative.

use std::collections::BTreeMap;

use skirmish_core::{CharacterId, Event, NodeId, StatusEffect, Timestamp};
use skirmish_world::query::{self, CharacterState};
use skirmish_world::{BattleState, WorldError};

/// Effect title stamped onto bomb victims.
pub const SCORCHED: &str = "scorched";
/// Turns a fresh scorch lasts, counted in the victim's own turns.
pub const SCORCHED_TURNS: u32 = 2;

/// A single data-driven combat action.
///
/// Implementations are immutable and registered once at startup; all
/// battle state flows through the arguments.
pub trait Ability {
    /// Unique registry key, also the wire `spell` string.
    fn title(&self) -> &'static str;

    /// Whether the caster may cast this ability right now.
    fn allowed(
        &self,
        state: &BattleState,
        caster: CharacterId,
        now: Timestamp,
    ) -> Result<bool, WorldError>;

    /// Legal target nodes, or `None` for untargeted abilities.
    fn target_area(
        &self,
        state: &BattleState,
        caster: CharacterId,
    ) -> Result<Option<Vec<NodeId>>, WorldError>;

    /// Nodes affected by a cast at `target`; defaults to the target alone.
    fn affected_area(
        &self,
        _state: &BattleState,
        _caster: CharacterId,
        target: NodeId,
    ) -> Result<Vec<NodeId>, WorldError> {
        Ok(vec![target])
    }

    /// Applies the effect. Callers have already validated the cast; a
    /// missing target on a targeted ability is a silent no-op.
    fn apply(
        &self,
        state: &mut BattleState,
        caster: CharacterId,
        target: Option<NodeId>,
        now: Timestamp,
        out_events: &mut Vec<Event>,
    ) -> Result<(), WorldError>;
}

/// Verdict of [`AbilityBook::check`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastCheck {
    /// The cast is valid and may be applied.
    Accepted,
    /// No registered ability carries this title.
    UnknownSpell,
    /// The caster does not know the spell or its allowance fails.
    NotAllowed,
    /// The ability is targeted and the target is missing or illegal.
    BadTarget,
}

/// Title-keyed registry of the fixed ability set.
pub struct AbilityBook {
    abilities: BTreeMap<&'static str, Box<dyn Ability>>,
}

impl AbilityBook {
    /// Builds the standard six-ability registry.
    #[must_use]
    pub fn standard() -> Self {
        let entries: Vec<Box<dyn Ability>> = vec![
            Box::new(EndTurn),
            Box::new(Move),
            Box::new(Kick),
            Box::new(Bomb),
            Box::new(Heal),
            Box::new(Teleport),
        ];
        let mut abilities = BTreeMap::new();
        for ability in entries {
            let _ = abilities.insert(ability.title(), ability);
        }
        Self { abilities }
    }

    /// Behavior registered under `title`, if any.
    #[must_use]
    pub fn get(&self, title: &str) -> Option<&dyn Ability> {
        self.abilities.get(title).map(Box::as_ref)
    }

    /// Registered titles in sorted order.
    #[must_use]
    pub fn titles(&self) -> Vec<&'static str> {
        self.abilities.keys().copied().collect()
    }

    /// Full cast validation, shared verbatim by server and client.
    ///
    /// The caster must know the spell, the allowance predicate must pass,
    /// and a targeted ability needs a target inside its target area. An
    /// untargeted ability ignores any supplied target.
    pub fn check(
        &self,
        state: &BattleState,
        caster: CharacterId,
        spell: &str,
        target: Option<NodeId>,
        now: Timestamp,
    ) -> Result<CastCheck, WorldError> {
        let Some(ability) = self.get(spell) else {
            return Ok(CastCheck::UnknownSpell);
        };
        let character = state
            .character(caster)
            .ok_or(WorldError::UnknownCharacter(caster))?;
        if !character.knows_spell(spell) {
            return Ok(CastCheck::NotAllowed);
        }
        if !ability.allowed(state, caster, now)? {
            return Ok(CastCheck::NotAllowed);
        }
        match ability.target_area(state, caster)? {
            None => Ok(CastCheck::Accepted),
            Some(area) => match target {
                Some(node) if area.contains(&node) => Ok(CastCheck::Accepted),
                _ => Ok(CastCheck::BadTarget),
            },
        }
    }
}

impl Default for AbilityBook {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for AbilityBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbilityBook")
            .field("titles", &self.titles())
            .finish()
    }
}

fn resting(
    state: &BattleState,
    caster: CharacterId,
    now: Timestamp,
) -> Result<bool, WorldError> {
    Ok(matches!(
        query::character_state(state, caster, now)?,
        CharacterState::Resting { .. }
    ))
}

fn has_action_point(state: &BattleState, caster: CharacterId) -> Result<bool, WorldError> {
    state
        .character(caster)
        .map(|character| character.action_points >= 1)
        .ok_or(WorldError::UnknownCharacter(caster))
}

fn spend_action_point(
    state: &mut BattleState,
    caster: CharacterId,
    out_events: &mut Vec<Event>,
) -> Result<(), WorldError> {
    let character = state
        .character_mut(caster)
        .ok_or(WorldError::UnknownCharacter(caster))?;
    character.action_points = character.action_points.saturating_sub(1);
    out_events.push(Event::RosterChanged { ids: vec![caster] });
    Ok(())
}

fn origin_of(state: &BattleState, caster: CharacterId) -> Result<NodeId, WorldError> {
    state
        .node_of(caster)
        .ok_or(WorldError::MissingOccupancy(caster))
}

struct EndTurn;

impl Ability for EndTurn {
    fn title(&self) -> &'static str {
        "end-turn"
    }

    fn allowed(
        &self,
        _state: &BattleState,
        _caster: CharacterId,
        _now: Timestamp,
    ) -> Result<bool, WorldError> {
        Ok(true)
    }

    fn target_area(
        &self,
        _state: &BattleState,
        _caster: CharacterId,
    ) -> Result<Option<Vec<NodeId>>, WorldError> {
        Ok(None)
    }

    fn apply(
        &self,
        state: &mut BattleState,
        _caster: CharacterId,
        _target: Option<NodeId>,
        _now: Timestamp,
        out_events: &mut Vec<Event>,
    ) -> Result<(), WorldError> {
        state.end_turn(out_events)
    }
}

struct Move;

impl Ability for Move {
    fn title(&self) -> &'static str {
        "move"
    }

    fn allowed(
        &self,
        state: &BattleState,
        caster: CharacterId,
        now: Timestamp,
    ) -> Result<bool, WorldError> {
        let points = state
            .character(caster)
            .map(|character| character.move_points)
            .ok_or(WorldError::UnknownCharacter(caster))?;
        Ok(points > 0 && resting(state, caster, now)?)
    }

    fn target_area(
        &self,
        state: &BattleState,
        caster: CharacterId,
    ) -> Result<Option<Vec<NodeId>>, WorldError> {
        let origin = origin_of(state, caster)?;
        let radius = state
            .character(caster)
            .map(|character| character.move_points)
            .ok_or(WorldError::UnknownCharacter(caster))?;
        let mut area = query::area_search(state, origin, radius, false)?;
        area.retain(|node| *node != origin);
        Ok(Some(area))
    }

    fn apply(
        &self,
        state: &mut BattleState,
        caster: CharacterId,
        target: Option<NodeId>,
        now: Timestamp,
        out_events: &mut Vec<Event>,
    ) -> Result<(), WorldError> {
        let Some(destination) = target else {
            return Ok(());
        };
        state.begin_move(caster, destination, now, out_events)
    }
}

struct Kick;

impl Ability for Kick {
    fn title(&self) -> &'static str {
        "kick"
    }

    fn allowed(
        &self,
        state: &BattleState,
        caster: CharacterId,
        now: Timestamp,
    ) -> Result<bool, WorldError> {
        Ok(has_action_point(state, caster)? && resting(state, caster, now)?)
    }

    fn target_area(
        &self,
        state: &BattleState,
        caster: CharacterId,
    ) -> Result<Option<Vec<NodeId>>, WorldError> {
        let origin = origin_of(state, caster)?;
        let mut area = query::area_search(state, origin, 1, true)?;
        area.retain(|node| *node != origin && state.occupant(*node).is_some());
        Ok(Some(area))
    }

    fn apply(
        &self,
        state: &mut BattleState,
        caster: CharacterId,
        target: Option<NodeId>,
        _now: Timestamp,
        out_events: &mut Vec<Event>,
    ) -> Result<(), WorldError> {
        let Some(node) = target else {
            return Ok(());
        };
        let victim = state.occupant(node).ok_or(WorldError::VacantNode(node))?;
        spend_action_point(state, caster, out_events)?;
        state.apply_damage(&[(victim, 1)], out_events)
    }
}

struct Bomb;

impl Bomb {
    const RANGE: u32 = 3;
    const SPLASH: u32 = 1;
}

impl Ability for Bomb {
    fn title(&self) -> &'static str {
        "bomb"
    }

    fn allowed(
        &self,
        state: &BattleState,
        caster: CharacterId,
        now: Timestamp,
    ) -> Result<bool, WorldError> {
        Ok(has_action_point(state, caster)? && resting(state, caster, now)?)
    }

    fn target_area(
        &self,
        state: &BattleState,
        caster: CharacterId,
    ) -> Result<Option<Vec<NodeId>>, WorldError> {
        let origin = origin_of(state, caster)?;
        query::area_search(state, origin, Self::RANGE, true).map(Some)
    }

    fn affected_area(
        &self,
        state: &BattleState,
        _caster: CharacterId,
        target: NodeId,
    ) -> Result<Vec<NodeId>, WorldError> {
        query::area_search(state, target, Self::SPLASH, true)
    }

    fn apply(
        &self,
        state: &mut BattleState,
        caster: CharacterId,
        target: Option<NodeId>,
        _now: Timestamp,
        out_events: &mut Vec<Event>,
    ) -> Result<(), WorldError> {
        let Some(node) = target else {
            return Ok(());
        };
        let victims: Vec<CharacterId> = self
            .affected_area(state, caster, node)?
            .into_iter()
            .filter_map(|affected| state.occupant(affected))
            .collect();
        spend_action_point(state, caster, out_events)?;
        for victim in &victims {
            let character = state
                .character_mut(*victim)
                .ok_or(WorldError::UnknownCharacter(*victim))?;
            match character
                .effects
                .iter_mut()
                .find(|effect| effect.title == SCORCHED)
            {
                Some(effect) => effect.duration = SCORCHED_TURNS,
                None => character.effects.push(StatusEffect {
                    title: SCORCHED.to_string(),
                    duration: SCORCHED_TURNS,
                }),
            }
        }
        let deltas: Vec<(CharacterId, i32)> =
            victims.into_iter().map(|victim| (victim, 1)).collect();
        if deltas.is_empty() {
            return Ok(());
        }
        state.apply_damage(&deltas, out_events)
    }
}

struct Heal;

impl Heal {
    const RANGE: u32 = 2;
    const RESTORED: i32 = 2;
}

impl Ability for Heal {
    fn title(&self) -> &'static str {
        "heal"
    }

    fn allowed(
        &self,
        state: &BattleState,
        caster: CharacterId,
        now: Timestamp,
    ) -> Result<bool, WorldError> {
        Ok(has_action_point(state, caster)? && resting(state, caster, now)?)
    }

    fn target_area(
        &self,
        state: &BattleState,
        caster: CharacterId,
    ) -> Result<Option<Vec<NodeId>>, WorldError> {
        let origin = origin_of(state, caster)?;
        let mut area = query::area_search(state, origin, Self::RANGE, true)?;
        area.retain(|node| state.occupant(*node).is_some());
        Ok(Some(area))
    }

    fn apply(
        &self,
        state: &mut BattleState,
        caster: CharacterId,
        target: Option<NodeId>,
        _now: Timestamp,
        out_events: &mut Vec<Event>,
    ) -> Result<(), WorldError> {
        let Some(node) = target else {
            return Ok(());
        };
        let patient = state.occupant(node).ok_or(WorldError::VacantNode(node))?;
        spend_action_point(state, caster, out_events)?;
        state.apply_damage(&[(patient, -Self::RESTORED)], out_events)
    }
}

struct Teleport;

impl Teleport {
    const RANGE: u32 = 4;
}

impl Ability for Teleport {
    fn title(&self) -> &'static str {
        "teleport"
    }

    fn allowed(
        &self,
        state: &BattleState,
        caster: CharacterId,
        now: Timestamp,
    ) -> Result<bool, WorldError> {
        Ok(has_action_point(state, caster)? && resting(state, caster, now)?)
    }

    fn target_area(
        &self,
        state: &BattleState,
        caster: CharacterId,
    ) -> Result<Option<Vec<NodeId>>, WorldError> {
        let origin = origin_of(state, caster)?;
        let mut area = query::area_search(state, origin, Self::RANGE, false)?;
        area.retain(|node| *node != origin);
        Ok(Some(area))
    }

    fn apply(
        &self,
        state: &mut BattleState,
        caster: CharacterId,
        target: Option<NodeId>,
        now: Timestamp,
        out_events: &mut Vec<Event>,
    ) -> Result<(), WorldError> {
        let Some(destination) = target else {
            return Ok(());
        };
        spend_action_point(state, caster, out_events)?;
        state.begin_jump(caster, destination, now, out_events)
    }
}
