//! Read-only query surface shared by the server and its replicas.
//!
//! Everything here is a pure function of the provided state (and, where
//! time matters, an explicit `now`), so queries may run freely between
//! mutations and yield identical answers for identical inputs.

use std::collections::VecDeque;

use skirmish_core::{CharacterId, NodeId, Timestamp};

use crate::{BattleState, WorldError};

/// Instantaneous display state of a character.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CharacterState {
    /// Mid-traversal between two nodes of a motion path.
    Moving {
        /// Node the current step leaves.
        from: NodeId,
        /// Node the current step enters.
        to: NodeId,
        /// Normalized progress through the step, in `[0, 1)`.
        phase: f64,
    },
    /// Standing on a node with no motion in progress.
    Resting {
        /// The occupied node.
        node: NodeId,
    },
}

/// Breadth-first search over adjacency, bounded by a hop radius.
///
/// The origin is always part of the result. Nodes occupied by a character
/// are excluded from discovery and expansion unless `include_occupied` is
/// set. The result is in discovery order, which follows adjacency-list
/// order among equidistant nodes; callers must rely on set membership
/// only, not on the ordering.
pub fn area_search(
    state: &BattleState,
    origin: NodeId,
    radius: u32,
    include_occupied: bool,
) -> Result<Vec<NodeId>, WorldError> {
    let graph = state.graph();
    if graph.node(origin).is_none() {
        return Err(WorldError::UnknownNode(origin));
    }

    let mut visited = vec![false; graph.len()];
    visited[origin.index()] = true;
    let mut discovered = vec![origin];
    let mut frontier = vec![origin];

    for _hop in 0..radius {
        let mut next = Vec::new();
        for node in frontier {
            let current = graph.node(node).ok_or(WorldError::UnknownNode(node))?;
            for &neighbor in current.neighbors() {
                if visited[neighbor.index()] {
                    continue;
                }
                visited[neighbor.index()] = true;
                if !include_occupied && state.occupant(neighbor).is_some() {
                    continue;
                }
                discovered.push(neighbor);
                next.push(neighbor);
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    Ok(discovered)
}

/// Shortest path from `origin` to `destination` over free nodes.
///
/// Any node occupied by a character is impassable (the origin itself is
/// exempt), so an occupied destination is unreachable. Returns `None`
/// when no path exists; a spurious partial path is never fabricated.
pub fn path_search(
    state: &BattleState,
    origin: NodeId,
    destination: NodeId,
) -> Result<Option<Vec<NodeId>>, WorldError> {
    let graph = state.graph();
    if graph.node(origin).is_none() {
        return Err(WorldError::UnknownNode(origin));
    }
    if graph.node(destination).is_none() {
        return Err(WorldError::UnknownNode(destination));
    }
    if origin == destination {
        return Ok(Some(vec![origin]));
    }

    let mut visited = vec![false; graph.len()];
    visited[origin.index()] = true;
    let mut parents: Vec<Option<NodeId>> = vec![None; graph.len()];
    let mut queue = VecDeque::from([origin]);

    while let Some(node) = queue.pop_front() {
        let current = graph.node(node).ok_or(WorldError::UnknownNode(node))?;
        for &neighbor in current.neighbors() {
            if visited[neighbor.index()] {
                continue;
            }
            visited[neighbor.index()] = true;
            if state.occupant(neighbor).is_some() {
                continue;
            }
            parents[neighbor.index()] = Some(node);
            if neighbor == destination {
                let mut path = vec![destination];
                let mut cursor = destination;
                while let Some(parent) = parents[cursor.index()] {
                    path.push(parent);
                    cursor = parent;
                }
                path.reverse();
                return Ok(Some(path));
            }
            queue.push_back(neighbor);
        }
    }

    Ok(None)
}

/// Time-derived display state of a character.
///
/// While a motion is outstanding and unfinished the character is moving
/// between two path nodes with a normalized phase; an overdue motion whose
/// commit has not yet been observed reports resting at the path's final
/// node, so replicas never snap a mover back to its origin between
/// broadcasts. Derived fresh from `now` on every call, never cached.
pub fn character_state(
    state: &BattleState,
    id: CharacterId,
    now: Timestamp,
) -> Result<CharacterState, WorldError> {
    let character = state
        .character(id)
        .ok_or(WorldError::UnknownCharacter(id))?;

    if let Some(motion) = state.motion(id) {
        let step = character.step_duration_ms.max(1);
        let total = motion.total_duration_ms(step);
        let elapsed = now.since(motion.started_at());
        let path = motion.path();
        if elapsed < total && path.len() >= 2 {
            let index = (elapsed / step) as usize;
            let phase = (elapsed % step) as f64 / step as f64;
            return Ok(CharacterState::Moving {
                from: path[index],
                to: path[index + 1],
                phase,
            });
        }
        if let Some(last) = motion.destination() {
            return Ok(CharacterState::Resting { node: last });
        }
    }

    state
        .node_of(id)
        .map(|node| CharacterState::Resting { node })
        .ok_or(WorldError::MissingOccupancy(id))
}

#[cfg(test)]
pub(crate) mod tests_support {
    use skirmish_core::protocol::NodeWire;
    use skirmish_core::NodeId;

    use crate::FieldGraph;

    /// Straight line of unit squares: node `i` is adjacent to `i - 1` and
    /// `i + 1`. Small enough to reason about blocked-path scenarios by hand.
    pub(crate) fn line_graph(length: u32) -> FieldGraph {
        let wires: Vec<NodeWire> = (0..length)
            .map(|index| {
                let x = f64::from(index);
                let mut nodes = Vec::new();
                if index > 0 {
                    nodes.push(NodeId::new(index - 1));
                }
                if index + 1 < length {
                    nodes.push(NodeId::new(index + 1));
                }
                NodeWire {
                    id: NodeId::new(index),
                    points: vec![[x, 0.0], [x + 1.0, 0.0], [x + 1.0, 1.0], [x, 1.0]],
                    nodes,
                }
            })
            .collect();
        FieldGraph::from_wire(&wires).expect("line graph is well-formed")
    }
}
