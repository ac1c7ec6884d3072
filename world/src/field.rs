//! Spatial field graph: convex polygonal cells linked by shared edges.

use std::collections::BTreeMap;

use skirmish_core::protocol::NodeWire;
use skirmish_core::NodeId;

use crate::WorldError;

/// Tolerance for treating two coordinates as equal during edge matching.
const EDGE_EPSILON: f64 = 0.01;

/// Immutable convex cell of the battlefield graph.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldNode {
    id: NodeId,
    points: Vec<[f64; 2]>,
    centroid: [f64; 2],
    neighbors: Vec<NodeId>,
}

impl FieldNode {
    /// Stable identifier of the node.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Ordered polygon vertices.
    #[must_use]
    pub fn points(&self) -> &[[f64; 2]] {
        &self.points
    }

    /// Vertex average, recomputed after any coordinate transform.
    #[must_use]
    pub const fn centroid(&self) -> [f64; 2] {
        self.centroid
    }

    /// Identifiers of adjacent nodes; adjacency is always symmetric.
    #[must_use]
    pub fn neighbors(&self) -> &[NodeId] {
        &self.neighbors
    }
}

/// Undirected planar graph of convex cells tiling the battlefield.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldGraph {
    nodes: Vec<FieldNode>,
}

impl FieldGraph {
    /// Deterministically generates a connected graph of convex cells.
    ///
    /// Cluster centers are laid on an offset pattern (odd rows staggered by
    /// one cell) with a spacing of two cells; each center expands into a
    /// square quadrant template rotated four ways. Shared polygon edges,
    /// matched by coordinate equality within a small tolerance, become graph
    /// edges; boundary edges with a single owner stay unlinked. Staggered
    /// clusters that would overhang the right extent are skipped, which
    /// leaves a ragged edge rather than overlapping cells.
    #[must_use]
    pub fn generate(cluster_columns: u32, cluster_rows: u32, cell_size: f64) -> Self {
        let size = cell_size;
        let width = 2.0 * size * f64::from(cluster_columns);
        let mut polygons: Vec<Vec<[f64; 2]>> = Vec::new();

        for row in 0..cluster_rows {
            let offset = if row % 2 == 1 { size } else { 0.0 };
            let center_y = 2.0 * size * f64::from(row) + size;
            for column in 0..cluster_columns {
                let center_x = 2.0 * size * f64::from(column) + size + offset;
                if center_x + size > width + EDGE_EPSILON {
                    continue;
                }
                for quarter in 0..4 {
                    polygons.push(quadrant(center_x, center_y, size, quarter));
                }
            }
        }

        let mut nodes: Vec<FieldNode> = polygons
            .into_iter()
            .enumerate()
            .map(|(index, points)| {
                let centroid = centroid_of(&points);
                FieldNode {
                    id: NodeId::new(index as u32),
                    points,
                    centroid,
                    neighbors: Vec::new(),
                }
            })
            .collect();

        link_shared_edges(&mut nodes);
        Self { nodes }
    }

    /// Rebuilds a graph from its wire representation.
    ///
    /// Identifiers must be dense and unique, neighbor references in range,
    /// and adjacency symmetric; anything else signals a protocol violation
    /// between server and client.
    pub fn from_wire(wires: &[NodeWire]) -> Result<Self, WorldError> {
        let mut slots: Vec<Option<FieldNode>> = (0..wires.len()).map(|_| None).collect();
        for wire in wires {
            let index = wire.id.index();
            let slot = slots
                .get_mut(index)
                .ok_or_else(|| WorldError::MalformedGraph(format!("id {} out of range", index)))?;
            if slot.is_some() {
                return Err(WorldError::MalformedGraph(format!("duplicate id {index}")));
            }
            for neighbor in &wire.nodes {
                if neighbor.index() >= wires.len() {
                    return Err(WorldError::MalformedGraph(format!(
                        "neighbor {} out of range",
                        neighbor.get()
                    )));
                }
            }
            *slot = Some(FieldNode {
                id: wire.id,
                points: wire.points.clone(),
                centroid: centroid_of(&wire.points),
                neighbors: wire.nodes.clone(),
            });
        }

        let nodes: Vec<FieldNode> = slots
            .into_iter()
            .map(|slot| slot.ok_or_else(|| WorldError::MalformedGraph("missing id".to_string())))
            .collect::<Result<_, _>>()?;

        let graph = Self { nodes };
        for node in &graph.nodes {
            for neighbor in node.neighbors() {
                let reciprocal = graph
                    .node(*neighbor)
                    .is_some_and(|other| other.neighbors().contains(&node.id()));
                if !reciprocal {
                    return Err(WorldError::MalformedGraph(format!(
                        "adjacency {} -> {} is one-way",
                        node.id().get(),
                        neighbor.get()
                    )));
                }
            }
        }
        Ok(graph)
    }

    /// One-time shear/scale toward an isometric-looking layout.
    ///
    /// Applied by the server once after generation, before any state is
    /// pushed to endpoints; centroids are recomputed afterwards.
    pub fn apply_isometric_transform(&mut self) {
        for node in &mut self.nodes {
            for point in &mut node.points {
                let [x, y] = *point;
                *point = [x - y, (x + y) * 0.5];
            }
            node.centroid = centroid_of(&node.points);
        }
    }

    /// Wire representation of every node, in identifier order.
    #[must_use]
    pub fn to_wire(&self) -> Vec<NodeWire> {
        self.nodes
            .iter()
            .map(|node| NodeWire {
                id: node.id(),
                points: node.points.clone(),
                nodes: node.neighbors.clone(),
            })
            .collect()
    }

    /// Node owning the provided identifier, if any.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&FieldNode> {
        self.nodes.get(id.index())
    }

    /// All nodes in identifier order.
    #[must_use]
    pub fn nodes(&self) -> &[FieldNode] {
        &self.nodes
    }

    /// Number of nodes in the graph.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Reports whether the graph holds no nodes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Square quadrant template rotated `quarter` times by 90 degrees around
/// the cluster center, then translated onto it.
fn quadrant(center_x: f64, center_y: f64, size: f64, quarter: u8) -> Vec<[f64; 2]> {
    let template = [[0.0, 0.0], [size, 0.0], [size, size], [0.0, size]];
    template
        .iter()
        .map(|&[mut x, mut y]| {
            for _ in 0..quarter {
                let rotated = [-y, x];
                x = rotated[0];
                y = rotated[1];
            }
            [center_x + x, center_y + y]
        })
        .collect()
}

fn centroid_of(points: &[[f64; 2]]) -> [f64; 2] {
    if points.is_empty() {
        return [0.0, 0.0];
    }
    let count = points.len() as f64;
    let sum = points
        .iter()
        .fold([0.0, 0.0], |acc, point| [acc[0] + point[0], acc[1] + point[1]]);
    [sum[0] / count, sum[1] / count]
}

type EdgeKey = ((i64, i64), (i64, i64));

fn edge_key(a: [f64; 2], b: [f64; 2]) -> EdgeKey {
    let qa = (quantize(a[0]), quantize(a[1]));
    let qb = (quantize(b[0]), quantize(b[1]));
    if qa <= qb {
        (qa, qb)
    } else {
        (qb, qa)
    }
}

fn quantize(coordinate: f64) -> i64 {
    (coordinate / EDGE_EPSILON).round() as i64
}

fn link_shared_edges(nodes: &mut [FieldNode]) {
    // Ordered map so identical inputs always yield identical adjacency.
    let mut owners: BTreeMap<EdgeKey, Vec<usize>> = BTreeMap::new();
    for (index, node) in nodes.iter().enumerate() {
        let points = &node.points;
        for vertex in 0..points.len() {
            let key = edge_key(points[vertex], points[(vertex + 1) % points.len()]);
            owners.entry(key).or_default().push(index);
        }
    }

    for indices in owners.values() {
        if let [first, second] = indices.as_slice() {
            let first_id = nodes[*first].id;
            let second_id = nodes[*second].id;
            nodes[*first].neighbors.push(second_id);
            nodes[*second].neighbors.push(first_id);
        }
    }
    for node in nodes {
        node.neighbors.sort_unstable();
    }
}
