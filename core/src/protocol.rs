//! JSON wire protocol exchanged over the transport channel.
//!
//! Every message is a JSON object with an `action` discriminator. The
//! catalogue is fixed: two client-to-server actions and four
//! server-to-client actions. Payload field names are part of the wire
//! contract and must not drift.

use serde::{Deserialize, Serialize};

use crate::{Character, CharacterId, NodeId, Timestamp};

/// Error raised when a wire message cannot be encoded or decoded.
#[derive(Debug, thiserror::Error)]
#[error("malformed wire message: {0}")]
pub struct ProtocolError(#[from] serde_json::Error);

/// Wire form of a field node, sufficient to rebuild the graph client-side.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeWire {
    /// Stable node identifier.
    pub id: NodeId,
    /// Ordered polygon vertices.
    pub points: Vec<[f64; 2]>,
    /// Identifiers of adjacent nodes.
    pub nodes: Vec<NodeId>,
}

/// Wire form of an in-progress motion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionWire {
    /// Session timestamp at which the traversal began.
    pub started_at: Timestamp,
    /// Ordered node path, first entry being the origin.
    pub path: Vec<NodeId>,
}

/// One entry of an `update-characters` broadcast.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CharacterUpdate {
    /// Node the character occupies (its last node, for a dead character).
    pub node: NodeId,
    /// Full character record to merge into the replica mirror.
    pub character: Character,
    /// Outstanding motion, superseding static occupancy while present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motion: Option<MotionWire>,
}

/// Messages sent from a client endpoint to the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum ClientMessage {
    /// Authentication handshake, accepted only as an endpoint's first message.
    #[serde(rename = "hello from client")]
    Hello {
        /// Team the endpoint intends to play.
        team: String,
        /// Shared secret for this world instance.
        password: String,
    },
    /// Request to cast an ability as the active character.
    #[serde(rename = "cast spell")]
    CastSpell {
        /// Title of the ability to cast.
        spell: String,
        /// Target node for targeted abilities.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<NodeId>,
    },
}

/// Messages broadcast from the server to client endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum ServerMessage {
    /// Full graph push, sent once after successful authentication.
    #[serde(rename = "hello from server")]
    Hello {
        /// Every field node of the battle graph.
        nodes: Vec<NodeWire>,
    },
    /// Roster delta; replicas merge each entry into their mirrors.
    #[serde(rename = "update-characters")]
    UpdateCharacters {
        /// Changed characters with their occupancy and motion.
        characters: Vec<CharacterUpdate>,
    },
    /// Wholesale turn queue replacement; index 0 is the active character.
    #[serde(rename = "update-turn-queue")]
    UpdateTurnQueue {
        /// Character identifiers in turn order.
        queue: Vec<CharacterId>,
    },
    /// Notice that an ability cast was accepted, for visual cues.
    #[serde(rename = "show-casted-spell")]
    ShowCastedSpell {
        /// Title of the cast ability.
        spell: String,
        /// Character the cast is attributed to.
        author: CharacterId,
        /// Chosen target node, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<NodeId>,
    },
}

impl ClientMessage {
    /// Encodes the message as a single-line JSON string.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a message received from a client endpoint.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl ServerMessage {
    /// Encodes the message as a single-line JSON string.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a message received from the server.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}
