use skirmish_core::protocol::{
    CharacterUpdate, ClientMessage, MotionWire, NodeWire, ServerMessage,
};
use skirmish_core::transport::{channel_pair, ChannelEndpoint};
use skirmish_core::{Character, CharacterId, NodeId, Team, Timestamp};
use skirmish_client::{Notice, WorldClient};
use skirmish_system_abilities::{AbilityBook, CastCheck};
use skirmish_world::query;

fn line_wires(length: u32) -> Vec<NodeWire> {
    (0..length)
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
        .collect()
}

fn scout(id: u32, health: i32) -> Character {
    Character {
        id: CharacterId::new(id),
        name: format!("scout-{id}"),
        kind: "goblin".to_string(),
        team: Team::new("crimson"),
        max_move_points: 3,
        move_points: 3,
        max_action_points: 1,
        action_points: 1,
        health,
        max_health: 5,
        step_duration_ms: 100,
        initiative: id as i32,
        spells: vec![
            "end-turn".to_string(),
            "move".to_string(),
            "kick".to_string(),
        ],
        effects: Vec::new(),
    }
}

fn update(node: u32, character: Character) -> CharacterUpdate {
    CharacterUpdate {
        node: NodeId::new(node),
        character,
        motion: None,
    }
}

fn push<S: skirmish_core::transport::MessageSink>(
    client: &mut WorldClient<S>,
    message: &ServerMessage,
) {
    let text = message.encode().expect("encode");
    client.handle_message(&text).expect("apply");
}

fn connected(length: u32) -> (WorldClient<ChannelEndpoint>, ChannelEndpoint) {
    let (client_side, server_side) = channel_pair();
    let mut client = WorldClient::new(client_side, AbilityBook::standard());
    push(&mut client, &ServerMessage::Hello { nodes: line_wires(length) });
    (client, server_side)
}

#[test]
fn snapshot_and_roster_build_a_queryable_mirror() {
    let (mut client, _server_side) = connected(5);
    push(
        &mut client,
        &ServerMessage::UpdateCharacters {
            characters: vec![update(0, scout(1, 5)), update(3, scout(2, 5))],
        },
    );
    push(
        &mut client,
        &ServerMessage::UpdateTurnQueue {
            queue: vec![CharacterId::new(1), CharacterId::new(2)],
        },
    );

    let state = client.state().expect("mirrored");
    assert_eq!(state.occupant(NodeId::new(3)), Some(CharacterId::new(2)));
    assert_eq!(state.active_character(), Some(CharacterId::new(1)));
    let area = query::area_search(state, NodeId::new(0), 2, false).expect("search");
    assert!(!area.contains(&NodeId::new(3)));
}

#[test]
fn roster_updates_merge_into_the_existing_record() {
    let (mut client, _server_side) = connected(4);
    push(
        &mut client,
        &ServerMessage::UpdateCharacters {
            characters: vec![update(0, scout(1, 5))],
        },
    );

    let mut wounded = scout(1, 2);
    wounded.move_points = 1;
    push(
        &mut client,
        &ServerMessage::UpdateCharacters {
            characters: vec![update(1, wounded)],
        },
    );

    let state = client.state().expect("mirrored");
    let mirror = state.character(CharacterId::new(1)).expect("merged");
    assert_eq!(mirror.health, 2);
    assert_eq!(mirror.move_points, 1);
    assert_eq!(state.node_of(CharacterId::new(1)), Some(NodeId::new(1)));
    assert_eq!(state.occupant(NodeId::new(0)), None);
}

#[test]
fn a_dead_character_is_pruned_from_the_replica() {
    let (mut client, _server_side) = connected(4);
    push(
        &mut client,
        &ServerMessage::UpdateCharacters {
            characters: vec![update(0, scout(1, 5)), update(2, scout(2, 5))],
        },
    );
    push(
        &mut client,
        &ServerMessage::UpdateTurnQueue {
            queue: vec![CharacterId::new(1), CharacterId::new(2)],
        },
    );

    push(
        &mut client,
        &ServerMessage::UpdateCharacters {
            characters: vec![update(2, scout(2, 0))],
        },
    );

    let state = client.state().expect("mirrored");
    assert!(state.character(CharacterId::new(2)).is_none());
    assert_eq!(state.occupant(NodeId::new(2)), None);
    assert!(state.motion(CharacterId::new(2)).is_none());
}

#[test]
fn a_corpse_under_a_living_character_applies_cleanly() {
    // After a kill, the victor may stand on the victim's node; a delta
    // carrying both records must not tear the replica.
    let (mut client, _server_side) = connected(4);
    push(
        &mut client,
        &ServerMessage::UpdateCharacters {
            characters: vec![update(0, scout(1, 5)), update(1, scout(2, 5))],
        },
    );

    push(
        &mut client,
        &ServerMessage::UpdateCharacters {
            characters: vec![update(1, scout(2, 0)), update(1, scout(1, 5))],
        },
    );

    let state = client.state().expect("mirrored");
    assert!(state.character(CharacterId::new(2)).is_none());
    assert_eq!(state.occupant(NodeId::new(1)), Some(CharacterId::new(1)));
    assert_eq!(state.node_of(CharacterId::new(1)), Some(NodeId::new(1)));
}

#[test]
fn a_dead_entry_for_an_unknown_character_is_skipped() {
    let (mut client, _server_side) = connected(4);
    push(
        &mut client,
        &ServerMessage::UpdateCharacters {
            characters: vec![update(2, scout(9, 0)), update(2, scout(1, 5))],
        },
    );

    let state = client.state().expect("mirrored");
    assert!(state.character(CharacterId::new(9)).is_none());
    assert_eq!(state.occupant(NodeId::new(2)), Some(CharacterId::new(1)));
}

#[test]
fn motion_updates_feed_the_interpolation_query() {
    let (mut client, _server_side) = connected(5);
    push(
        &mut client,
        &ServerMessage::UpdateCharacters {
            characters: vec![CharacterUpdate {
                node: NodeId::new(0),
                character: scout(1, 5),
                motion: Some(MotionWire {
                    started_at: Timestamp::from_millis(1000),
                    path: vec![NodeId::new(0), NodeId::new(1), NodeId::new(2)],
                }),
            }],
        },
    );

    let state = client.state().expect("mirrored");
    let derived = query::character_state(state, CharacterId::new(1), Timestamp::from_millis(1150))
        .expect("derived");
    assert_eq!(
        derived,
        query::CharacterState::Moving {
            from: NodeId::new(1),
            to: NodeId::new(2),
            phase: 0.5,
        }
    );
}

#[test]
fn queue_replacement_emits_a_turn_notice() {
    let (mut client, _server_side) = connected(4);
    push(
        &mut client,
        &ServerMessage::UpdateCharacters {
            characters: vec![update(0, scout(1, 5)), update(2, scout(2, 5))],
        },
    );
    push(
        &mut client,
        &ServerMessage::UpdateTurnQueue {
            queue: vec![CharacterId::new(2), CharacterId::new(1)],
        },
    );

    let notices = client.take_notices();
    assert_eq!(
        notices,
        vec![Notice::TurnChanged {
            active: Some(CharacterId::new(2))
        }]
    );
    assert!(client.take_notices().is_empty(), "drained once");
}

#[test]
fn cast_notice_for_an_unknown_author_is_dropped() {
    let (mut client, _server_side) = connected(4);
    push(
        &mut client,
        &ServerMessage::ShowCastedSpell {
            spell: "kick".to_string(),
            author: CharacterId::new(9),
            target: Some(NodeId::new(1)),
        },
    );
    assert!(client.take_notices().is_empty());
}

#[test]
fn rejected_pre_check_sends_nothing() {
    let (mut client, server_side) = connected(4);
    push(
        &mut client,
        &ServerMessage::UpdateCharacters {
            characters: vec![update(0, scout(1, 5)), update(2, scout(2, 5))],
        },
    );
    push(
        &mut client,
        &ServerMessage::UpdateTurnQueue {
            queue: vec![CharacterId::new(1), CharacterId::new(2)],
        },
    );

    // Node 1 is vacant, so the kick fails the same check the server runs.
    let verdict = client
        .cast("kick", Some(NodeId::new(1)), Timestamp::from_millis(0))
        .expect("checked");
    assert_eq!(verdict, CastCheck::BadTarget);
    assert!(server_side.drain().is_empty());
}

#[test]
fn accepted_cast_is_sent_upstream() {
    let (mut client, server_side) = connected(4);
    push(
        &mut client,
        &ServerMessage::UpdateCharacters {
            characters: vec![update(0, scout(1, 5)), update(1, scout(2, 5))],
        },
    );
    push(
        &mut client,
        &ServerMessage::UpdateTurnQueue {
            queue: vec![CharacterId::new(1), CharacterId::new(2)],
        },
    );

    let verdict = client
        .cast("kick", Some(NodeId::new(1)), Timestamp::from_millis(0))
        .expect("checked");
    assert_eq!(verdict, CastCheck::Accepted);

    let sent = server_side.drain();
    assert_eq!(sent.len(), 1);
    let decoded = ClientMessage::decode(&sent[0]).expect("decode");
    assert_eq!(
        decoded,
        ClientMessage::CastSpell {
            spell: "kick".to_string(),
            target: Some(NodeId::new(1)),
        }
    );
}
