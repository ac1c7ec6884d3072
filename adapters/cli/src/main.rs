#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Headless harness that runs two scripted bots against a live server.
//!
//! Exercises the whole stack without a renderer: a generated field graph,
//! an authoritative server, and two replica clients wired over in-memory
//! channels, authenticating and casting like real endpoints would.

use anyhow::{bail, Result};
use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use skirmish_client::WorldClient;
use skirmish_core::transport::{channel_pair, ChannelEndpoint};
use skirmish_core::{Character, CharacterId, NodeId, Team, Timestamp};
use skirmish_server::{EndpointId, WorldServer};
use skirmish_system_abilities::{AbilityBook, CastCheck};
use skirmish_world::query::{self, CharacterState};
use skirmish_world::{BattleState, FieldGraph};

const TEAM_SIZE: u32 = 3;
const TICK_MS: u64 = 50;

/// Headless two-bot skirmish over the full client/server stack.
#[derive(Debug, Parser)]
#[command(name = "skirmish")]
struct Args {
    /// Cluster columns of the generated field graph.
    #[arg(long, default_value_t = 4)]
    columns: u32,
    /// Cluster rows of the generated field graph.
    #[arg(long, default_value_t = 4)]
    rows: u32,
    /// Number of turns to simulate before stopping.
    #[arg(long, default_value_t = 24)]
    turns: u32,
    /// Seed for the bots' tie-breaking RNG.
    #[arg(long, default_value_t = 7)]
    seed: u64,
    /// Shared secret both bots authenticate with.
    #[arg(long, default_value = "skirmish")]
    secret: String,
}

struct Bot {
    team: String,
    endpoint: EndpointId,
    client: WorldClient<ChannelEndpoint>,
    /// Server broadcasts waiting to be applied to the replica.
    inbound: ChannelEndpoint,
    /// Client sends waiting to be forwarded to the server.
    upstream: ChannelEndpoint,
}

enum Decision {
    Kick(NodeId),
    Advance(NodeId),
    EndTurn,
    Wait,
}

fn main() {
    init_tracing();
    if let Err(error) = run(Args::parse()) {
        error!(%error, "skirmish failed");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn run(args: Args) -> Result<()> {
    let mut graph = FieldGraph::generate(args.columns, args.rows, 1.0);
    graph.apply_isometric_transform();
    if (graph.len() as u32) < TEAM_SIZE * 2 {
        bail!(
            "a {}x{} field yields only {} nodes, not enough for two teams",
            args.columns,
            args.rows,
            graph.len()
        );
    }
    info!(nodes = graph.len(), "field graph generated");

    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let roster = build_roster(&graph, &mut rng);
    let state = BattleState::with_roster(graph, roster)?;
    let mut server = WorldServer::new(state, AbilityBook::standard(), args.secret.clone());

    let mut bots = vec![
        join(&mut server, "azure", &args.secret)?,
        join(&mut server, "crimson", &args.secret)?,
    ];

    let mut now = Timestamp::from_millis(0);
    let mut completed_turns = 0u32;
    while completed_turns < args.turns {
        now = now.plus_millis(TICK_MS);
        server.poll(now)?;

        for bot in &mut bots {
            for text in bot.upstream.drain() {
                server.handle_message(bot.endpoint, &text, now)?;
            }
        }
        for bot in &mut bots {
            for text in bot.inbound.drain() {
                bot.client.handle_message(&text)?;
            }
            let _ = bot.client.take_notices();
        }

        for bot in &mut bots {
            if act(bot, now, &mut rng)? {
                completed_turns += 1;
            }
        }

        let survivors: Vec<&str> = {
            let mut teams: Vec<&str> = server
                .state()
                .characters()
                .filter(|character| character.is_alive())
                .map(|character| character.team.as_str())
                .collect();
            teams.sort_unstable();
            teams.dedup();
            teams
        };
        if survivors.len() < 2 {
            info!(winner = survivors.first().copied().unwrap_or("nobody"), "battle decided");
            break;
        }
    }

    for character in server.state().characters() {
        info!(
            name = %character.name,
            team = character.team.as_str(),
            health = character.health,
            "final roster"
        );
    }
    info!(turns = completed_turns, "simulation finished");
    Ok(())
}

/// Three champions per team on opposite ends of the node list.
fn build_roster(graph: &FieldGraph, rng: &mut ChaCha8Rng) -> Vec<(Character, NodeId)> {
    let last = graph.len() as u32 - 1;
    let mut roster = Vec::new();
    for slot in 0..TEAM_SIZE {
        roster.push((
            champion(slot + 1, "azure", rng.gen_range(1..100)),
            NodeId::new(slot),
        ));
        roster.push((
            champion(TEAM_SIZE + slot + 1, "crimson", rng.gen_range(1..100)),
            NodeId::new(last - slot),
        ));
    }
    roster
}

fn champion(id: u32, team: &str, initiative: i32) -> Character {
    Character {
        id: CharacterId::new(id),
        name: format!("{team}-{id}"),
        kind: "mercenary".to_string(),
        team: Team::new(team),
        max_move_points: 3,
        move_points: 3,
        max_action_points: 1,
        action_points: 1,
        health: 5,
        max_health: 5,
        step_duration_ms: 150,
        initiative,
        spells: vec![
            "end-turn".to_string(),
            "move".to_string(),
            "kick".to_string(),
            "bomb".to_string(),
            "heal".to_string(),
            "teleport".to_string(),
        ],
        effects: Vec::new(),
    }
}

fn join(server: &mut WorldServer, team: &str, secret: &str) -> Result<Bot> {
    let (to_client, inbound) = channel_pair();
    let endpoint = server.connect(Box::new(to_client));
    let (to_server, upstream) = channel_pair();
    let mut client = WorldClient::new(to_server, AbilityBook::standard());
    client.hello(team, secret)?;
    Ok(Bot {
        team: team.to_string(),
        endpoint,
        client,
        inbound,
        upstream,
    })
}

/// One bot step: kick an adjacent enemy, otherwise advance toward the
/// nearest one, otherwise end the turn. Returns whether a turn ended.
fn act(bot: &mut Bot, now: Timestamp, rng: &mut ChaCha8Rng) -> Result<bool> {
    let decision = decide(bot, now, rng)?;
    match decision {
        Decision::Kick(node) => {
            let _ = bot.client.cast("kick", Some(node), now)?;
            Ok(false)
        }
        Decision::Advance(node) => {
            let _ = bot.client.cast("move", Some(node), now)?;
            Ok(false)
        }
        Decision::EndTurn => {
            let verdict = bot.client.cast("end-turn", None, now)?;
            Ok(verdict == CastCheck::Accepted)
        }
        Decision::Wait => Ok(false),
    }
}

fn decide(bot: &Bot, now: Timestamp, rng: &mut ChaCha8Rng) -> Result<Decision> {
    let Some(state) = bot.client.state() else {
        return Ok(Decision::Wait);
    };
    let Some(active) = state.active_character() else {
        return Ok(Decision::Wait);
    };
    let Some(champion) = state.character(active) else {
        return Ok(Decision::Wait);
    };
    if champion.team.as_str() != bot.team {
        return Ok(Decision::Wait);
    }
    if !matches!(
        query::character_state(state, active, now)?,
        CharacterState::Resting { .. }
    ) {
        return Ok(Decision::Wait);
    }
    let Some(origin) = state.node_of(active) else {
        return Ok(Decision::Wait);
    };

    let enemy_nodes: Vec<NodeId> = state
        .characters()
        .filter(|character| character.team.as_str() != bot.team)
        .filter_map(|character| state.node_of(character.id))
        .collect();
    if enemy_nodes.is_empty() {
        return Ok(Decision::EndTurn);
    }

    if champion.action_points >= 1 {
        let kickable: Vec<NodeId> = query::area_search(state, origin, 1, true)?
            .into_iter()
            .filter(|node| *node != origin && enemy_nodes.contains(node))
            .collect();
        if !kickable.is_empty() {
            return Ok(Decision::Kick(kickable[rng.gen_range(0..kickable.len())]));
        }
    }

    if champion.move_points > 0 {
        let candidates: Vec<NodeId> =
            query::area_search(state, origin, champion.move_points, false)?
                .into_iter()
                .filter(|node| *node != origin)
                .collect();
        if let Some(destination) = closest_to_enemies(state, &candidates, &enemy_nodes, rng) {
            let here = advance_score(state, origin, &enemy_nodes);
            let there = advance_score(state, destination, &enemy_nodes);
            if there < here {
                return Ok(Decision::Advance(destination));
            }
        }
    }

    Ok(Decision::EndTurn)
}

fn advance_score(state: &BattleState, node: NodeId, enemies: &[NodeId]) -> f64 {
    let Some(from) = state.graph().node(node) else {
        return f64::INFINITY;
    };
    let [x, y] = from.centroid();
    enemies
        .iter()
        .filter_map(|enemy| state.graph().node(*enemy))
        .map(|enemy| {
            let [ex, ey] = enemy.centroid();
            (ex - x).hypot(ey - y)
        })
        .fold(f64::INFINITY, f64::min)
}

fn closest_to_enemies(
    state: &BattleState,
    candidates: &[NodeId],
    enemies: &[NodeId],
    rng: &mut ChaCha8Rng,
) -> Option<NodeId> {
    let best = candidates
        .iter()
        .map(|node| advance_score(state, *node, enemies))
        .fold(f64::INFINITY, f64::min);
    let tied: Vec<NodeId> = candidates
        .iter()
        .copied()
        .filter(|node| (advance_score(state, *node, enemies) - best).abs() < 1e-9)
        .collect();
    if tied.is_empty() {
        None
    } else {
        Some(tied[rng.gen_range(0..tied.len())])
    }
}
