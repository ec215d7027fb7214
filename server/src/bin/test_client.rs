//! Headless bot that exercises a running grid server

use bincode::{deserialize, serialize};
use clap::Parser;
use log::{info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use shared::{Direction, Packet, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep, timeout};

#[derive(Parser, Debug)]
#[command(author, version, about = "Random-walk bot for the grid server", long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Name to join with
    #[arg(short = 'n', long, default_value = "bot")]
    name: String,

    /// Number of actions before disconnecting
    #[arg(short = 'a', long, default_value_t = 50)]
    actions: u32,

    /// Milliseconds between actions
    #[arg(short = 'd', long, default_value_t = 200)]
    delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    info!("Client socket bound to {}", socket.local_addr()?);
    let server_addr: SocketAddr = args.server.parse()?;

    send(
        &socket,
        server_addr,
        &Packet::Connect {
            client_version: PROTOCOL_VERSION,
        },
    )
    .await?;

    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let client_id = match recv(&socket, &mut buf).await? {
        Packet::Connected { client_id } => client_id,
        Packet::Disconnected { reason } => {
            warn!("Server refused connection: {}", reason);
            return Ok(());
        }
        other => {
            warn!("Expected Connected but got: {:?}", other);
            return Ok(());
        }
    };
    info!("Connected with client ID: {}", client_id);

    send(
        &socket,
        server_addr,
        &Packet::Join {
            username: args.name.clone(),
        },
    )
    .await?;

    let mut rng = rand::thread_rng();
    let mut ticker = interval(Duration::from_millis(args.delay_ms.max(1)));
    let mut performed = 0;

    while performed < args.actions {
        tokio::select! {
            _ = ticker.tick() => {
                let action = random_action(&mut rng, performed);
                send(&socket, server_addr, &action).await?;
                performed += 1;
            }
            received = socket.recv_from(&mut buf) => {
                let (len, _) = received?;
                match deserialize::<Packet>(&buf[..len]) {
                    Ok(packet) => report(client_id, packet),
                    Err(e) => warn!("Failed to deserialize packet: {}", e),
                }
            }
        }
    }

    send(&socket, server_addr, &Packet::Disconnect).await?;
    info!("Bot finished after {} actions", performed);

    // Let the disconnect leave before the socket is dropped.
    sleep(Duration::from_millis(50)).await;
    Ok(())
}

fn random_action<R: Rng>(rng: &mut R, step: u32) -> Packet {
    if step % 10 == 9 {
        return Packet::Heartbeat;
    }

    match rng.gen_range(0..100) {
        0..=69 => Packet::Move {
            dir: Direction::ALL.choose(rng).copied(),
            shift: false,
        },
        70..=79 => Packet::Move {
            dir: Direction::ALL.choose(rng).copied(),
            shift: true,
        },
        80..=89 => Packet::PlaceWall,
        90..=94 => Packet::BoomWall,
        _ => Packet::Chat {
            message: format!("step {}", step),
        },
    }
}

fn report(client_id: u32, packet: Packet) {
    match packet {
        Packet::Init { grid_size, snapshot, .. } => info!(
            "Joined a {}x{} grid with {} players and {} walls",
            grid_size,
            grid_size,
            snapshot.players.len(),
            snapshot.walls.len()
        ),
        Packet::Update { tick, snapshot } => {
            if let Some(me) = snapshot.player(client_id) {
                info!("Tick {}: at {}, {} walls", tick, me.position(), snapshot.walls.len());
            }
        }
        Packet::ChatMessage { username, message } => info!("[chat] {}: {}", username, message),
        Packet::Disconnected { reason } => warn!("Disconnected by server: {}", reason),
        other => info!("Received {:?}", other),
    }
}

async fn send(
    socket: &UdpSocket,
    addr: SocketAddr,
    packet: &Packet,
) -> Result<(), Box<dyn std::error::Error>> {
    socket.send_to(&serialize(packet)?, addr).await?;
    Ok(())
}

async fn recv(socket: &UdpSocket, buf: &mut [u8]) -> Result<Packet, Box<dyn std::error::Error>> {
    let (len, _) = timeout(Duration::from_secs(5), socket.recv_from(buf)).await??;
    Ok(deserialize(&buf[..len])?)
}
