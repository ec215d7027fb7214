//! Server network layer handling UDP communications and the event loop

use crate::broadcast::BroadcastScheduler;
use crate::chat::{ChatFilter, ChatModerator, LocalMask, ModeratedChat, PassthroughFilter, PurgoMalumFilter};
use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::persistence;
use crate::world::{Command, WorldEvent, WorldState};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: u32 },
}

/// Messages sent from the main loop to the network sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<u32>,
    },
}

/// Main server coordinating networking and the authoritative world
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    world: WorldState,
    scheduler: BroadcastScheduler,
    moderator: ChatModerator,

    walls_file: PathBuf,
    save_interval: Option<Duration>,
    walls_dirty: bool,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
    chat_rx: mpsc::UnboundedReceiver<ModeratedChat>,
}

impl Server {
    pub async fn new(config: &ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;

        let addr = config.bind_addr();
        let socket = Arc::new(UdpSocket::bind(&addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let mut world = WorldState::from_config(config);
        let loaded = world.load_walls(persistence::load_walls(&config.walls_file));
        info!("World ready: {}x{} grid, {} walls", config.grid_size, config.grid_size, loaded);

        let filter: Arc<dyn ChatFilter> = if config.no_chat_filter {
            Arc::new(PassthroughFilter)
        } else {
            Arc::new(
                PurgoMalumFilter::new(&config.chat_filter_url, config.chat_filter_timeout())
                    .map_err(|e| e.to_string())?,
            )
        };

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();
        let (chat_tx, chat_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(
                config.max_clients,
                config.client_timeout(),
            ))),
            world,
            scheduler: BroadcastScheduler::new(config.broadcast, config.tick_duration()),
            moderator: ChatModerator::new(
                filter,
                LocalMask::new(&config.denylist),
                config.chat_filter_timeout(),
                chat_tx,
            ),
            walls_file: config.walls_file.clone(),
            save_interval: config.save_interval(),
            walls_dirty: false,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
            chat_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        // Serialize once for every recipient.
                        let data = match serialize(&packet) {
                            Ok(data) => data,
                            Err(e) => {
                                error!("Failed to serialize broadcast: {}", e);
                                continue;
                            }
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = socket.send_to(&data, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    async fn send_to_client(&self, client_id: u32, packet: Packet) {
        let addr = self.clients.read().await.addr_of(client_id);
        match addr {
            Some(addr) => self.send_packet(packet, addr),
            None => debug!("Dropping packet for departed client {}", client_id),
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<u32>) {
        if let Err(e) = self
            .game_tx
            .send(GameMessage::BroadcastPacket { packet, exclude })
        {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Processes incoming packets
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if let Packet::Connect { client_version } = packet {
            self.handle_connect(client_version, addr).await;
            return;
        }

        let client_id = self.clients.write().await.touch(addr);
        let Some(client_id) = client_id else {
            debug!("Ignoring packet from unconnected address {}", addr);
            return;
        };

        match packet {
            Packet::Heartbeat => {}
            Packet::Join { username } => {
                let events = self.world.execute(client_id, Command::Join { username });
                if events.is_empty() {
                    return;
                }

                // The joiner's first state packet is always its Init.
                let init = Packet::Init {
                    client_id,
                    grid_size: self.world.grid_size(),
                    snapshot: self.world.snapshot(),
                };
                self.send_to_client(client_id, init).await;
                self.publish(&events);
            }
            Packet::Move { dir, shift } => {
                self.apply_command(client_id, Command::Move { dir, shift });
            }
            Packet::PlaceWall => {
                self.apply_command(client_id, Command::PlaceWall);
            }
            Packet::BoomWall => {
                self.apply_command(client_id, Command::BoomWall);
            }
            Packet::SetName { name } => {
                self.apply_command(client_id, Command::SetName { name });
            }
            Packet::Chat { message } => {
                if self.world.player(client_id).is_some() {
                    self.moderator.submit(client_id, &message);
                }
            }
            Packet::Disconnect => {
                self.clients.write().await.remove_client(&client_id);
                self.drop_client(client_id);
            }
            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    async fn handle_connect(&mut self, client_version: u32, addr: SocketAddr) {
        info!(
            "Client connecting from {} (version: {})",
            addr, client_version
        );

        if client_version != PROTOCOL_VERSION {
            let response = Packet::Disconnected {
                reason: "Protocol version mismatch".to_string(),
            };
            self.send_packet(response, addr);
            return;
        }

        // Remove existing connection if present
        let existing_client_id = self.clients.read().await.find_client_by_addr(addr);
        if let Some(existing_id) = existing_client_id {
            info!("Removing existing client {} from {}", existing_id, addr);
            self.clients.write().await.remove_client(&existing_id);
            self.drop_client(existing_id);
        }

        let client_id = self.clients.write().await.add_client(addr);
        let response = match client_id {
            Some(client_id) => Packet::Connected { client_id },
            None => Packet::Disconnected {
                reason: "Server full".to_string(),
            },
        };
        self.send_packet(response, addr);
    }

    /// Forgets everything about a client already removed from the roster
    fn drop_client(&mut self, client_id: u32) {
        self.moderator.close_lane(client_id);
        self.apply_command(client_id, Command::Leave);
    }

    /// Runs a command against the world and fans out its effects
    fn apply_command(&mut self, client_id: u32, command: Command) {
        let events = self.world.execute(client_id, command);
        self.publish(&events);
    }

    /// Fans out notifications for events already applied to the world
    fn publish(&mut self, events: &[WorldEvent]) {
        if events.is_empty() {
            return;
        }

        self.scheduler.mark_dirty();
        if events.iter().any(WorldEvent::touches_walls) {
            self.walls_dirty = true;
        }

        for event in events {
            if let Some(packet) = event_packet(event) {
                let exclude = match event {
                    WorldEvent::PlayerJoined(player) => Some(player.id),
                    _ => None,
                };
                self.broadcast_packet(packet, exclude);
            }
        }

        if let Some(update) = self.scheduler.after_mutation(&self.world) {
            self.broadcast_packet(update, None);
        }
    }

    fn handle_chat(&mut self, chat: ModeratedChat) {
        let username = self.world.username_of(chat.sender_id);
        let message = chat.into_message(username);
        info!("[chat] {}: {}", message.username, message.message);
        self.broadcast_packet(
            Packet::ChatMessage {
                username: message.username,
                message: message.message,
            },
            None,
        );
    }

    /// Broadcasts the scheduled snapshot for this tick
    async fn broadcast_tick(&mut self) {
        let client_count = self.clients.read().await.len();
        let update = self.scheduler.on_tick(&self.world);

        if self.scheduler.tick() % 100 == 0 && client_count > 0 {
            debug!(
                "Tick {}: {} clients, {} players, {} walls",
                self.scheduler.tick(),
                client_count,
                self.world.player_count(),
                self.world.walls().len()
            );
        }

        if client_count == 0 {
            return;
        }
        if let Some(update) = update {
            self.broadcast_packet(update, None);
        }
    }

    fn save_walls(&mut self) {
        if !self.walls_dirty {
            return;
        }
        match persistence::save_walls(&self.walls_file, self.world.walls()) {
            Ok(()) => {
                self.walls_dirty = false;
                debug!("Saved {} walls to {}", self.world.walls().len(), self.walls_file.display());
            }
            Err(e) => error!("Failed to save walls to {}: {}", self.walls_file.display(), e),
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.scheduler.interval());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut save_timer = self.save_interval.map(|period| {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            self.drop_client(client_id);
                        },
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Filtered chat coming back from the lanes
                Some(chat) = self.chat_rx.recv() => {
                    self.handle_chat(chat);
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    self.broadcast_tick().await;
                },

                _ = next_save(&mut save_timer) => {
                    self.save_walls();
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down");
                    break;
                },
            }
        }

        if self.save_interval.is_some() {
            self.save_walls();
        }
        Ok(())
    }
}

/// Resolves when the save timer fires; never, when saving is disabled
async fn next_save(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Notification packet announcing a world event, if it has one
///
/// Moves and renames have no dedicated notification; observers pick them up
/// from the next snapshot.
pub fn event_packet(event: &WorldEvent) -> Option<Packet> {
    match event {
        WorldEvent::PlayerJoined(player) => Some(Packet::PlayerJoined {
            player: player.clone(),
        }),
        WorldEvent::PlayerLeft(client_id) => Some(Packet::PlayerLeft {
            client_id: *client_id,
        }),
        WorldEvent::WallAdded(wall) => Some(Packet::WallAdded { wall: wall.clone() }),
        WorldEvent::WallRemoved(pos) => Some(Packet::WallRemoved { x: pos.x, y: pos.y }),
        WorldEvent::PlayerMoved { .. } | WorldEvent::PlayerRenamed { .. } => None,
    }
}
