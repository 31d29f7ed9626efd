//! Mesh node - async runtime around the coordination engine
//!
//! [`MeshNode`] owns the socket and the engine and runs four background
//! tasks: the pulse emitter, the datagram receiver, periodic
//! housekeeping, and epoch rotation. The engine itself is synchronous;
//! every task locks it, works, collects what the engine queued, and
//! only then touches the network. The lock is never held across an
//! await point.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use kedge_core::{KedgeResult, MeshConfig, MeshEvent, NodeId, NodeStatus, Timestamp};
use kedge_crypto::Identity;
use kedge_engine::{CoordinationEngine, EngineStats, MeshSnapshot, Outbound};
use kedge_transport::{start_receive_loop, PulseSocket};

/// Cadence for eviction, failover checks, and rotation checks.
///
/// Fine enough that anchor-loss detection lands within a second of the
/// silence limit.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(1);

/// A running KEDGE node
pub struct MeshNode {
    engine: Arc<Mutex<CoordinationEngine>>,
    socket: Arc<PulseSocket>,
    events: broadcast::Sender<MeshEvent>,
    shutdown: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl MeshNode {
    /// Start a node with a freshly generated identity.
    pub async fn start(config: MeshConfig) -> KedgeResult<Self> {
        Self::start_with_identity(config, Identity::generate()).await
    }

    /// Start a node with an existing identity.
    pub async fn start_with_identity(config: MeshConfig, identity: Identity) -> KedgeResult<Self> {
        let engine = CoordinationEngine::new(config.clone(), identity, Timestamp::now())?;
        let socket = Arc::new(
            PulseSocket::bind(config.multicast_group, config.port, config.interface).await?,
        );
        tracing::info!(
            "node {} listening on {} (group {})",
            engine.local_id(),
            socket.local_addr(),
            socket.group()
        );

        let engine = Arc::new(Mutex::new(engine));
        let (events, _) = broadcast::channel(config.event_capacity);
        let (shutdown, _) = broadcast::channel(1);

        let tasks = vec![
            spawn_emitter(
                Arc::clone(&engine),
                Arc::clone(&socket),
                events.clone(),
                config.pulse_interval,
                shutdown.subscribe(),
            ),
            spawn_receiver(
                Arc::clone(&engine),
                Arc::clone(&socket),
                events.clone(),
                shutdown.subscribe(),
            ),
            spawn_housekeeping(
                Arc::clone(&engine),
                Arc::clone(&socket),
                events.clone(),
                shutdown.subscribe(),
            ),
            spawn_rotation(Arc::clone(&engine), shutdown.subscribe()),
        ];

        Ok(MeshNode {
            engine,
            socket,
            events,
            shutdown,
            tasks,
        })
    }

    pub fn local_id(&self) -> NodeId {
        self.engine.lock().local_id()
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.socket.local_addr()
    }

    pub fn is_anchor(&self) -> bool {
        self.engine.lock().is_anchor()
    }

    pub fn anchor(&self) -> Option<NodeId> {
        self.engine.lock().anchor()
    }

    /// Subscribe to mesh events. Slow subscribers lose oldest events
    /// first; the protocol itself never blocks on them.
    pub fn subscribe(&self) -> broadcast::Receiver<MeshEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> MeshSnapshot {
        self.engine.lock().snapshot()
    }

    pub fn stats(&self) -> EngineStats {
        *self.engine.lock().stats()
    }

    /// Update the health carried in subsequent pulses.
    pub fn set_status(&self, status: NodeStatus) {
        self.engine.lock().set_status(status);
    }

    /// Stop all background tasks and drop the socket.
    pub async fn shutdown(mut self) {
        let local = self.local_id();
        let _ = self.shutdown.send(());
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        tracing::info!("node {} stopped", local);
    }
}

/// Forward queued events to subscribers and collect queued frames.
///
/// Called with the engine lock held; the returned frames are sent after
/// the lock is released.
fn collect(engine: &mut CoordinationEngine, events: &broadcast::Sender<MeshEvent>) -> Vec<Outbound> {
    while let Some(event) = engine.pop_event() {
        let _ = events.send(event);
    }
    std::iter::from_fn(|| engine.pop_outbound()).collect()
}

async fn flush(socket: &PulseSocket, frames: Vec<Outbound>) {
    for frame in frames {
        let result = match frame {
            Outbound::Broadcast(bytes) => socket.broadcast(&bytes).await,
            Outbound::Unicast(bytes, dest) => socket.send_to(&bytes, dest).await,
        };
        if let Err(e) = result {
            tracing::warn!("send failed: {}", e);
        }
    }
}

fn spawn_emitter(
    engine: Arc<Mutex<CoordinationEngine>>,
    socket: Arc<PulseSocket>,
    events: broadcast::Sender<MeshEvent>,
    pulse_interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(pulse_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let frames = {
                        let mut engine = engine.lock();
                        engine.pulse();
                        collect(&mut engine, &events)
                    };
                    flush(&socket, frames).await;
                }
                _ = shutdown.recv() => break,
            }
        }
    })
}

fn spawn_receiver(
    engine: Arc<Mutex<CoordinationEngine>>,
    socket: Arc<PulseSocket>,
    events: broadcast::Sender<MeshEvent>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let mut incoming = start_receive_loop(socket.socket(), 256);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                received = incoming.recv() => {
                    let Some((datagram, src)) = received else { break };
                    let frames = {
                        let mut engine = engine.lock();
                        engine.ingest(&datagram, src, Timestamp::now());
                        collect(&mut engine, &events)
                    };
                    flush(&socket, frames).await;
                }
                _ = shutdown.recv() => break,
            }
        }
    })
}

fn spawn_housekeeping(
    engine: Arc<Mutex<CoordinationEngine>>,
    socket: Arc<PulseSocket>,
    events: broadcast::Sender<MeshEvent>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let frames = {
                        let mut engine = engine.lock();
                        engine.tick(Timestamp::now());
                        collect(&mut engine, &events)
                    };
                    flush(&socket, frames).await;
                }
                _ = shutdown.recv() => break,
            }
        }
    })
}

fn spawn_rotation(
    engine: Arc<Mutex<CoordinationEngine>>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // The rotated secret reaches the mesh with the next pulse.
                    engine.lock().rotate_epoch(Timestamp::now());
                }
                _ = shutdown.recv() => break,
            }
        }
    })
}
