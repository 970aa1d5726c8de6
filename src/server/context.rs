// src/server/context.rs

use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::core::arbiter::Arbiter;
use crate::core::state::ServiceState;

/// Holds everything the event loop needs once startup has finished: the
/// shared service state, the bound UDP socket, the single Arbiter guarding
/// fragmented requests, and the machinery for a clean shutdown.
pub struct ServerContext {
    pub config: Config,
    pub state: Arc<ServiceState>,
    pub socket: Arc<UdpSocket>,
    pub arbiter: Arc<SyncMutex<Arbiter>>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<anyhow::Result<()>>,
}
