// src/server/connection_loop.rs

//! The single event loop (spec §5): one `tokio::select!` over shutdown
//! signals, background-task completion, observer-forwarding tasks, and the
//! next UDP datagram. Every mutation to the owned arenas happens on this
//! task, through `ServiceState::with_core` — no other task ever locks it
//! directly for a write.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use serde_json::json;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::context::ServerContext;
use crate::core::arbiter::{Arbiter, BlockOutcome, LockTag, RequestOrigin};
use crate::core::dispatch::{self, ResourceKind};
use crate::core::errors::ServiceError;
use crate::core::protocol::{Method, Request, Response, ResponseCode};
use crate::core::state::ServiceState;

/// Largest single UDP datagram this Service accepts (spec §4.B: larger
/// payloads must arrive as multiple Block1 chunks).
const MAX_DATAGRAM_BYTES: usize = 2048;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = sigint.recv() => info!("SIGINT received, shutting down"),
            _ = sigterm.recv() => info!("SIGTERM received, shutting down"),
        }
    }
    #[cfg(windows)]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl-C received, shutting down");
    }
}

/// Runs the event loop until a shutdown signal arrives.
pub async fn run(mut ctx: ServerContext) {
    let mut recv_buf = vec![0u8; MAX_DATAGRAM_BYTES];
    let mut observer_tasks: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = await_shutdown_signal() => break,

            Some(res) = ctx.background_tasks.join_next(), if !ctx.background_tasks.is_empty() => {
                match res {
                    Ok(Ok(())) => info!("a background task completed"),
                    Ok(Err(e)) => { warn!("background task failed: {e}"); }
                    Err(e) => { warn!("background task panicked: {e:?}"); }
                }
            }

            Some(res) = observer_tasks.join_next(), if !observer_tasks.is_empty() => {
                if let Err(e) = res && e.is_panic() {
                    warn!("an observer-forwarding task panicked: {e:?}");
                }
            }

            res = ctx.socket.recv_from(&mut recv_buf) => {
                match res {
                    Ok((len, peer)) => {
                        handle_datagram(
                            &ctx.state,
                            &ctx.arbiter,
                            &ctx.socket,
                            &recv_buf[..len],
                            peer,
                            &ctx.shutdown_tx,
                            &mut observer_tasks,
                        )
                        .await;
                    }
                    Err(e) => warn!("UDP recv error: {e}"),
                }
            }
        }
    }

    info!("shutting down, signalling background tasks");
    let _ = ctx.shutdown_tx.send(());
    observer_tasks.shutdown().await;
    while ctx.background_tasks.join_next().await.is_some() {}
    info!("shutdown complete");
}

#[tracing::instrument(skip(state, arbiter, socket, bytes, shutdown_tx, observer_tasks), fields(%peer))]
async fn handle_datagram(
    state: &Arc<ServiceState>,
    arbiter: &Arc<parking_lot::Mutex<Arbiter>>,
    socket: &Arc<UdpSocket>,
    bytes: &[u8],
    peer: SocketAddr,
    shutdown_tx: &broadcast::Sender<()>,
    observer_tasks: &mut JoinSet<()>,
) {
    let request = match Request::decode(bytes) {
        Ok(r) => r,
        Err(e) => {
            warn!("dropping malformed datagram from {peer}: {e}");
            return;
        }
    };

    let (resource, tail) = match ResourceKind::match_path(&request.uri_path) {
        Ok(pair) => pair,
        Err(e) => {
            send_error(socket, peer, &request, e).await;
            return;
        }
    };

    let origin = RequestOrigin {
        addr: peer,
        message_id: request.message_id,
    };
    let tag = LockTag {
        resource,
        method: request.method,
        origin,
    };

    let (is_final, chunk) = match &request.block1 {
        Some(block1) => (!block1.more, request.payload.as_slice()),
        None => (true, request.payload.as_slice()),
    };

    let outcome = {
        let mut guard = arbiter.lock();
        guard.accept_block(tag, chunk, is_final)
    };

    let method_label = request.method.to_string();
    crate::core::metrics::REQUESTS_TOTAL
        .with_label_values(&[resource.base_path(), method_label.as_str()])
        .inc();

    let response = match outcome {
        Ok(BlockOutcome::Continuation) => {
            Response::empty(ResponseCode::Continue, request.message_id, request.token.clone())
        }
        Ok(BlockOutcome::Replay(cached)) => cached,
        Ok(BlockOutcome::Complete(payload)) => {
            let response = process_request(state, resource, &request, tail, &payload);
            let mut guard = arbiter.lock();
            guard.remember(origin, response.clone());
            response
        }
        Err(e) => {
            if matches!(e, ServiceError::Busy(_)) {
                crate::core::metrics::ARBITER_CONTENTION_TOTAL.inc();
            }
            let mut guard = arbiter.lock();
            guard.release();
            drop(guard);
            build_error_response(&request, e)
        }
    };

    crate::core::metrics::RESPONSES_TOTAL
        .with_label_values(&[&format!("{:?}", response.code)])
        .inc();

    let should_observe = request.observe_register
        && request.method == Method::Get
        && resource.is_observable()
        && response.code == ResponseCode::Content;

    if socket.send_to(&response.encode(), peer).await.is_err() {
        warn!("failed to send response to {peer}");
        return;
    }

    if should_observe {
        spawn_observer_task(
            state.clone(),
            socket.clone(),
            resource,
            peer,
            request.token.clone(),
            shutdown_tx.subscribe(),
            observer_tasks,
        );
    }
}

fn process_request(
    state: &ServiceState,
    resource: ResourceKind,
    request: &Request,
    tail: &str,
    payload: &[u8],
) -> Response {
    if let Err(e) = dispatch::negotiate(request.accept.as_deref()) {
        return build_error_response(request, e);
    }
    let query = dispatch::Query(request.query.clone());
    match dispatch::dispatch(state, resource, request.method, tail, &query, payload) {
        Ok(route_response) => {
            let code = ResponseCode::from(route_response.status);
            Response::json(code, request.message_id, request.token.clone(), route_response.body)
        }
        Err(e) => build_error_response(request, e),
    }
}

fn build_error_response(request: &Request, error: ServiceError) -> Response {
    let code = ResponseCode::from(error.status_code());
    let body = serde_json::to_vec(&json!({ "error": error.diagnostic() })).unwrap_or_default();
    Response::json(code, request.message_id, request.token.clone(), body)
}

async fn send_error(socket: &UdpSocket, peer: SocketAddr, request: &Request, error: ServiceError) {
    let response = build_error_response(request, error);
    let _ = socket.send_to(&response.encode(), peer).await;
}

/// Spawns a task forwarding a resource's notifications to one subscribed
/// peer until shutdown or the channel lags/closes (spec §4.F "Observe").
fn spawn_observer_task(
    state: Arc<ServiceState>,
    socket: Arc<UdpSocket>,
    resource: ResourceKind,
    peer: SocketAddr,
    token: Vec<u8>,
    mut shutdown_rx: broadcast::Receiver<()>,
    observer_tasks: &mut JoinSet<()>,
) {
    let Some(mut rx) = state.observers.subscribe(resource) else {
        return;
    };
    let message_ids = AtomicU16::new(1);

    observer_tasks.spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                note = rx.recv() => {
                    match note {
                        Ok(notification) => {
                            if notification.uri_path != resource.base_path() {
                                continue;
                            }
                            let message_id = message_ids.fetch_add(1, Ordering::Relaxed);
                            let bytes = notification.encode(token.clone(), message_id);
                            if socket.send_to(&bytes, peer).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    }
                }
            }
        }
    });
}
