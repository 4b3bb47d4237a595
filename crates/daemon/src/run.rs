// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level daemon runner — shared by `main` and integration tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use teleclaude_bridge::{MemoryStore, SessionRegistry, Store, TerminalBridge};
use teleclaude_relay::RelayHub;
use teleclaude_todo::{AgentAvailability, ShellGateRunner};

use crate::availability::AvailabilityTracker;
use crate::config::Config;
use crate::control::{build_router, ControlState};
use crate::dispatch::Orchestrator;
use crate::federation::ComputerRegistry;

/// Reserved exit code meaning "please restart me for deployment". The
/// daemon is not self-restarting; a service manager interprets this.
pub const EXIT_RESTART_REQUESTED: i32 = 42;

pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

pub struct RunHandles {
    pub shutdown: CancellationToken,
    pub control_socket: String,
}

/// Wires the kernel together, binds the control socket, starts the
/// heartbeat task (if federation is configured by presence of a
/// `TELECLAUDE_COMPUTER_ID`), and reconciles the session registry against
/// live panes before accepting control requests.
pub async fn run(config: Config) -> anyhow::Result<RunHandles> {
    config.validate()?;
    init_tracing(&config);

    let shutdown = CancellationToken::new();

    let bridge = Arc::new(TerminalBridge::new(config.ring_size));
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let registry = Arc::new(SessionRegistry::new(Arc::clone(&bridge), Arc::clone(&store)));
    let relay_hub = Arc::new(RelayHub::new(Arc::new(RelaySessionSink {
        registry: Arc::clone(&registry),
        bridge: Arc::clone(&bridge),
    })));
    let availability: Arc<AvailabilityTracker> = Arc::new(AvailabilityTracker::new());
    let gate_runner = Arc::new(ShellGateRunner::new(vec![]));

    let tombstoned = registry.reconcile().await;
    if !tombstoned.is_empty() {
        warn!(count = tombstoned.len(), "reconciled orphaned sessions on startup");
    }

    if let Ok(computer_id) = std::env::var("TELECLAUDE_COMPUTER_ID") {
        let computer_registry = Arc::new(ComputerRegistry::new(computer_id, Arc::clone(&store)));
        let heartbeat_interval = Duration::from_secs(config.heartbeat_secs);
        let heartbeat_shutdown = shutdown.clone();
        tokio::spawn(async move {
            computer_registry.run_heartbeat(heartbeat_interval, heartbeat_shutdown).await;
        });
    }

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&bridge),
        Arc::clone(&registry),
        Arc::clone(&relay_hub),
        availability.clone() as Arc<dyn AgentAvailability + Send + Sync>,
        gate_runner,
        config.project_root.clone(),
        config.max_review_rounds,
    ));

    let orchestrator_shutdown = shutdown.clone();
    tokio::spawn(async move {
        run_orchestrator_loop(orchestrator, orchestrator_shutdown).await;
    });

    let control_state = Arc::new(ControlState {
        registry: Arc::clone(&registry),
        bridge: Arc::clone(&bridge),
        relay_hub: Arc::clone(&relay_hub),
        availability: Arc::clone(&availability),
        project_root: config.project_root.clone(),
        max_review_rounds: config.max_review_rounds,
        gathering_config: crate::gathering::GatheringConfig {
            rounds_per_phase: config.gathering_rounds_per_phase,
            beats_per_turn: config.gathering_beats_per_turn,
            beat_interval: Duration::from_secs(config.gathering_beat_interval_secs),
            harvest_timeout: Duration::from_secs(config.gathering_harvest_timeout_secs),
        },
    });
    let router = build_router(control_state);

    let _ = std::fs::remove_file(&config.socket);
    let listener = UnixListener::bind(&config.socket)?;
    info!(socket = %config.socket, "control surface listening");

    let serve_shutdown = shutdown.clone();
    let socket_path = config.socket.clone();
    tokio::spawn(async move {
        let mut make_service = router.into_make_service();
        loop {
            tokio::select! {
                _ = serve_shutdown.cancelled() => break,
                accept = listener.accept() => {
                    match accept {
                        Ok((stream, _)) => {
                            let svc_future = <_ as tower::Service<_>>::call(&mut make_service, ());
                            tokio::spawn(async move {
                                let Ok(svc) = svc_future.await;
                                let io = hyper_util::rt::TokioIo::new(stream);
                                let hyper_svc = hyper_util::service::TowerToHyperService::new(svc);
                                let _ = hyper_util::server::conn::auto::Builder::new(
                                    hyper_util::rt::TokioExecutor::new(),
                                )
                                .serve_connection_with_upgrades(io, hyper_svc)
                                .await;
                            });
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "control socket accept error");
                        }
                    }
                }
            }
        }
        let _ = std::fs::remove_file(&socket_path);
    });

    spawn_signal_handlers(Arc::clone(&registry), shutdown.clone());

    Ok(RunHandles { shutdown, control_socket: config.socket })
}

/// Drives every in-progress work item forward, one `step()` at a time,
/// until shutdown. Errors surface as log entries; a blocked slug simply
/// waits for its next scheduled attempt.
async fn run_orchestrator_loop(orchestrator: Arc<Orchestrator>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("orchestrator loop stopping");
                return;
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }

        match orchestrator.step(None).await {
            Ok(crate::dispatch::DriveOutcome::Completed { slug, archive_path }) => {
                info!(slug = %slug, archive_path = %archive_path, "work item complete");
            }
            Ok(crate::dispatch::DriveOutcome::Blocked { slug, code, message }) => {
                if code != "NO_WORK" {
                    warn!(slug = %slug, code = %code, message = %message, "work item blocked");
                }
            }
            Ok(crate::dispatch::DriveOutcome::AwaitingMore) => {}
            Err(e) => error!(error = %e, "orchestrator step failed"),
        }
    }
}

/// On SIGHUP-equivalent, reload configuration (the process re-reads its
/// env/args on next loop tick) and reconcile the session registry against
/// live panes. SIGTERM/SIGINT request graceful shutdown.
fn spawn_signal_handlers(registry: Arc<SessionRegistry>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to install SIGHUP handler");
                return;
            }
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    info!("SIGHUP received: reconciling session registry");
                    registry.reconcile().await;
                }
                _ = sigterm.recv() => {
                    info!("SIGTERM received: shutting down");
                    shutdown.cancel();
                    return;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("ctrl-c received: shutting down");
                    shutdown.cancel();
                    return;
                }
            }
        }
    });
}

/// Delivers relay fan-out into a peer session's pane via the bridge,
/// appending the relay's exit marker so the receiving poller doesn't
/// mistake the attributed text for the peer's own output boundary.
struct RelaySessionSink {
    registry: Arc<SessionRegistry>,
    bridge: Arc<TerminalBridge>,
}

#[async_trait::async_trait]
impl teleclaude_relay::RelaySink for RelaySessionSink {
    async fn deliver(&self, session_id: &str, text: &str) -> anyhow::Result<()> {
        let session = self
            .registry
            .get(session_id)
            .await
            .ok_or_else(|| anyhow::anyhow!("relay target session {session_id} not found"))?;
        self.bridge.send_input(&session.terminal_handle, text, false).await?;
        Ok(())
    }
}
