//! The long-running `trust run` process (spec §5): wires every crate's
//! collaborator together, starts the scheduler and websocket hub, and then
//! serves the admin Unix-domain-socket loop until shut down.

use crate::config::AppConfig;
use crate::ipc::{self, DaemonCommand, DaemonResponse, IpcMessage, SchedulerStatusPayload};
use crate::wiring::{self, OwnedBrokerFacade};
use core_runtime::market_data::MarketDataFacade;
use core_runtime::risk::RiskEngine;
use core_runtime::strategy::StrategyEvaluator;
use db_sqlite::SqliteDatabase;
use ibkr_broker::IbkrBroker;
use model::{AccountId, Broker, DatabaseFactory, RuntimeError};
use position_sync::PositionSyncService;
use scheduler::Scheduler;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use ws_hub::{Hub, HubEventSink};

/// Everything the admin socket loop needs to service one [`DaemonCommand`].
struct DaemonContext {
    scheduler: Scheduler,
    broker: Arc<dyn Broker>,
    sync: Arc<PositionSyncService>,
    db: Arc<dyn DatabaseFactory>,
    account_id: AccountId,
    config: AppConfig,
    shutdown_notify: Arc<Notify>,
}

/// Builds every collaborator, starts background tasks, and serves the admin
/// socket until SIGINT/SIGTERM, per spec §5's shutdown sequence: cancel the
/// scheduler's loops and await their drain, stop the websocket streams and
/// keep-alive sweep, close the hub (each client gets a reason), then
/// disconnect the broker.
pub async fn run(config: AppConfig, socket_path: String) -> anyhow::Result<()> {
    let db: Arc<dyn DatabaseFactory> = Arc::new(SqliteDatabase::new(&config.database_path())?);
    let account_id = wiring::ensure_account(db.as_ref())?;

    let broker: Arc<dyn Broker> = Arc::new(IbkrBroker::new(
        config.broker.host.clone(),
        config.broker.port,
    ));
    if config.broker.connect_on_start {
        match broker.connect(
            &config.broker.host,
            config.broker.port,
            config.broker.client_id,
            config.broker_connect_timeout(),
        ) {
            Ok(()) => tracing::info!("connected to gateway at boot"),
            Err(err) => tracing::warn!(%err, "gateway connection at boot failed, will retry via the supervisor"),
        }
    }

    let market_data: Arc<dyn MarketDataFacade> = Arc::new(OwnedBrokerFacade::new(Arc::clone(&broker)));
    let evaluator = Arc::new(StrategyEvaluator::new(config.strategy_instances()));
    let risk = Arc::new(RiskEngine::new(config.risk_config()));
    let sync = Arc::new(PositionSyncService::new(config.sync_config()));

    let hub = Arc::new(Hub::new(config.hub_config()));
    let sink: Arc<dyn model::EventSink> = Arc::new(HubEventSink::new(Arc::clone(&hub)));

    let shutdown = CancellationToken::new();
    let mut background_tasks = Vec::new();

    if config.websocket.enabled {
        background_tasks.push(ws_hub::spawn_keepalive_sweep(Arc::clone(&hub), shutdown.clone()));

        let symbols: Vec<String> = config.strategies.iter().map(|s| s.symbol.clone()).collect();
        let price_interval = Duration::from_secs(config.websocket.price_update_interval_secs);
        background_tasks.push(tokio::spawn(ws_hub::streams::price_stream::run(
            Arc::clone(&hub),
            Arc::clone(&broker),
            symbols,
            price_interval,
            shutdown.clone(),
        )));

        let portfolio_interval = Duration::from_secs(config.websocket.portfolio_update_interval_secs);
        background_tasks.push(tokio::spawn(ws_hub::streams::portfolio_stream::run(
            Arc::clone(&hub),
            Arc::clone(&db),
            account_id,
            portfolio_interval,
            shutdown.clone(),
        )));

        let bind_addr = config.bind_addr.clone();
        let router = ws_hub::server::router(Arc::clone(&hub));
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
        tracing::info!(%bind_addr, "websocket server listening");
        let server_shutdown = shutdown.clone();
        background_tasks.push(tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await });
            if let Err(err) = serve.await {
                tracing::error!(%err, "websocket server exited");
            }
        }));
    }

    background_tasks.push(tokio::spawn(balance_refresh_loop(
        Arc::clone(&risk),
        Arc::clone(&db),
        Arc::clone(&broker),
        account_id,
        config.risk_config().balance_cache_ttl,
        shutdown.clone(),
    )));

    let scheduler = Scheduler::new(
        config.scheduler_config(),
        account_id,
        Arc::clone(&broker),
        Arc::clone(&db),
        market_data,
        evaluator,
        risk,
        Arc::clone(&sync),
        sink,
    );
    if config.scheduler.enabled {
        scheduler.start().await?;
    }

    let shutdown_notify = Arc::new(Notify::new());
    let context = Arc::new(DaemonContext {
        scheduler: scheduler.clone(),
        broker: Arc::clone(&broker),
        sync,
        db,
        account_id,
        config,
        shutdown_notify: Arc::clone(&shutdown_notify),
    });

    let _ = std::fs::remove_file(&socket_path);
    if let Some(parent) = Path::new(&socket_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(&socket_path)?;
    tracing::info!(socket = %socket_path, "admin socket listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        let context = Arc::clone(&context);
                        tokio::spawn(async move {
                            if let Err(err) = serve_connection(stream, &context).await {
                                tracing::warn!(%err, "admin connection ended with an error");
                            }
                        });
                    }
                    Err(err) => tracing::warn!(%err, "failed to accept admin connection"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
            _ = terminate_signal() => {
                tracing::info!("terminate signal received");
                break;
            }
            _ = shutdown_notify.notified() => {
                tracing::info!("shutdown requested over the admin socket");
                break;
            }
        }
    }

    shutdown.cancel();
    scheduler.stop().await?;
    for task in background_tasks {
        let _ = task.await;
    }
    hub.close_all("shutting down");
    broker.disconnect();
    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(_) => std::future::pending::<()>().await,
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await
}

/// Keeps gate 1's account balance fresh independent of any evaluation tick
/// (spec §4.4): `RiskEngine::refresh_account` is itself TTL-cached, so
/// ticking faster than `balance_cache_ttl` is harmless.
async fn balance_refresh_loop(
    risk: Arc<RiskEngine>,
    db: Arc<dyn DatabaseFactory>,
    broker: Arc<dyn Broker>,
    account_id: AccountId,
    ttl: Duration,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(ttl) => {}
            _ = token.cancelled() => break,
        }

        if !broker.is_connected() {
            continue;
        }
        let broker = Arc::clone(&broker);
        let result = risk.refresh_account(db.as_ref(), account_id, move || {
            let summary = broker
                .account_summary()
                .map_err(|e| RuntimeError::new(model::ErrorKind::Unavailable, e.to_string()))?;
            Ok((summary.net_liquidation, summary.total_cash))
        });
        if let Err(err) = result {
            tracing::warn!(%err, "account balance refresh failed");
        }
    }
}

async fn serve_connection(mut stream: UnixStream, context: &DaemonContext) -> Result<(), ipc::IpcError> {
    let message: IpcMessage<DaemonCommand> = ipc::read_frame(&mut stream).await?;
    let shutdown_requested = matches!(message.payload, DaemonCommand::Shutdown);
    let response = handle_command(context, message.payload).await;
    ipc::write_frame(&mut stream, &IpcMessage::new(response)).await?;

    if shutdown_requested {
        context.shutdown_notify.notify_one();
    }
    Ok(())
}

async fn handle_command(context: &DaemonContext, command: DaemonCommand) -> DaemonResponse {
    match command {
        DaemonCommand::SchedulerStatus => {
            let status = context.scheduler.status();
            DaemonResponse::SchedulerStatus(SchedulerStatusPayload {
                state: status.state.to_string(),
                evaluations_run: status.stats.evaluations_run,
                signals_generated: status.stats.signals_generated,
                trades_executed: status.stats.trades_executed,
                trades_rejected: status.stats.trades_rejected,
                errors: status.stats.errors,
                monitored_positions: status.stats.monitored_positions,
                uptime_seconds: status.stats.uptime_seconds.unwrap_or(0),
                last_evaluation: status.stats.last_evaluation.map(|t| t.timestamp()),
                last_trade: status.stats.last_trade.map(|t| t.timestamp()),
            })
        }
        DaemonCommand::SchedulerStart => match context.scheduler.start().await {
            Ok(()) => DaemonResponse::Ok,
            Err(err) => DaemonResponse::Error(err.to_string()),
        },
        DaemonCommand::SchedulerStop => match context.scheduler.stop().await {
            Ok(()) => DaemonResponse::Ok,
            Err(err) => DaemonResponse::Error(err.to_string()),
        },
        DaemonCommand::SchedulerPause => match context.scheduler.pause() {
            Ok(()) => DaemonResponse::Ok,
            Err(err) => DaemonResponse::Error(err.to_string()),
        },
        DaemonCommand::SchedulerResume => match context.scheduler.resume() {
            Ok(()) => DaemonResponse::Ok,
            Err(err) => DaemonResponse::Error(err.to_string()),
        },
        DaemonCommand::BrokerConnect => {
            let result = context.broker.connect(
                &context.config.broker.host,
                context.config.broker.port,
                context.config.broker.client_id,
                context.config.broker_connect_timeout(),
            );
            match result {
                Ok(()) => DaemonResponse::Ok,
                Err(err) => DaemonResponse::Error(err.to_string()),
            }
        }
        DaemonCommand::BrokerDisconnect => {
            context.broker.disconnect();
            DaemonResponse::Ok
        }
        DaemonCommand::BrokerStatus => DaemonResponse::BrokerStatus(context.broker.is_connected()),
        DaemonCommand::SyncNow => {
            match context.sync.sync(context.db.as_ref(), context.broker.as_ref(), context.account_id) {
                Ok(position_sync::SyncOutcome::Completed(outcome)) => {
                    DaemonResponse::SyncNow(format!("completed: {outcome:?}"))
                }
                Ok(position_sync::SyncOutcome::Busy) => DaemonResponse::SyncNow("busy".to_string()),
                Ok(position_sync::SyncOutcome::Debounced) => DaemonResponse::SyncNow("debounced".to_string()),
                Err(err) => DaemonResponse::Error(err.to_string()),
            }
        }
        DaemonCommand::Shutdown => DaemonResponse::Ok,
    }
}

