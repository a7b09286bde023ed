mod api;
mod config;
mod constants;
mod logging;
mod worker;

use anyhow::Context;
use clap::Parser;
use ledger_core::chain::{Chain, ChainStore};
use ledger_storage::SledStore;
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, warn};

use crate::{api::AppState, config::Args, constants::DEFAULT_LOG_LEVEL, worker::MiningPool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init_logging(DEFAULT_LOG_LEVEL, args.log_format);

    let store = Arc::new(SledStore::open(&args.data_dir)?);
    let chain = Chain::with_config(store, args.chain_config());
    let genesis = chain.ensure_genesis().context("bootstrapping genesis block")?;
    info!(hash = %genesis.hash, "genesis ready");

    let pool = Arc::new(MiningPool::new(
        args.mining_threads(),
        args.max_pending_appends,
        args.mining_timeout(),
    )?);
    let app = api::router(AppState::new(chain.clone(), pool.clone()));

    let addr: SocketAddr = args.listen.parse()?;
    info!(
        threads = args.mining_threads(),
        pending = args.max_pending_appends,
        "ledger-node listening on http://{addr}"
    );
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            pool.close();
        })
        .await?;

    chain.store().close()?;
    info!("ledger-node stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(err) => {
            warn!(error = %err, "cannot listen for ctrl-c, running until killed");
            std::future::pending::<()>().await;
        }
    }
}
