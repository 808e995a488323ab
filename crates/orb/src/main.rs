use std::sync::Arc;

use orb_core::{config::Config, state::RelayState, store::StateStore};

#[tokio::main]
async fn main() -> Result<(), orb_core::Error> {
    orb_core::logging::init("orb")?;

    let cfg = Arc::new(Config::load()?);
    let state = Arc::new(RelayState::open(StateStore::new(cfg.state_file.clone())));

    let result = orb_telegram::router::run_polling(cfg, state.clone())
        .await
        .map_err(|e| orb_core::Error::Transport(format!("telegram bot failed: {e}")));

    // Final snapshot, even when the dispatcher failed.
    if let Err(e) = state.flush().await {
        tracing::error!(error = %e, "final state flush failed");
    }

    result
}
