//! `AppState` construction, extracted from `main.rs` so the `serve` path
//! stays a thin sequence of calls into this module.

use std::sync::Arc;

use tr_domain::config::Config;

use crate::dispatcher;
use crate::state::AppState;

pub async fn build_app_state(config: &Config) -> anyhow::Result<AppState> {
    let store = Arc::new(tr_store::Store::new(&config.store.state_dir));
    tracing::info!(state_dir = %config.store.state_dir, "store ready");

    let collab = Arc::new(tr_collab::CollabClients::new(config.collaborators.clone()));
    tracing::info!("collaborator clients ready");

    let supervisor = tr_supervisor::Supervisor::new(config.supervisor.clamped());
    tracing::info!(
        artifacts_dir = %config.supervisor.artifacts_dir,
        "tool run supervisor ready"
    );
    let supervisor_cfg = config.supervisor.clamped();

    let dispatch_tx = dispatcher::spawn(dispatcher::DispatchCtx {
        store: Arc::clone(&store),
        collab: Arc::clone(&collab),
        supervisor_cfg: supervisor_cfg.clone(),
    });
    tracing::info!("pipeline dispatcher running");

    let state = AppState {
        store,
        collab,
        dispatch_tx,
        supervisor,
        supervisor_cfg,
    };

    recover_non_terminal_tasks(&state).await;

    Ok(state)
}

/// §10.5 startup recovery: re-enqueue every task left in a non-terminal
/// status from a previous run. Single-writer, single-dispatcher-worker
/// means re-running a task from wherever it left off is safe — the
/// dispatcher re-validates every transition it attempts.
async fn recover_non_terminal_tasks(state: &AppState) {
    let ids = state.store.non_terminal_task_ids().await;
    if ids.is_empty() {
        return;
    }
    tracing::info!(count = ids.len(), "recovering non-terminal tasks from previous run");
    for id in ids {
        let _ = state.dispatch_tx.send(id);
    }
}
