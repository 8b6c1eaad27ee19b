use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use tr_domain::config::SupervisorConfig;

/// Shared state behind both HTTP surfaces (Tracker and Tool Run
/// Supervisor). They're two separate router trees bound to two
/// listeners, but nothing stops them sharing one state struct — the
/// supervisor fields are simply unused by the tracker handlers and vice
/// versa.
#[derive(Clone)]
pub struct AppState {
    // ── Tracker ──
    pub store: Arc<tr_store::Store>,
    pub collab: Arc<tr_collab::CollabClients>,
    pub dispatch_tx: UnboundedSender<Uuid>,

    // ── Tool Run Supervisor ──
    pub supervisor: Arc<tr_supervisor::Supervisor>,
    pub supervisor_cfg: SupervisorConfig,
}
