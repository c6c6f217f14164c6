//! Application state shared by every handler and by the HD render worker.

use std::sync::Arc;

use weave_compositing::{TextureCompositor, UploadValidator};
use weave_core::Config;
use weave_db::{JobRepository, UploadRepository};
use weave_inference::{GenerativeCompositor, SegmentationService};
use weave_storage::Storage;
use weave_worker::TaskQueue;

/// Document stores. Uploads and jobs are the only persisted collections.
#[derive(Clone)]
pub struct DbState {
    pub uploads: Arc<dyn UploadRepository>,
    pub jobs: Arc<dyn JobRepository>,
}

/// Compositing engines and the checks applied before them.
#[derive(Clone)]
pub struct CompositingState {
    pub texture: TextureCompositor,
    pub generative: GenerativeCompositor,
    pub segmentation: SegmentationService,
    pub validator: UploadValidator,
}

#[derive(Clone)]
pub struct AppState {
    pub db: DbState,
    pub storage: Arc<dyn Storage>,
    pub compositing: CompositingState,
    pub task_queue: TaskQueue,
    pub config: Config,
    pub is_production: bool,
}

impl AppState {
    /// Storage key prefix for objects of the given kind, e.g. `styleweave/masks`.
    pub fn storage_prefix(&self, kind: &str) -> String {
        format!("{}/{}", self.config.storage_folder(), kind)
    }
}

impl axum::extract::FromRef<Arc<AppState>> for DbState {
    fn from_ref(state: &Arc<AppState>) -> Self {
        state.db.clone()
    }
}

fn _assert_app_state_send_sync() {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}
    assert_send::<AppState>();
    assert_sync::<AppState>();
}
