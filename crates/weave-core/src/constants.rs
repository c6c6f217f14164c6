//! Application-wide constants.

/// Versioned prefix for every domain route.
pub const API_PREFIX: &str = "/v1";

/// Prompt used for HD renders when the request leaves it empty.
pub const DEFAULT_HD_PROMPT: &str = "Realistic clothing fabric matching reference";

/// Key prefix for every object written to storage.
pub const DEFAULT_STORAGE_FOLDER: &str = "styleweave";

/// Error recorded on running jobs that the stale reaper gives up on.
pub const STALE_JOB_ERROR: &str = "job abandoned by worker";

/// Prefix of the error recorded on a job whose task was abandoned before a
/// worker ever picked the job up.
pub const DISPATCH_GAVE_UP_ERROR: &str = "dispatch gave up before start";

/// Largest swatch scale accepted by the preview endpoint.
pub const MAX_PREVIEW_SCALE: f32 = 16.0;

/// Upper bound for `GET /jobs?limit=`.
pub const MAX_JOB_LIST_LIMIT: i64 = 200;
pub const DEFAULT_JOB_LIST_LIMIT: i64 = 50;
