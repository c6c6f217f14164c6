pub mod job;
pub mod outfit;
pub mod task;
pub mod upload;

pub use job::{
    Job, JobListQuery, JobStatus, JobType, JobUpdate, NewJob, TransitionRejected,
    PROGRESS_COMPLETE, PROGRESS_COMPUTED, PROGRESS_INPUTS_FETCHED, PROGRESS_INPUTS_VALIDATED,
};
pub use outfit::{HdRenderParams, PreviewParams};
pub use task::{HdRenderTaskPayload, NewTask, Task, TaskPayload, TaskStatus, TaskType};
pub use upload::{NewUpload, StoredImage, Upload, UploadType};
