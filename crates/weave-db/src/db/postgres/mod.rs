mod job;
mod task;
mod upload;

pub use job::PostgresJobRepository;
pub use task::PostgresTaskRepository;
pub use upload::PostgresUploadRepository;
