pub(crate) mod grading;
pub(crate) mod jobs;
