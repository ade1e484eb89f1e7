pub mod face_analyzer;
pub mod frame_queue;
pub mod infrastructure;
pub mod perf_monitor;
pub mod result_mailbox;
pub mod submission_throttle;
pub mod worker_config;
