pub mod cli_app;
pub mod data_store;
pub mod event_sink;
pub mod job_queue;
pub mod session;
