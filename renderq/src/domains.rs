pub mod job_store;
pub mod settings_store;
