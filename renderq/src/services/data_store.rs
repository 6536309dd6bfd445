pub mod json_job_store;
pub mod json_settings_store;
pub mod memory_store;
