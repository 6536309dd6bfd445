pub mod error;
pub mod event;
pub mod job;
pub mod settings;
