pub mod application;
pub mod device;
pub mod engine;
pub mod event;
pub mod format;
pub mod installation;
pub mod settings;
pub mod unit;
