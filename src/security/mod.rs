//! Security checks applied to downloaded packages

pub mod integrity;

pub use integrity::IntegrityChecker;
