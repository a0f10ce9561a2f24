//! CLI command implementations

pub mod init;
pub mod install;
pub mod list;
pub mod run;
pub mod uninstall;
