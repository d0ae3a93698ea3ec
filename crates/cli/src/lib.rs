//! Terminal front end of the Listen reader
//!
//! Maps line commands onto reader actions and saves progress on `save`,
//! `clear`, file loads and exit.

pub mod app;
pub mod command;
pub mod shell;

pub use app::{App, Flow, VoiceSources};
pub use command::{parse, Command, CommandError};
pub use shell::run_shell;
