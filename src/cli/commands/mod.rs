//! Subcommand implementations.

mod classify;
mod config_cmd;
mod discover;
mod images;
mod places;
mod run;

pub use classify::cmd_classify;
pub use config_cmd::cmd_config;
pub use discover::cmd_discover;
pub use images::cmd_images;
pub use places::cmd_places;
pub use run::cmd_run;
