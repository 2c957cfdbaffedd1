pub use tasklet_cli::cli;
pub use tasklet_cli::commands;
pub use tasklet_cli::config;
pub use tasklet_cli::AppConfig;

pub use tasklet_core as core;
pub use tasklet_core::capture;
pub use tasklet_core::model;
pub use tasklet_core::notify;
pub use tasklet_core::parser;

pub use tasklet_live as live;
pub use tasklet_live::LiveConfig;
