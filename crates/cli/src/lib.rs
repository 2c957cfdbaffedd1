pub mod cli;
pub mod commands;
pub mod config;

pub use tasklet_core as core;
pub use tasklet_core::capture;
pub use tasklet_core::model;
pub use tasklet_core::notify;
pub use tasklet_core::parser;

pub use tasklet_core::AppConfig;
