pub mod tasks;

pub use tasks::TaskManager;
