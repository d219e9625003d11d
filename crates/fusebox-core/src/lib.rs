pub mod config;
pub mod consts;
pub mod error;
pub mod fusion;
pub mod orchestrator;
pub mod series;
pub mod sync;
pub mod synthetic;
pub mod viewport;
