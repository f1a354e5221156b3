//! Parlance Core — shared turn types, error taxonomy, configuration.

pub mod config;
pub mod error;
pub mod turn;

pub use config::{DataPaths, PipelineConfig};
pub use error::{Error, Result};
pub use turn::{now_millis, NewTurn, Role, Turn};
