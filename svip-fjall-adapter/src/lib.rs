//! Fjall backend for SVIP.
//!
//! Keeps application state in a [Fjall](https://docs.rs/fjall) keyspace together
//! with its version marker, and backs it up as a full keyspace copy on disk.

mod backend;
mod config;
mod state;
mod version;
mod wrapper;

pub use backend::*;
pub use config::*;
pub use state::FjallState;
pub use wrapper::{FjallCodecError, FjallCodecResult};
