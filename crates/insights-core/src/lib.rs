pub mod config;
pub mod error;
pub mod panel;
pub mod seed;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::*;
pub use panel::*;
pub use seed::{derive_seed, resolve_seed, stream_rng};
pub use traits::*;
pub use types::*;
