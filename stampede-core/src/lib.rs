//! Plain data shared by the stampede engine: target configuration, operation outcomes and the
//! statistics derived from them.
mod config;
mod constants;
mod data;
mod error;
mod stats;

pub use config::*;
pub use constants::*;
pub use data::*;
pub use error::*;
pub use stats::*;
