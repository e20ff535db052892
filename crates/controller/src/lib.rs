pub mod config;
pub mod controller;
pub mod error;
pub mod logging;

pub use config::*;
pub use controller::*;
pub use error::*;
