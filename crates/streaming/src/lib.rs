pub mod cache;
pub mod demand;
pub mod error;
pub mod loader;
pub mod protocol;
pub mod provider;
pub mod source;
pub mod tile;

pub use cache::*;
pub use demand::*;
pub use error::*;
pub use loader::*;
pub use provider::*;
pub use source::*;
pub use tile::*;
