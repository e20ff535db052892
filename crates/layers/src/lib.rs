pub mod cache;
pub mod feature;
pub mod labels;
pub mod overlay;
pub mod source;

pub use cache::*;
pub use feature::*;
pub use labels::*;
pub use overlay::*;
pub use source::*;
