pub mod clock;
pub mod debounce;
pub mod generation;
pub mod metrics;

pub use clock::*;
pub use debounce::*;
pub use generation::*;
pub use metrics::*;
