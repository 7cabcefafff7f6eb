pub mod ids;
pub mod timestamp;

pub use ids::*;
pub use timestamp::*;
