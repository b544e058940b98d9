pub mod ids;
pub mod logger;
pub mod types;

pub use ids::*;
pub use types::*;
