pub mod audio;
pub mod base;
pub mod logging;
pub mod player;
pub mod server;
pub mod sources;
pub mod speech;

pub use audio::*;
pub use base::*;
pub use logging::*;
pub use player::*;
pub use server::*;
pub use sources::*;
pub use speech::*;
