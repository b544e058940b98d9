pub mod container;
pub mod output;
pub mod registry;
pub mod signals;
pub mod supervisor;

pub use container::Container;
pub use output::{OutputGrant, SharedOutput};
pub use registry::SessionRegistry;
pub use signals::{SIGNAL_TIMEOUT, SignalBus};
pub use supervisor::VoiceSession;
