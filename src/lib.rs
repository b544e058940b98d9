pub mod apps;
pub mod audio;
pub mod common;
pub mod configs;
pub mod server;
pub mod session;
pub mod sources;
pub mod speech;
pub mod transport;
pub mod voice;

#[cfg(test)]
pub(crate) mod testutil;
