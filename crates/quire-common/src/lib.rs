//! Shared plumbing for the quire editor: the collaboration transport
//! contract and wire protocol, presence tracking, and telemetry setup.

#[cfg(feature = "telemetry")]
pub mod telemetry;
pub mod transport;

pub use blake3;
pub use smol_str::SmolStr;
