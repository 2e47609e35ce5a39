pub mod alternate;
pub mod bridge;
pub mod bridge_cache;
pub mod config;
pub mod error;
pub mod export;
pub mod load;
pub mod manifest;
pub mod resolve;
mod signature;

pub use alternate::{run_tasks, run_threads, AlternateConfig, StopSignal, Tick};
pub use bridge::Bridge;
pub use bridge_cache::{run_cached_bridge, run_cached_bridge_default};
pub use error::BridgeError;
pub use load::{load, load_library, load_with_platform, Function, NativeLibrary};
pub use signature::{ForeignSignature, Invoke};

/// Target triple this crate was built for; manifest platform keys are
/// matched against it.
pub const TARGET_TRIPLE: &str = env!("TARGET_TRIPLE");
