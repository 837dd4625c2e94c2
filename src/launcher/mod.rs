//! Process/container launcher: spawning, signaling, inspecting, and
//! reaping a phase instance, behind one `Launcher` trait (spec §4.2).

pub mod container;
pub mod env;
pub mod host_process;
pub mod traits;

pub use container::ContainerLauncher;
pub use env::build_env;
pub use host_process::HostProcessLauncher;
pub use traits::{InstanceRef, Launcher};
