//! Per-platform discovery adapters behind the `DiscoveryAdapter` trait.

use crate::core::catalog::DiscoveryAdapter;

#[cfg(target_os = "linux")]
mod linux;
mod simulated;
#[cfg(windows)]
pub(crate) mod windows;

#[cfg(target_os = "linux")]
pub use linux::LinuxAdapter;
pub use simulated::{SimulatedAdapter, SimulatorControl};
#[cfg(windows)]
pub use self::windows::WindowsAdapter;

/// Select the discovery adapter for this host. With `simulation` enabled an
/// in-memory fixture is used so runs never touch real devices.
pub fn get_adapter(simulation: bool) -> Box<dyn DiscoveryAdapter> {
    if simulation {
        return Box::new(SimulatedAdapter::with_fixture());
    }

    #[cfg(target_os = "linux")]
    return Box::new(LinuxAdapter::new());

    #[cfg(windows)]
    return Box::new(WindowsAdapter::new());

    #[cfg(not(any(target_os = "linux", windows)))]
    {
        tracing::warn!("No native discovery adapter for this platform, using simulation");
        Box::new(SimulatedAdapter::with_fixture())
    }
}
