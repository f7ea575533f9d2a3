//! Best-effort used-space queries for mounted filesystems.
//!
//! The orchestrator sums these per target partition when a job starts; a
//! failing probe contributes zero rather than aborting the job.

use std::path::Path;

use anyhow::Result;

pub trait SpaceProbe: Send + Sync {
    /// Bytes in use on the filesystem mounted at `mount_point`.
    fn used_bytes(&self, mount_point: &Path) -> Result<u64>;
}

/// Probe backed by the platform's free-space query.
pub struct PlatformSpaceProbe;

#[cfg(unix)]
impl SpaceProbe for PlatformSpaceProbe {
    fn used_bytes(&self, mount_point: &Path) -> Result<u64> {
        let stat = nix::sys::statvfs::statvfs(mount_point)?;
        let fragment = stat.fragment_size() as u64;
        let total = stat.blocks() as u64 * fragment;
        let free = stat.blocks_free() as u64 * fragment;
        Ok(total.saturating_sub(free))
    }
}

#[cfg(windows)]
impl SpaceProbe for PlatformSpaceProbe {
    fn used_bytes(&self, mount_point: &Path) -> Result<u64> {
        use windows::Win32::Storage::FileSystem::GetDiskFreeSpaceExW;
        use windows::core::PCWSTR;

        let wide = crate::adapters::windows::wide(&mount_point.to_string_lossy());
        let mut free_to_caller = 0u64;
        let mut total = 0u64;
        let mut total_free = 0u64;
        unsafe {
            GetDiskFreeSpaceExW(
                PCWSTR(wide.as_ptr()),
                Some(&mut free_to_caller),
                Some(&mut total),
                Some(&mut total_free),
            )?;
        }
        Ok(total.saturating_sub(total_free))
    }
}

/// Probe returning a constant value, for tests and simulated runs.
pub struct FixedSpaceProbe(pub u64);

impl SpaceProbe for FixedSpaceProbe {
    fn used_bytes(&self, _mount_point: &Path) -> Result<u64> {
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn platform_probe_answers_for_temp_dir() {
        let probe = PlatformSpaceProbe;
        let result = probe.used_bytes(&std::env::temp_dir());
        assert!(result.is_ok());
    }

    #[test]
    fn fixed_probe_returns_configured_value() {
        let probe = FixedSpaceProbe(12_345);
        assert_eq!(probe.used_bytes(Path::new("/nowhere")).unwrap(), 12_345);
    }
}
