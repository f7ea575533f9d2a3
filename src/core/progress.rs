//! Progress events emitted by a running wipe job, plus the display helpers
//! the CLI uses to render them.

use serde::Serialize;

/// Everything a consumer receives about one job: a stream of progress
/// snapshots followed by exactly one terminal outcome.
#[derive(Debug, Clone)]
pub enum WipeEvent {
    Progress(WipeProgress),
    Finished(WipeOutcome),
}

/// Immutable snapshot of a job's advancement. Published over the event
/// channel; never shared by reference with the worker.
#[derive(Debug, Clone, Serialize)]
pub struct WipeProgress {
    /// Accumulated bytes scaled against the *capacity* of the target set,
    /// not the bytes actually present. Rarely reaches 1.0 except through
    /// the final completion override.
    pub fraction_complete: f64,
    /// Display-shortened path of the file most recently accounted for.
    pub current_path: String,
    pub accumulated_bytes: u64,
    pub total_used_bytes: u64,
    /// 1-based position of the partition being walked.
    pub partition_index: usize,
    pub partition_count: usize,
}

/// Terminal state of a job. A cancel is always distinguishable from a
/// failure so consumers do not alarm the user on an intentional stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum WipeOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

impl WipeOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            WipeOutcome::Completed => 0,
            WipeOutcome::Failed(_) => 1,
            WipeOutcome::Cancelled => 2,
        }
    }
}

/// Capacity-relative completion fraction.
pub fn fraction(accumulated_bytes: u64, total_partition_bytes: u64) -> f64 {
    if total_partition_bytes == 0 {
        return 0.0;
    }
    accumulated_bytes as f64 / total_partition_bytes as f64
}

/// Shorten a path for single-line display: deep directory chains collapse
/// to `root/.../parent/dir` and components longer than ten characters are
/// squeezed to `first5[...]last5`, keeping the file extension intact.
pub fn shorten_path(path: &str) -> String {
    let clean = path.replace('\\', "/");

    let Some((dir, file)) = clean.rsplit_once('/') else {
        return clean;
    };
    if file.is_empty() {
        return clean;
    }

    let dir_parts: Vec<&str> = dir.split('/').collect();
    let short_dir: Vec<String> = if dir_parts.len() > 3 {
        let mut parts = vec![dir_parts[0].to_string(), "...".to_string()];
        for part in &dir_parts[dir_parts.len() - 2..] {
            parts.push(shorten_component(part));
        }
        parts
    } else {
        dir_parts.iter().map(|p| p.to_string()).collect()
    };

    let (stem, ext) = match file.rfind('.') {
        Some(idx) if idx > 0 => file.split_at(idx),
        _ => (file, ""),
    };
    let short_file = if stem.chars().count() > 10 {
        format!("{}{}", shorten_component(stem), ext)
    } else {
        file.to_string()
    };

    format!("{}/{}", short_dir.join("/"), short_file)
}

fn shorten_component(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() <= 10 {
        return name.to_string();
    }
    let head: String = chars[..5].iter().collect();
    let tail: String = chars[chars.len() - 5..].iter().collect();
    format!("{head}[...]{tail}")
}

/// Binary-unit byte formatting for progress lines ("4.7 GiB").
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];
    let mut unit_index = 0;
    let mut value = bytes as f64;

    while value >= 1024.0 && unit_index < UNITS.len() - 1 {
        value /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{value:.1} {}", UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_guards_zero_capacity() {
        assert_eq!(fraction(1024, 0), 0.0);
        assert!((fraction(600, 5_000_000_000) - 1.2e-7).abs() < 1e-12);
    }

    #[test]
    fn shallow_paths_pass_through() {
        assert_eq!(shorten_path("/mnt/data/a.txt"), "/mnt/data/a.txt");
    }

    #[test]
    fn deep_paths_collapse_to_last_two_directories() {
        assert_eq!(
            shorten_path("/home/user/projects/archive/report.pdf"),
            "/.../projects/archive/report.pdf"
        );
    }

    #[test]
    fn long_components_are_squeezed() {
        assert_eq!(
            shorten_path("/a/b/c/averylongdirectoryname/file.txt"),
            "/.../c/avery[...]yname/file.txt"
        );
        assert_eq!(
            shorten_path("/x/extremelylongfilename.tar"),
            "/x/extre[...]ename.tar"
        );
    }

    #[test]
    fn backslash_paths_are_normalized() {
        assert_eq!(shorten_path(r"C:\data\report.txt"), "C:/data/report.txt");
    }

    #[test]
    fn format_bytes_binary_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(5_000_000_000), "4.7 GiB");
    }

    #[test]
    fn outcome_exit_codes() {
        assert_eq!(WipeOutcome::Completed.exit_code(), 0);
        assert_eq!(WipeOutcome::Failed("io".into()).exit_code(), 1);
        assert_eq!(WipeOutcome::Cancelled.exit_code(), 2);
    }
}
