//! Control group facts: hierarchy layout, supported controllers and slice
//! path resolution.

use std::fs;
use std::io;
use std::ops::BitOr;

/// A set of cgroup controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ControllerMask(u32);

impl ControllerMask {
    pub(crate) const EMPTY: ControllerMask = ControllerMask(0);
    pub(crate) const CPU: ControllerMask = ControllerMask(1 << 0);
    pub(crate) const CPUACCT: ControllerMask = ControllerMask(1 << 1);
    pub(crate) const CPUSET: ControllerMask = ControllerMask(1 << 2);
    pub(crate) const IO: ControllerMask = ControllerMask(1 << 3);
    pub(crate) const BLKIO: ControllerMask = ControllerMask(1 << 4);
    pub(crate) const MEMORY: ControllerMask = ControllerMask(1 << 5);
    pub(crate) const DEVICES: ControllerMask = ControllerMask(1 << 6);
    pub(crate) const PIDS: ControllerMask = ControllerMask(1 << 7);

    pub(crate) fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub(crate) fn contains(self, other: ControllerMask) -> bool {
        self.0 & other.0 == other.0
    }

    fn from_name(name: &str) -> Option<ControllerMask> {
        Some(match name {
            "cpu" => ControllerMask::CPU,
            "cpuacct" => ControllerMask::CPUACCT,
            "cpuset" => ControllerMask::CPUSET,
            "io" => ControllerMask::IO,
            "blkio" => ControllerMask::BLKIO,
            "memory" => ControllerMask::MEMORY,
            "devices" => ControllerMask::DEVICES,
            "pids" => ControllerMask::PIDS,
            _ => return None,
        })
    }
}

impl BitOr for ControllerMask {
    type Output = ControllerMask;

    fn bitor(self, rhs: ControllerMask) -> ControllerMask {
        ControllerMask(self.0 | rhs.0)
    }
}

/// Parses a comma- or whitespace-separated controller list. Unknown names
/// are skipped, so a mixed string is judged on its known controllers only.
pub(crate) fn mask_from_string(s: &str) -> ControllerMask {
    s.split(|c: char| c == ',' || c.is_ascii_whitespace())
        .filter(|name| !name.is_empty())
        .filter_map(ControllerMask::from_name)
        .fold(ControllerMask::EMPTY, |acc, m| acc | m)
}

/// Whether all controllers live in the unified ("v2") hierarchy.
pub(crate) fn all_unified() -> bool {
    fs::exists("/sys/fs/cgroup/cgroup.controllers").unwrap_or(false)
}

/// The set of controllers the system can provide.
pub(crate) fn mask_supported() -> io::Result<ControllerMask> {
    if all_unified() {
        let controllers = fs::read_to_string("/sys/fs/cgroup/cgroup.controllers")?;
        return Ok(mask_from_string(&controllers));
    }

    // Legacy layout: /proc/cgroups rows are "name hierarchy num enabled".
    let cgroups = fs::read_to_string("/proc/cgroups")?;
    let mut mask = ControllerMask::EMPTY;
    for line in cgroups.lines() {
        if line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_ascii_whitespace();
        let Some(name) = fields.next() else { continue };
        let enabled = fields.nth(2).map(|f| f == "1").unwrap_or(false);
        if enabled {
            if let Some(m) = ControllerMask::from_name(name) {
                mask = mask | m;
            }
        }
    }
    Ok(mask)
}

/// Expands a slice name into its cgroup path: every dash opens another
/// hierarchy level, so `a-b.slice` becomes `a.slice/a-b.slice`.
pub(crate) fn slice_to_path(slice: &str) -> Option<String> {
    if slice == "-.slice" {
        return Some(String::new());
    }
    let name = slice.strip_suffix(".slice")?;
    if name.is_empty()
        || name.starts_with('-')
        || name.ends_with('-')
        || name.contains("--")
        || name.contains('/')
    {
        return None;
    }

    let mut path = String::new();
    let mut prefix = String::new();
    for part in name.split('-') {
        if !prefix.is_empty() {
            path.push('/');
            prefix.push('-');
        }
        prefix.push_str(part);
        path.push_str(&prefix);
        path.push_str(".slice");
    }
    Some(path)
}

/// The v2 cgroup of the current process, without the leading slash.
pub(crate) fn current_cgroup() -> io::Result<String> {
    let content = fs::read_to_string("/proc/self/cgroup")?;
    for line in content.lines() {
        if let Some(path) = line.strip_prefix("0::") {
            return Ok(path.trim_start_matches('/').to_string());
        }
    }
    Err(io::Error::new(
        io::ErrorKind::NotFound,
        "no unified hierarchy entry in /proc/self/cgroup",
    ))
}
