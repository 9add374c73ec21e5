//! Pressure Stall Information (PSI) conditions.
//!
//! Pressure averages are carried as fixed-point hundredths of a percent,
//! matching the two decimal places the kernel prints. The configured limit
//! is a permyriad, which is the same unit: one permyriad is 0.01%.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::cgroup::{self, ControllerMask};
use crate::condition::ConditionKind;
use crate::error::ConditionError;

/// Averaging windows the kernel exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PressureWindow {
    Avg10,
    Avg60,
    Avg300,
}

/// One parsed pressure line, fixed-point hundredths of a percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ResourcePressure {
    pub(crate) avg10: u64,
    pub(crate) avg60: u64,
    pub(crate) avg300: u64,
}

impl ResourcePressure {
    fn average(&self, window: PressureWindow) -> u64 {
        match window {
            PressureWindow::Avg10 => self.avg10,
            PressureWindow::Avg60 => self.avg60,
            PressureWindow::Avg300 => self.avg300,
        }
    }
}

/// Which pressure line to read. `full` is preferred; older kernels lack it
/// for the cpu controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PressureLine {
    Full,
    Some,
}

/// Parses a permyriad value: a bare number counts basis points, `%` scales
/// from percent, `‰` from permille. Fractions are allowed as long as the
/// result stays integral.
pub(crate) fn parse_permyriad(s: &str) -> Option<u32> {
    let (number, scale) = if let Some(p) = s.strip_suffix('%') {
        (p, 100u32)
    } else if let Some(p) = s.strip_suffix('‰') {
        (p, 10u32)
    } else {
        (s, 1u32)
    };

    let (whole, frac) = match number.split_once('.') {
        Some((w, f)) => (w, f),
        None => (number, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }

    let max_frac_digits = match scale {
        100 => 2,
        10 => 1,
        _ => 0,
    };
    if frac.len() > max_frac_digits {
        return None;
    }

    let mut value: u32 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    value = value.checked_mul(scale)?;
    if !frac.is_empty() {
        let f: u32 = frac.parse().ok()?;
        value = value.checked_add(f * scale / 10u32.pow(frac.len() as u32))?;
    }
    (value <= 10_000).then_some(value)
}

/// Parses the value part of a pressure parameter: `PCT[/WINDOW]` where the
/// window is one of `10sec`, `1min`, `5min` and defaults to five minutes.
pub(crate) fn parse_pressure_value(value: &str) -> Option<(u64, PressureWindow)> {
    let (pct, window) = match value.split_once('/') {
        None => (value, PressureWindow::Avg300),
        Some((pct, timespan)) => {
            let timespan = timespan.trim_start();
            let window = if timespan.starts_with("10sec") {
                PressureWindow::Avg10
            } else if timespan.starts_with("1min") {
                PressureWindow::Avg60
            } else if timespan.starts_with("5min") {
                PressureWindow::Avg300
            } else {
                return None;
            };
            (pct, window)
        }
    };
    let limit = parse_permyriad(pct.trim())?;
    Some((u64::from(limit), window))
}

/// Parses one decimal average (`0.40`) into hundredths.
fn parse_fixed_point(s: &str) -> Option<u64> {
    match s.split_once('.') {
        None => s.parse::<u64>().ok()?.checked_mul(100),
        Some((whole, frac)) => {
            let whole: u64 = whole.parse().ok()?;
            let hundredths = match frac.len() {
                0 => return None,
                1 => frac.parse::<u64>().ok()? * 10,
                _ => frac.get(..2)?.parse::<u64>().ok()?,
            };
            whole.checked_mul(100)?.checked_add(hundredths)
        }
    }
}

/// Parses the requested line out of pressure-file content. `None` when the
/// line is absent, so callers can fall back from `full` to `some`.
pub(crate) fn parse_pressure(content: &str, which: PressureLine) -> Option<ResourcePressure> {
    let tag = match which {
        PressureLine::Full => "full",
        PressureLine::Some => "some",
    };
    for line in content.lines() {
        let Some(rest) = line.strip_prefix(tag) else {
            continue;
        };
        if !rest.starts_with(char::is_whitespace) {
            continue;
        }
        let mut pressure = ResourcePressure::default();
        for field in rest.split_ascii_whitespace() {
            let Some((key, value)) = field.split_once('=') else {
                return None;
            };
            match key {
                "avg10" => pressure.avg10 = parse_fixed_point(value)?,
                "avg60" => pressure.avg60 = parse_fixed_point(value)?,
                "avg300" => pressure.avg300 = parse_fixed_point(value)?,
                _ => {}
            }
        }
        return Some(pressure);
    }
    None
}

fn pressure_supported() -> bool {
    fs::exists("/proc/pressure").unwrap_or(false)
}

fn pressure_type(kind: ConditionKind) -> &'static str {
    match kind {
        ConditionKind::MemoryPressure => "memory",
        ConditionKind::CpuPressure => "cpu",
        ConditionKind::IoPressure => "io",
        _ => unreachable!("not a pressure condition"),
    }
}

fn required_controller(kind: ConditionKind) -> ControllerMask {
    match kind {
        ConditionKind::MemoryPressure => ControllerMask::MEMORY,
        ConditionKind::CpuPressure => ControllerMask::CPU,
        ConditionKind::IoPressure => ControllerMask::IO,
        _ => unreachable!("not a pressure condition"),
    }
}

/// Resolves the pressure file for a cgroup-scoped check. `None` means the
/// facility is unavailable and the condition should skip-pass.
fn cgroup_pressure_path(
    kind: ConditionKind,
    slice: &str,
    parameter: &str,
) -> Result<Option<PathBuf>, ConditionError> {
    if !cgroup::all_unified() {
        debug!("pressure check requires the unified cgroup hierarchy, skipping");
        return Ok(None);
    }

    let supported = cgroup::mask_supported()
        .map_err(|e| ConditionError::io("supported cgroup controllers", e))?;
    if !supported.contains(required_controller(kind)) {
        debug!(
            "cgroup {} controller not available, skipping pressure check",
            pressure_type(kind)
        );
        return Ok(None);
    }

    let mut slice_path = cgroup::slice_to_path(slice)
        .ok_or_else(|| ConditionError::parse(parameter, "not a valid slice name"))?;

    // We may be running under a user manager; prefix its scope, minus a
    // trailing init.scope.
    let mut root_scope = cgroup::current_cgroup()
        .map_err(|e| ConditionError::io("/proc/self/cgroup", e))?;
    if let Some(stripped) = root_scope.strip_suffix("/init.scope") {
        root_scope = stripped.to_string();
    } else if root_scope == "init.scope" {
        root_scope.clear();
    }
    if !root_scope.is_empty() {
        slice_path = format!("{root_scope}/{slice_path}");
    }

    let file = format!("{}.pressure", pressure_type(kind));
    Ok(Some(
        Path::new("/sys/fs/cgroup").join(slice_path).join(file),
    ))
}

/// Compares the configured limit against the running average, preferring
/// the `full` line and falling back to `some`.
pub(crate) fn pressure_within_limit(
    content: &str,
    limit: u64,
    window: PressureWindow,
) -> Option<bool> {
    let pressure = parse_pressure(content, PressureLine::Full)
        .or_else(|| parse_pressure(content, PressureLine::Some))?;
    Some(pressure.average(window) <= limit)
}

/// Evaluates one of the pressure conditions.
pub(crate) fn test_pressure(kind: ConditionKind, parameter: &str) -> Result<bool, ConditionError> {
    if !pressure_supported() {
        debug!("PSI is not supported, skipping pressure check");
        return Ok(true);
    }

    // An optional CGROUP: prefix scopes the check away from the global
    // /proc/pressure numbers.
    let mut parts = parameter.split(':');
    let first = parts.next().unwrap_or_default();
    let second = parts.next();

    let (path, value) = match second {
        None => {
            let path = Path::new("/proc/pressure").join(pressure_type(kind));
            (path, first)
        }
        Some(value) => {
            let slice = first.trim();
            if slice.is_empty() {
                return Err(ConditionError::parse(parameter, "empty slice name"));
            }
            match cgroup_pressure_path(kind, slice, parameter)? {
                Some(path) => (path, value),
                None => return Ok(true),
            }
        }
    };

    let (limit, window) = parse_pressure_value(value)
        .ok_or_else(|| ConditionError::parse(parameter, "expected PCT[%|\u{2030}][/WINDOW]"))?;

    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            // The cgroup we resolved does not exist (any longer).
            debug!("{} not found, skipping pressure check", path.display());
            return Ok(true);
        }
        Err(e) => return Err(ConditionError::io(path.display(), e)),
    };

    pressure_within_limit(&content, limit, window).ok_or_else(|| {
        ConditionError::io(
            path.display(),
            io::Error::new(io::ErrorKind::InvalidData, "no pressure line"),
        )
    })
}
