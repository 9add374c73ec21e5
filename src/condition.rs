//! The condition record, evaluator dispatch, list composition and
//! formatting.

use std::fmt;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process;

use glob::{MatchOptions, Pattern};
use tracing::{debug, warn};

use crate::arch::Architecture;
use crate::cgroup;
use crate::error::ConditionError;
use crate::facts;
use crate::firmware;
use crate::kernel;
use crate::order::{parse_order, OrderOp};
use crate::osrelease;
use crate::paths;
use crate::psi;
use crate::security;
use crate::update;
use crate::virt::{self, Virtualization};

/// The kind of fact a [`Condition`] tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ConditionKind {
    Architecture,
    Firmware,
    Virtualization,
    Host,
    KernelCommandLine,
    KernelVersion,
    Credential,
    Security,
    Capability,
    AcPower,
    NeedsUpdate,
    FirstBoot,
    PathExists,
    PathExistsGlob,
    PathIsDirectory,
    PathIsSymbolicLink,
    PathIsMountPoint,
    PathIsReadWrite,
    PathIsEncrypted,
    DirectoryNotEmpty,
    FileNotEmpty,
    FileIsExecutable,
    User,
    Group,
    ControlGroupController,
    Cpus,
    Memory,
    Environment,
    CpuFeature,
    OsRelease,
    MemoryPressure,
    CpuPressure,
    IoPressure,
}

impl ConditionKind {
    /// Every kind, in the order the textual tables list them.
    pub const ALL: [ConditionKind; 33] = [
        ConditionKind::Architecture,
        ConditionKind::Firmware,
        ConditionKind::Virtualization,
        ConditionKind::Host,
        ConditionKind::KernelCommandLine,
        ConditionKind::KernelVersion,
        ConditionKind::Credential,
        ConditionKind::Security,
        ConditionKind::Capability,
        ConditionKind::AcPower,
        ConditionKind::NeedsUpdate,
        ConditionKind::FirstBoot,
        ConditionKind::PathExists,
        ConditionKind::PathExistsGlob,
        ConditionKind::PathIsDirectory,
        ConditionKind::PathIsSymbolicLink,
        ConditionKind::PathIsMountPoint,
        ConditionKind::PathIsReadWrite,
        ConditionKind::PathIsEncrypted,
        ConditionKind::DirectoryNotEmpty,
        ConditionKind::FileNotEmpty,
        ConditionKind::FileIsExecutable,
        ConditionKind::User,
        ConditionKind::Group,
        ConditionKind::ControlGroupController,
        ConditionKind::Cpus,
        ConditionKind::Memory,
        ConditionKind::Environment,
        ConditionKind::CpuFeature,
        ConditionKind::OsRelease,
        ConditionKind::MemoryPressure,
        ConditionKind::CpuPressure,
        ConditionKind::IoPressure,
    ];

    /// The `Condition*` spelling of this kind.
    pub fn to_condition_str(self) -> &'static str {
        CONDITION_NAMES[self.table_index()].1
    }

    /// The `Assert*` spelling of this kind.
    pub fn to_assert_str(self) -> &'static str {
        ASSERT_NAMES[self.table_index()].1
    }

    /// Parses the `Condition*` spelling.
    pub fn from_condition_str(s: &str) -> Option<ConditionKind> {
        CONDITION_NAMES.iter().find(|&&(_, n)| n == s).map(|&(k, _)| k)
    }

    /// Parses the `Assert*` spelling.
    pub fn from_assert_str(s: &str) -> Option<ConditionKind> {
        ASSERT_NAMES.iter().find(|&&(_, n)| n == s).map(|&(k, _)| k)
    }

    fn table_index(self) -> usize {
        ConditionKind::ALL
            .iter()
            .position(|&k| k == self)
            .expect("kind missing from ALL")
    }
}

// The two flavors mirror each other entry for entry; the integration tests
// assert totality and injectivity of both.
const CONDITION_NAMES: [(ConditionKind, &str); 33] = [
    (ConditionKind::Architecture, "ConditionArchitecture"),
    (ConditionKind::Firmware, "ConditionFirmware"),
    (ConditionKind::Virtualization, "ConditionVirtualization"),
    (ConditionKind::Host, "ConditionHost"),
    (ConditionKind::KernelCommandLine, "ConditionKernelCommandLine"),
    (ConditionKind::KernelVersion, "ConditionKernelVersion"),
    (ConditionKind::Credential, "ConditionCredential"),
    (ConditionKind::Security, "ConditionSecurity"),
    (ConditionKind::Capability, "ConditionCapability"),
    (ConditionKind::AcPower, "ConditionACPower"),
    (ConditionKind::NeedsUpdate, "ConditionNeedsUpdate"),
    (ConditionKind::FirstBoot, "ConditionFirstBoot"),
    (ConditionKind::PathExists, "ConditionPathExists"),
    (ConditionKind::PathExistsGlob, "ConditionPathExistsGlob"),
    (ConditionKind::PathIsDirectory, "ConditionPathIsDirectory"),
    (ConditionKind::PathIsSymbolicLink, "ConditionPathIsSymbolicLink"),
    (ConditionKind::PathIsMountPoint, "ConditionPathIsMountPoint"),
    (ConditionKind::PathIsReadWrite, "ConditionPathIsReadWrite"),
    (ConditionKind::PathIsEncrypted, "ConditionPathIsEncrypted"),
    (ConditionKind::DirectoryNotEmpty, "ConditionDirectoryNotEmpty"),
    (ConditionKind::FileNotEmpty, "ConditionFileNotEmpty"),
    (ConditionKind::FileIsExecutable, "ConditionFileIsExecutable"),
    (ConditionKind::User, "ConditionUser"),
    (ConditionKind::Group, "ConditionGroup"),
    (ConditionKind::ControlGroupController, "ConditionControlGroupController"),
    (ConditionKind::Cpus, "ConditionCPUs"),
    (ConditionKind::Memory, "ConditionMemory"),
    (ConditionKind::Environment, "ConditionEnvironment"),
    (ConditionKind::CpuFeature, "ConditionCPUFeature"),
    (ConditionKind::OsRelease, "ConditionOSRelease"),
    (ConditionKind::MemoryPressure, "ConditionMemoryPressure"),
    (ConditionKind::CpuPressure, "ConditionCPUPressure"),
    (ConditionKind::IoPressure, "ConditionIOPressure"),
];

const ASSERT_NAMES: [(ConditionKind, &str); 33] = [
    (ConditionKind::Architecture, "AssertArchitecture"),
    (ConditionKind::Firmware, "AssertFirmware"),
    (ConditionKind::Virtualization, "AssertVirtualization"),
    (ConditionKind::Host, "AssertHost"),
    (ConditionKind::KernelCommandLine, "AssertKernelCommandLine"),
    (ConditionKind::KernelVersion, "AssertKernelVersion"),
    (ConditionKind::Credential, "AssertCredential"),
    (ConditionKind::Security, "AssertSecurity"),
    (ConditionKind::Capability, "AssertCapability"),
    (ConditionKind::AcPower, "AssertACPower"),
    (ConditionKind::NeedsUpdate, "AssertNeedsUpdate"),
    (ConditionKind::FirstBoot, "AssertFirstBoot"),
    (ConditionKind::PathExists, "AssertPathExists"),
    (ConditionKind::PathExistsGlob, "AssertPathExistsGlob"),
    (ConditionKind::PathIsDirectory, "AssertPathIsDirectory"),
    (ConditionKind::PathIsSymbolicLink, "AssertPathIsSymbolicLink"),
    (ConditionKind::PathIsMountPoint, "AssertPathIsMountPoint"),
    (ConditionKind::PathIsReadWrite, "AssertPathIsReadWrite"),
    (ConditionKind::PathIsEncrypted, "AssertPathIsEncrypted"),
    (ConditionKind::DirectoryNotEmpty, "AssertDirectoryNotEmpty"),
    (ConditionKind::FileNotEmpty, "AssertFileNotEmpty"),
    (ConditionKind::FileIsExecutable, "AssertFileIsExecutable"),
    (ConditionKind::User, "AssertUser"),
    (ConditionKind::Group, "AssertGroup"),
    (ConditionKind::ControlGroupController, "AssertControlGroupController"),
    (ConditionKind::Cpus, "AssertCPUs"),
    (ConditionKind::Memory, "AssertMemory"),
    (ConditionKind::Environment, "AssertEnvironment"),
    (ConditionKind::CpuFeature, "AssertCPUFeature"),
    (ConditionKind::OsRelease, "AssertOSRelease"),
    (ConditionKind::MemoryPressure, "AssertMemoryPressure"),
    (ConditionKind::CpuPressure, "AssertCPUPressure"),
    (ConditionKind::IoPressure, "AssertIOPressure"),
];

/// The outcome recorded on a [`Condition`] after evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConditionResult {
    /// Not evaluated yet.
    #[default]
    Untested,
    /// The predicate held.
    Succeeded,
    /// The predicate did not hold.
    Failed,
    /// The evaluator failed; neither held nor failed.
    Error,
}

impl ConditionResult {
    /// The stable textual name of this result.
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionResult::Untested => "untested",
            ConditionResult::Succeeded => "succeeded",
            ConditionResult::Failed => "failed",
            ConditionResult::Error => "error",
        }
    }
}

impl fmt::Display for ConditionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single declarative predicate over the running system.
#[derive(Debug, Clone)]
pub struct Condition {
    kind: ConditionKind,
    parameter: String,
    trigger: bool,
    negate: bool,
    result: ConditionResult,
}

impl Condition {
    /// Creates a new condition.
    ///
    /// # Panics
    ///
    /// Panics when `parameter` is empty; the loader must not hand over
    /// conditions without a parameter.
    pub fn new(
        kind: ConditionKind,
        parameter: impl Into<String>,
        trigger: bool,
        negate: bool,
    ) -> Condition {
        let parameter = parameter.into();
        assert!(!parameter.is_empty(), "condition parameter must not be empty");
        Condition {
            kind,
            parameter,
            trigger,
            negate,
            result: ConditionResult::Untested,
        }
    }

    pub fn kind(&self) -> ConditionKind {
        self.kind
    }

    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    /// Whether this condition belongs to the OR-group.
    pub fn trigger(&self) -> bool {
        self.trigger
    }

    /// Whether the evaluated outcome is inverted.
    pub fn negate(&self) -> bool {
        self.negate
    }

    /// The outcome of the last evaluation.
    pub fn result(&self) -> ConditionResult {
        self.result
    }

    /// Evaluates the condition against the running system, folds in
    /// `negate`, records and returns the outcome.
    ///
    /// `env` is the environment the surrounding manager would hand to the
    /// unit, as `KEY=VALUE` strings; only [`ConditionKind::Environment`]
    /// looks at it.
    pub fn test(&mut self, env: &[String]) -> Result<bool, ConditionError> {
        match self.eval(env) {
            Err(e) => {
                self.result = ConditionResult::Error;
                Err(e)
            }
            Ok(outcome) => {
                let b = outcome != self.negate;
                self.result = if b {
                    ConditionResult::Succeeded
                } else {
                    ConditionResult::Failed
                };
                Ok(b)
            }
        }
    }

    fn eval(&self, env: &[String]) -> Result<bool, ConditionError> {
        let p = self.parameter.as_str();
        match self.kind {
            ConditionKind::Architecture => test_architecture(p),
            ConditionKind::Firmware => firmware::test_firmware(p),
            ConditionKind::Virtualization => test_virtualization(p),
            ConditionKind::Host => test_host(p),
            ConditionKind::KernelCommandLine => {
                let line =
                    facts::proc_cmdline().map_err(|e| ConditionError::io("/proc/cmdline", e))?;
                kernel::cmdline_matches(&line, p)
            }
            ConditionKind::KernelVersion => {
                let (release, _) = facts::uname().map_err(|e| ConditionError::io("uname", e))?;
                kernel::kernel_version_matches(&release, p)
            }
            ConditionKind::Credential => test_credential(p),
            ConditionKind::Security => Ok(security::facility_in_use(p)),
            ConditionKind::Capability => test_capability(p),
            ConditionKind::AcPower => {
                let wanted =
                    facts::boolean(p).ok_or_else(|| ConditionError::parse(p, "not a boolean"))?;
                let on_ac =
                    facts::on_ac_power().map_err(|e| ConditionError::io("power supplies", e))?;
                Ok(on_ac == wanted)
            }
            ConditionKind::NeedsUpdate => update::test_needs_update(p),
            ConditionKind::FirstBoot => test_first_boot(p),
            ConditionKind::PathExists => Ok(fs::exists(p).unwrap_or(false)),
            ConditionKind::PathExistsGlob => paths::glob_exists(p),
            ConditionKind::PathIsDirectory => {
                Ok(fs::metadata(p).map(|m| m.is_dir()).unwrap_or(false))
            }
            ConditionKind::PathIsSymbolicLink => Ok(fs::symlink_metadata(p)
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false)),
            ConditionKind::PathIsMountPoint => {
                Ok(paths::path_is_mount_point(Path::new(p)).unwrap_or(false))
            }
            ConditionKind::PathIsReadWrite => {
                // A non-existent path does not live on a read-only
                // filesystem, so it counts as writable.
                Ok(!matches!(
                    paths::path_is_read_only_fs(Path::new(p)),
                    Ok(true)
                ))
            }
            ConditionKind::PathIsEncrypted => match paths::path_is_encrypted(Path::new(p)) {
                Ok(encrypted) => Ok(encrypted),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(e) => {
                    debug!("failed to determine if '{p}' is encrypted: {e}");
                    Ok(false)
                }
            },
            ConditionKind::DirectoryNotEmpty => match paths::dir_is_empty(Path::new(p)) {
                Ok(empty) => Ok(!empty),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                    ) =>
                {
                    Ok(false)
                }
                // Unexpected errors err toward "not empty".
                Err(_) => Ok(true),
            },
            ConditionKind::FileNotEmpty => Ok(fs::metadata(p)
                .map(|m| m.is_file() && m.len() > 0)
                .unwrap_or(false)),
            ConditionKind::FileIsExecutable => Ok(fs::metadata(p)
                .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
                .unwrap_or(false)),
            ConditionKind::User => test_user(p),
            ConditionKind::Group => test_group(p),
            ConditionKind::ControlGroupController => test_control_group_controller(p),
            ConditionKind::Cpus => {
                let n = facts::cpus_in_affinity_mask()
                    .map_err(|e| ConditionError::io("affinity mask", e))?;
                let (order, value) = ordered_number(p)?;
                Ok(order.ordering_matches(n.cmp(&value)))
            }
            ConditionKind::Memory => {
                let m = facts::physical_memory();
                let (order, value) = ordered_size(p)?;
                Ok(order.ordering_matches(m.cmp(&value)))
            }
            ConditionKind::Environment => {
                let has_assignment = p.contains('=');
                Ok(env
                    .iter()
                    .any(|entry| kernel::token_matches(entry, p, has_assignment)))
            }
            ConditionKind::CpuFeature => {
                let flag = p.to_ascii_lowercase();
                facts::has_cpu_flag(&flag).map_err(|e| ConditionError::io("/proc/cpuinfo", e))
            }
            ConditionKind::OsRelease => osrelease::os_release_matches(p, osrelease::os_release_value),
            ConditionKind::MemoryPressure
            | ConditionKind::CpuPressure
            | ConditionKind::IoPressure => psi::test_pressure(self.kind, p),
        }
    }

    /// Writes the one-line dump representation:
    /// `<prefix>\t<kind>: [|][!]parameter <result>`.
    pub fn dump<W: io::Write>(
        &self,
        w: &mut W,
        prefix: &str,
        to_string: fn(ConditionKind) -> &'static str,
    ) -> io::Result<()> {
        writeln!(
            w,
            "{}\t{}: {}{}{} {}",
            prefix,
            to_string(self.kind),
            if self.trigger { "|" } else { "" },
            if self.negate { "!" } else { "" },
            self.parameter,
            self.result,
        )
    }
}

/// Evaluates a whole condition list.
///
/// The list holds when every regular condition holds and, if any trigger
/// conditions are present, at least one of them holds. Regular conditions
/// short-circuit left to right; an evaluation error counts as failed for a
/// regular condition and as "not triggered" for a trigger condition. An
/// empty list holds trivially.
pub fn test_list(conditions: &mut [Condition], env: &[String]) -> bool {
    if conditions.is_empty() {
        return true;
    }

    let mut triggered: Option<bool> = None;
    for c in conditions.iter_mut() {
        let outcome = c.test(env);
        match &outcome {
            Err(e) => warn!(
                "couldn't determine result for {}={}{}{}, assuming failed: {e}",
                c.kind.to_condition_str(),
                if c.trigger { "|" } else { "" },
                if c.negate { "!" } else { "" },
                c.parameter,
            ),
            Ok(_) => debug!(
                "{}={}{}{} {}.",
                c.kind.to_condition_str(),
                if c.trigger { "|" } else { "" },
                if c.negate { "!" } else { "" },
                c.parameter,
                c.result,
            ),
        }

        let passed = matches!(outcome, Ok(true));
        if !c.trigger && !passed {
            return false;
        }
        if c.trigger && triggered != Some(true) {
            triggered = Some(passed);
        }
    }

    triggered != Some(false)
}

/// Dumps every condition in the list, one line each.
pub fn dump_list<W: io::Write>(
    conditions: &[Condition],
    w: &mut W,
    prefix: &str,
    to_string: fn(ConditionKind) -> &'static str,
) -> io::Result<()> {
    for c in conditions {
        c.dump(w, prefix, to_string)?;
    }
    Ok(())
}

/// Parses an optional comparison operator followed by a non-negative
/// integer. Without an operator `>=` is implied.
fn ordered_number(parameter: &str) -> Result<(OrderOp, u32), ConditionError> {
    let mut rest = parameter;
    let order = parse_order(&mut rest, false).unwrap_or(OrderOp::GreaterOrEqual);
    let value = rest
        .trim()
        .parse()
        .map_err(|_| ConditionError::parse(parameter, "expected a non-negative number"))?;
    Ok((order, value))
}

/// Like [`ordered_number`] but the value is a byte size.
fn ordered_size(parameter: &str) -> Result<(OrderOp, u64), ConditionError> {
    let mut rest = parameter;
    let order = parse_order(&mut rest, false).unwrap_or(OrderOp::GreaterOrEqual);
    let value = crate::size::parse_size(rest)
        .ok_or_else(|| ConditionError::parse(parameter, "expected a size in bytes"))?;
    Ok((order, value))
}

fn test_architecture(parameter: &str) -> Result<bool, ConditionError> {
    let (_, machine) = facts::uname().map_err(|e| ConditionError::io("uname", e))?;
    let host = Architecture::from_uname(&machine).ok_or_else(|| {
        ConditionError::Unsupported(format!("unknown host architecture `{machine}`"))
    })?;

    let wanted = if parameter == "native" {
        match Architecture::native() {
            Some(native) => native,
            None => {
                return Err(ConditionError::Unsupported(
                    "native architecture unknown".to_string(),
                ));
            }
        }
    } else {
        // An unknown architecture name is certainly not ours.
        match Architecture::from_name(parameter) {
            Some(wanted) => wanted,
            None => return Ok(false),
        }
    };

    Ok(host == wanted)
}

fn test_virtualization(parameter: &str) -> Result<bool, ConditionError> {
    if parameter == "private-users" {
        return Ok(facts::running_in_userns());
    }

    let detected = virt::detect_virtualization();

    // A boolean asks merely whether any virtualization is in effect.
    if let Some(wanted) = facts::boolean(parameter) {
        return Ok(wanted == (detected != Virtualization::None));
    }

    if parameter == "vm" {
        return Ok(detected.is_vm());
    }
    if parameter == "container" {
        return Ok(detected.is_container());
    }

    Ok(detected != Virtualization::None && parameter == detected.as_str())
}

fn test_host(parameter: &str) -> Result<bool, ConditionError> {
    if let Some(id) = facts::parse_machine_id(parameter) {
        return Ok(facts::machine_id()? == id);
    }

    let hostname = facts::hostname().map_err(|e| ConditionError::io("hostname", e))?;
    let case_insensitive = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::default()
    };
    Ok(Pattern::new(parameter)
        .map(|pattern| pattern.matches_with(&hostname, case_insensitive))
        .unwrap_or(false))
}

fn test_credential(parameter: &str) -> Result<bool, ConditionError> {
    // Credentials with invalid names cannot exist.
    if !facts::credential_name_valid(parameter) {
        return Ok(false);
    }

    for dir in [facts::credentials_dir(), facts::encrypted_credentials_dir()] {
        let Some(dir) = dir else { continue };
        let path = dir.join(parameter);
        match fs::symlink_metadata(&path) {
            Ok(_) => return Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(ConditionError::io(path.display(), e)),
        }
    }
    Ok(false)
}

fn test_capability(parameter: &str) -> Result<bool, ConditionError> {
    let bit = facts::capability_from_name(parameter)
        .ok_or_else(|| ConditionError::parse(parameter, "unknown capability"))?;
    let bounding_set = facts::capability_bounding_set()?;
    Ok(bounding_set & (1u64 << bit) != 0)
}

const FIRST_BOOT_FLAG: &str = "/run/systemd/first-boot";
const FIRST_BOOT_OVERRIDE: &str = "systemd.condition-first-boot";

fn test_first_boot(parameter: &str) -> Result<bool, ConditionError> {
    match facts::proc_cmdline_get_bool(FIRST_BOOT_OVERRIDE) {
        // The kernel command line override wins outright, whatever the
        // parameter asks for.
        Ok(Some(b)) => return Ok(b),
        Ok(None) => {}
        Err(e) => debug!(
            "failed to parse {FIRST_BOOT_OVERRIDE}= kernel command line argument, ignoring: {e}"
        ),
    }

    let wanted = facts::boolean(parameter)
        .ok_or_else(|| ConditionError::parse(parameter, "not a boolean"))?;
    Ok(fs::exists(FIRST_BOOT_FLAG).unwrap_or(false) == wanted)
}

fn test_user(parameter: &str) -> Result<bool, ConditionError> {
    if let Ok(uid) = parameter.parse::<u32>() {
        return Ok(uid == facts::getuid() || uid == facts::geteuid());
    }

    if parameter == "@system" {
        return Ok(facts::uid_is_system(facts::getuid())
            || facts::uid_is_system(facts::geteuid()));
    }

    if facts::username().as_deref() == Some(parameter) {
        return Ok(true);
    }

    // PID 1 runs as root and must not block on user database lookups.
    if process::id() == 1 {
        return Ok(parameter == "root");
    }

    match facts::uid_by_name(parameter) {
        Some(uid) => Ok(uid == facts::getuid() || uid == facts::geteuid()),
        None => Ok(false),
    }
}

fn test_group(parameter: &str) -> Result<bool, ConditionError> {
    if let Ok(gid) = parameter.parse::<u32>() {
        return facts::in_gid(gid).map_err(|e| ConditionError::io("groups", e));
    }

    if process::id() == 1 {
        return Ok(parameter == "root");
    }

    match facts::gid_by_name(parameter) {
        Some(gid) => facts::in_gid(gid).map_err(|e| ConditionError::io("groups", e)),
        None => Ok(false),
    }
}

fn test_control_group_controller(parameter: &str) -> Result<bool, ConditionError> {
    if parameter == "v2" {
        return Ok(cgroup::all_unified());
    }
    if parameter == "v1" {
        return Ok(!cgroup::all_unified());
    }

    let supported = cgroup::mask_supported()
        .map_err(|e| ConditionError::io("supported cgroup controllers", e))?;
    let wanted = cgroup::mask_from_string(parameter);
    if wanted.is_empty() {
        // Unknown controllers are deliberately not an error.
        debug!("failed to parse cgroup controller string: {parameter}");
        return Ok(true);
    }
    Ok(supported.contains(wanted))
}
