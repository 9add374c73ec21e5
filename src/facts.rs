//! Host fact providers: process identity, kernel facts and small parsers
//! shared by the condition checks.

use std::ffi::{CStr, CString};
use std::fs;
use std::io;
use std::mem;
use std::path::PathBuf;
use std::ptr;

use crate::error::ConditionError;
use crate::words;

/// Release and machine fields of `uname(2)`.
pub(crate) fn uname() -> io::Result<(String, String)> {
    let mut u: libc::utsname = unsafe { mem::zeroed() };
    if unsafe { libc::uname(&mut u) } < 0 {
        return Err(io::Error::last_os_error());
    }
    let release = unsafe { CStr::from_ptr(u.release.as_ptr()) };
    let machine = unsafe { CStr::from_ptr(u.machine.as_ptr()) };
    Ok((
        release.to_string_lossy().into_owned(),
        machine.to_string_lossy().into_owned(),
    ))
}

pub(crate) fn proc_cmdline() -> io::Result<String> {
    Ok(fs::read_to_string("/proc/cmdline")?.trim_end().to_string())
}

/// Looks up a boolean switch on the kernel command line. A bare `key` counts
/// as true, `key=VALUE` is parsed as a boolean, an absent key is `None`.
pub(crate) fn proc_cmdline_get_bool(key: &str) -> Result<Option<bool>, ConditionError> {
    let line = proc_cmdline().map_err(|e| ConditionError::io("/proc/cmdline", e))?;
    let words = words::extract_words(&line, true).map_err(|r| ConditionError::parse(&line, r))?;
    for word in &words {
        if word == key {
            return Ok(Some(true));
        }
        if let Some(value) = word.strip_prefix(key).and_then(|r| r.strip_prefix('=')) {
            return match boolean(value) {
                Some(b) => Ok(Some(b)),
                None => Err(ConditionError::parse(value, "not a boolean")),
            };
        }
    }
    Ok(None)
}

/// Total physical memory in bytes. Treated as unlimited when the sysconf
/// values are unavailable, so memory conditions err toward passing.
pub(crate) fn physical_memory() -> u64 {
    let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if pages <= 0 || page_size <= 0 {
        return u64::MAX;
    }
    (pages as u64).saturating_mul(page_size as u64)
}

/// Number of CPUs in the scheduling affinity mask of this process.
pub(crate) fn cpus_in_affinity_mask() -> io::Result<u32> {
    let mut set: libc::cpu_set_t = unsafe { mem::zeroed() };
    if unsafe { libc::sched_getaffinity(0, mem::size_of::<libc::cpu_set_t>(), &mut set) } < 0 {
        return Err(io::Error::last_os_error());
    }
    let mut n = 0;
    for cpu in 0..libc::CPU_SETSIZE as usize {
        if unsafe { libc::CPU_ISSET(cpu, &set) } {
            n += 1;
        }
    }
    Ok(n)
}

/// Whether any online CPU reports `flag` (lower case) in `/proc/cpuinfo`.
pub(crate) fn has_cpu_flag(flag: &str) -> io::Result<bool> {
    let cpuinfo = fs::read_to_string("/proc/cpuinfo")?;
    for line in cpuinfo.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        // x86 calls the field "flags", arm calls it "Features".
        if !matches!(key.trim(), "flags" | "Features") {
            continue;
        }
        if value.split_ascii_whitespace().any(|f| f == flag) {
            return Ok(true);
        }
    }
    Ok(false)
}

pub(crate) fn getuid() -> u32 {
    unsafe { libc::getuid() }
}

pub(crate) fn geteuid() -> u32 {
    unsafe { libc::geteuid() }
}

/// System users are allocated below this boundary.
const SYSTEM_UID_MAX: u32 = 999;

pub(crate) fn uid_is_system(uid: u32) -> bool {
    uid <= SYSTEM_UID_MAX
}

/// Whether the process is a member of `gid`, either as real, effective or
/// supplementary group.
pub(crate) fn in_gid(gid: u32) -> io::Result<bool> {
    if gid == unsafe { libc::getgid() } || gid == unsafe { libc::getegid() } {
        return Ok(true);
    }
    let n = unsafe { libc::getgroups(0, ptr::null_mut()) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    let mut list = vec![0 as libc::gid_t; n as usize];
    let n = unsafe { libc::getgroups(n, list.as_mut_ptr()) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    list.truncate(n as usize);
    Ok(list.contains(&gid))
}

/// Login name of the current real user, if the user database has one.
pub(crate) fn username() -> Option<String> {
    let mut buf = vec![0 as libc::c_char; 4096];
    let mut pwd: libc::passwd = unsafe { mem::zeroed() };
    let mut result: *mut libc::passwd = ptr::null_mut();
    loop {
        let r = unsafe {
            libc::getpwuid_r(libc::getuid(), &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result)
        };
        if r == libc::ERANGE && buf.len() < (1 << 20) {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if r != 0 || result.is_null() {
            return None;
        }
        let name = unsafe { CStr::from_ptr(pwd.pw_name) };
        return Some(name.to_string_lossy().into_owned());
    }
}

pub(crate) fn uid_by_name(name: &str) -> Option<u32> {
    let cname = CString::new(name).ok()?;
    let mut buf = vec![0 as libc::c_char; 4096];
    let mut pwd: libc::passwd = unsafe { mem::zeroed() };
    let mut result: *mut libc::passwd = ptr::null_mut();
    loop {
        let r = unsafe {
            libc::getpwnam_r(cname.as_ptr(), &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result)
        };
        if r == libc::ERANGE && buf.len() < (1 << 20) {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if r != 0 || result.is_null() {
            return None;
        }
        return Some(pwd.pw_uid);
    }
}

pub(crate) fn gid_by_name(name: &str) -> Option<u32> {
    let cname = CString::new(name).ok()?;
    let mut buf = vec![0 as libc::c_char; 4096];
    let mut grp: libc::group = unsafe { mem::zeroed() };
    let mut result: *mut libc::group = ptr::null_mut();
    loop {
        let r = unsafe {
            libc::getgrnam_r(cname.as_ptr(), &mut grp, buf.as_mut_ptr(), buf.len(), &mut result)
        };
        if r == libc::ERANGE && buf.len() < (1 << 20) {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if r != 0 || result.is_null() {
            return None;
        }
        return Some(grp.gr_gid);
    }
}

pub(crate) fn hostname() -> io::Result<String> {
    let mut buf = [0 as libc::c_char; 256];
    if unsafe { libc::gethostname(buf.as_mut_ptr(), buf.len()) } < 0 {
        return Err(io::Error::last_os_error());
    }
    let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
    Ok(name.to_string_lossy().into_owned())
}

/// The host machine id as a 128-bit value.
pub(crate) fn machine_id() -> Result<u128, ConditionError> {
    let text = fs::read_to_string("/etc/machine-id")
        .map_err(|e| ConditionError::io("/etc/machine-id", e))?;
    parse_machine_id(&text).ok_or_else(|| {
        ConditionError::io(
            "/etc/machine-id",
            io::Error::new(io::ErrorKind::InvalidData, "malformed machine id"),
        )
    })
}

/// Parses a machine id: 32 hex digits, or the UUID form with dashes.
pub(crate) fn parse_machine_id(s: &str) -> Option<u128> {
    let s = s.trim();
    let compact: String = match s.len() {
        32 => s.to_string(),
        36 => {
            let bytes = s.as_bytes();
            if bytes[8] != b'-' || bytes[13] != b'-' || bytes[18] != b'-' || bytes[23] != b'-' {
                return None;
            }
            s.chars().filter(|&c| c != '-').collect()
        }
        _ => return None,
    };
    if compact.len() != 32 {
        return None;
    }
    u128::from_str_radix(&compact, 16).ok()
}

/// Whether the process runs inside a user namespace, judged by whether
/// `/proc/self/uid_map` describes the identity mapping.
pub(crate) fn running_in_userns() -> bool {
    let Ok(map) = fs::read_to_string("/proc/self/uid_map") else {
        return false;
    };
    let fields: Vec<&str> = map.split_ascii_whitespace().collect();
    fields != ["0", "0", "4294967295"]
}

pub(crate) fn in_initrd() -> bool {
    fs::exists("/etc/initrd-release").unwrap_or(false)
}

pub(crate) fn credentials_dir() -> Option<PathBuf> {
    std::env::var_os("CREDENTIALS_DIRECTORY").map(PathBuf::from)
}

pub(crate) fn encrypted_credentials_dir() -> Option<PathBuf> {
    std::env::var_os("ENCRYPTED_CREDENTIALS_DIRECTORY").map(PathBuf::from)
}

/// Credential names must be usable as file names.
pub(crate) fn credential_name_valid(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name.len() <= 255
        && !name.contains('/')
        && !name.contains('\0')
}

/// Parses the usual boolean spellings.
pub(crate) fn boolean(s: &str) -> Option<bool> {
    if ["1", "yes", "y", "true", "t", "on"]
        .iter()
        .any(|v| s.eq_ignore_ascii_case(v))
    {
        return Some(true);
    }
    if ["0", "no", "n", "false", "f", "off"]
        .iter()
        .any(|v| s.eq_ignore_ascii_case(v))
    {
        return Some(false);
    }
    None
}

/// Whether `s` is a valid environment variable name.
pub(crate) fn env_name_is_valid(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with(|c: char| c.is_ascii_digit())
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Capability names in bit order, as known to the kernel.
const CAPABILITIES: &[&str] = &[
    "CAP_CHOWN",
    "CAP_DAC_OVERRIDE",
    "CAP_DAC_READ_SEARCH",
    "CAP_FOWNER",
    "CAP_FSETID",
    "CAP_KILL",
    "CAP_SETGID",
    "CAP_SETUID",
    "CAP_SETPCAP",
    "CAP_LINUX_IMMUTABLE",
    "CAP_NET_BIND_SERVICE",
    "CAP_NET_BROADCAST",
    "CAP_NET_ADMIN",
    "CAP_NET_RAW",
    "CAP_IPC_LOCK",
    "CAP_IPC_OWNER",
    "CAP_SYS_MODULE",
    "CAP_SYS_RAWIO",
    "CAP_SYS_CHROOT",
    "CAP_SYS_PTRACE",
    "CAP_SYS_PACCT",
    "CAP_SYS_ADMIN",
    "CAP_SYS_BOOT",
    "CAP_SYS_NICE",
    "CAP_SYS_RESOURCE",
    "CAP_SYS_TIME",
    "CAP_SYS_TTY_CONFIG",
    "CAP_MKNOD",
    "CAP_LEASE",
    "CAP_AUDIT_WRITE",
    "CAP_AUDIT_CONTROL",
    "CAP_SETFCAP",
    "CAP_MAC_OVERRIDE",
    "CAP_MAC_ADMIN",
    "CAP_SYSLOG",
    "CAP_WAKE_ALARM",
    "CAP_BLOCK_SUSPEND",
    "CAP_AUDIT_READ",
    "CAP_PERFMON",
    "CAP_BPF",
    "CAP_CHECKPOINT_RESTORE",
];

/// Resolves a capability name (or number) to its bit position.
pub(crate) fn capability_from_name(name: &str) -> Option<u8> {
    if let Ok(n) = name.parse::<u8>() {
        return (n <= 62).then_some(n);
    }
    CAPABILITIES
        .iter()
        .position(|c| c.eq_ignore_ascii_case(name))
        .map(|i| i as u8)
}

/// The capability bounding set of this process, from `/proc/self/status`.
/// A kernel without the field is taken to grant everything.
pub(crate) fn capability_bounding_set() -> Result<u64, ConditionError> {
    let status = fs::read_to_string("/proc/self/status")
        .map_err(|e| ConditionError::io("/proc/self/status", e))?;
    for line in status.lines() {
        if let Some(value) = line.strip_prefix("CapBnd:") {
            return u64::from_str_radix(value.trim(), 16).map_err(|_| {
                ConditionError::io(
                    "/proc/self/status",
                    io::Error::new(io::ErrorKind::InvalidData, "malformed CapBnd field"),
                )
            });
        }
    }
    Ok(u64::MAX)
}

/// Whether the system runs on external power. With no AC adapter devices at
/// all we assume wall power.
pub(crate) fn on_ac_power() -> io::Result<bool> {
    let entries = match fs::read_dir("/sys/class/power_supply") {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e),
    };

    let mut found_online = false;
    let mut found_offline = false;
    for entry in entries {
        let entry = entry?;
        let Ok(kind) = fs::read_to_string(entry.path().join("type")) else {
            continue;
        };
        if kind.trim() == "Battery" {
            continue;
        }
        let Ok(online) = fs::read_to_string(entry.path().join("online")) else {
            continue;
        };
        match online.trim().parse::<i32>() {
            Ok(v) if v > 0 => found_online = true,
            Ok(_) => found_offline = true,
            Err(_) => continue,
        }
    }
    Ok(found_online || !found_offline)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booleans() {
        assert_eq!(boolean("1"), Some(true));
        assert_eq!(boolean("Yes"), Some(true));
        assert_eq!(boolean("on"), Some(true));
        assert_eq!(boolean("0"), Some(false));
        assert_eq!(boolean("FALSE"), Some(false));
        assert_eq!(boolean("off"), Some(false));
        assert_eq!(boolean(""), None);
        assert_eq!(boolean("maybe"), None);
    }

    #[test]
    fn env_names() {
        assert!(env_name_is_valid("ID"));
        assert!(env_name_is_valid("VERSION_ID"));
        assert!(env_name_is_valid("_private"));
        assert!(!env_name_is_valid(""));
        assert!(!env_name_is_valid("1ABC"));
        assert!(!env_name_is_valid("A-B"));
        assert!(!env_name_is_valid("A B"));
    }

    #[test]
    fn credential_names() {
        assert!(credential_name_valid("mycred"));
        assert!(credential_name_valid("my.cred-1"));
        assert!(!credential_name_valid(""));
        assert!(!credential_name_valid("."));
        assert!(!credential_name_valid(".."));
        assert!(!credential_name_valid("a/b"));
    }

    #[test]
    fn machine_ids() {
        let id = parse_machine_id("0123456789abcdef0123456789abcdef").unwrap();
        assert_eq!(
            parse_machine_id("01234567-89ab-cdef-0123-456789abcdef"),
            Some(id)
        );
        assert_eq!(parse_machine_id("0123456789abcdef0123456789abcdef\n"), Some(id));
        assert_eq!(parse_machine_id("xyz"), None);
        assert_eq!(parse_machine_id("0123456789abcdef0123456789abcde"), None);
        assert_eq!(parse_machine_id("01234567-89ab+cdef-0123-456789abcdef"), None);
    }

    #[test]
    fn capabilities() {
        assert_eq!(capability_from_name("CAP_CHOWN"), Some(0));
        assert_eq!(capability_from_name("cap_sys_admin"), Some(21));
        assert_eq!(capability_from_name("CAP_CHECKPOINT_RESTORE"), Some(40));
        assert_eq!(capability_from_name("7"), Some(7));
        assert_eq!(capability_from_name("63"), None);
        assert_eq!(capability_from_name("CAP_NOT_A_THING"), None);
    }

    #[test]
    fn affinity_mask_nonempty() {
        assert!(cpus_in_affinity_mask().unwrap() >= 1);
    }
}
