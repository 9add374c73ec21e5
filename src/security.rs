//! Security facility detection: mandatory access control modules, audit,
//! EFI state and TPM2 presence.

use std::fs;
use std::path::Path;

/// Whether the named security facility is in use on this system. Unknown
/// names are simply not in use.
pub(crate) fn facility_in_use(name: &str) -> bool {
    match name {
        "selinux" => fs::exists("/sys/fs/selinux/enforce").unwrap_or(false),
        "smack" => fs::exists("/sys/fs/smackfs").unwrap_or(false),
        "apparmor" => fs::read_to_string("/sys/module/apparmor/parameters/enabled")
            .map(|v| v.trim() == "Y")
            .unwrap_or(false),
        "audit" => audit_available(),
        "ima" => fs::exists("/sys/kernel/security/ima").unwrap_or(false),
        "tomoyo" => fs::exists("/sys/kernel/security/tomoyo").unwrap_or(false),
        "uefi-secureboot" => is_efi_secure_boot(),
        "tpm2" => has_tpm2(),
        _ => false,
    }
}

/// The kernel supports audit when an audit netlink socket can be opened.
fn audit_available() -> bool {
    let fd = unsafe {
        libc::socket(
            libc::AF_NETLINK,
            libc::SOCK_RAW | libc::SOCK_CLOEXEC,
            libc::NETLINK_AUDIT,
        )
    };
    if fd < 0 {
        return false;
    }
    unsafe { libc::close(fd) };
    true
}

pub(crate) fn is_efi_boot() -> bool {
    fs::exists("/sys/firmware/efi").unwrap_or(false)
}

const SECURE_BOOT_VAR: &str =
    "/sys/firmware/efi/efivars/SecureBoot-8be4df61-93ca-11d2-aa0d-00e098032b8c";

/// SecureBoot state as reported by firmware. The variable carries four bytes
/// of attributes followed by the value byte.
pub(crate) fn is_efi_secure_boot() -> bool {
    match fs::read(SECURE_BOOT_VAR) {
        Ok(data) => data.len() >= 5 && data[4] == 1,
        Err(_) => false,
    }
}

/// True when a TPM2 resource manager device exists, or when firmware reports
/// TPM2 support (the driver may simply not be loaded yet during early boot).
fn has_tpm2() -> bool {
    if dir_has_entries("/sys/class/tpmrm") {
        return true;
    }
    fs::exists("/sys/firmware/acpi/tables/TPM2").unwrap_or(false)
}

fn dir_has_entries(path: impl AsRef<Path>) -> bool {
    match fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_some(),
        Err(_) => false,
    }
}
