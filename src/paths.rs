//! Filesystem fact helpers backing the path conditions.

use std::ffi::CString;
use std::fs;
use std::io;
use std::mem;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use crate::error::ConditionError;

/// Whether the filesystem containing `path` is mounted read-only.
pub(crate) fn path_is_read_only_fs(path: &Path) -> io::Result<bool> {
    let cpath = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    let mut buf: libc::statvfs = unsafe { mem::zeroed() };
    if unsafe { libc::statvfs(cpath.as_ptr(), &mut buf) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(buf.f_flag & libc::ST_RDONLY != 0)
}

/// Whether `path` (after following symlinks) is a mount point.
pub(crate) fn path_is_mount_point(path: &Path) -> io::Result<bool> {
    let canon = fs::canonicalize(path)?;
    if canon == Path::new("/") {
        return Ok(true);
    }

    let meta = fs::metadata(&canon)?;
    let parent = canon.parent().unwrap_or_else(|| Path::new("/"));
    let parent_meta = fs::metadata(parent)?;
    if meta.dev() != parent_meta.dev() {
        return Ok(true);
    }

    // Bind mounts stay on the same device; consult the mount table.
    let mountinfo = fs::read_to_string("/proc/self/mountinfo")?;
    Ok(mountinfo_contains(&mountinfo, &canon))
}

/// Whether the mount table lists `path` as a mount point. Mount point is the
/// fifth field; the kernel escapes special characters octally.
pub(crate) fn mountinfo_contains(mountinfo: &str, path: &Path) -> bool {
    mountinfo
        .lines()
        .filter_map(|line| line.split_whitespace().nth(4))
        .any(|mp| Path::new(&unescape_mount_path(mp)) == path)
}

fn unescape_mount_path(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let mut digits = String::new();
        while digits.len() < 3 {
            match chars.peek() {
                Some(&d @ '0'..='7') => {
                    digits.push(d);
                    chars.next();
                }
                _ => break,
            }
        }
        if digits.len() == 3 {
            let code = u32::from_str_radix(&digits, 8).unwrap_or(u32::from(b'\\'));
            out.push(char::from_u32(code).unwrap_or('\\'));
        } else {
            // Short escape, keep it verbatim.
            out.push('\\');
            out.push_str(&digits);
        }
    }
    out
}

/// Whether the block device backing `path` is a dm-crypt volume. Virtual
/// filesystems are never encrypted.
pub(crate) fn path_is_encrypted(path: &Path) -> io::Result<bool> {
    let meta = fs::metadata(path)?;
    let (major, minor) = dev_split(meta.dev());
    if major == 0 {
        return Ok(false);
    }
    match fs::read_to_string(format!("/sys/dev/block/{major}:{minor}/dm/uuid")) {
        Ok(uuid) => Ok(uuid.starts_with("CRYPT-")),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn dev_split(dev: u64) -> (u32, u32) {
    let major = ((dev >> 8) & 0xfff) as u32 | ((dev >> 32) & !0xfff) as u32;
    let minor = (dev & 0xff) as u32 | ((dev >> 12) & 0xffff_ff00) as u32;
    (major, minor)
}

/// Whether the directory holds any entry that is not hidden (leading `.`)
/// and not a backup file (trailing `~`).
pub(crate) fn dir_is_empty(path: &Path) -> io::Result<bool> {
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || name.ends_with('~') {
            continue;
        }
        return Ok(false);
    }
    Ok(true)
}

/// Whether any existing path matches the glob pattern.
pub(crate) fn glob_exists(pattern: &str) -> Result<bool, ConditionError> {
    let paths =
        glob::glob(pattern).map_err(|e| ConditionError::parse(pattern, e.to_string()))?;
    for entry in paths {
        if entry.is_ok() {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn root_is_a_mount_point() {
        assert!(path_is_mount_point(Path::new("/")).unwrap());
    }

    #[test]
    fn plain_directory_is_not_a_mount_point() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        assert!(!path_is_mount_point(&sub).unwrap());
    }

    #[test]
    fn mountinfo_field_extraction() {
        let mountinfo = "\
22 28 0:21 / /proc rw,nosuid,nodev,noexec,relatime shared:12 - proc proc rw
28 1 8:2 / / rw,relatime shared:1 - ext4 /dev/sda2 rw
91 28 8:2 /mnt/with\\040space /mnt/with\\040space rw - ext4 /dev/sda2 rw
";
        assert!(mountinfo_contains(mountinfo, Path::new("/proc")));
        assert!(mountinfo_contains(mountinfo, Path::new("/mnt/with space")));
        assert!(!mountinfo_contains(mountinfo, Path::new("/mnt")));
    }

    #[test]
    fn empty_dir_detection() {
        let dir = tempfile::tempdir().unwrap();
        assert!(dir_is_empty(dir.path()).unwrap());

        // Hidden and backup entries do not count.
        File::create(dir.path().join(".hidden")).unwrap();
        File::create(dir.path().join("backup~")).unwrap();
        assert!(dir_is_empty(dir.path()).unwrap());

        File::create(dir.path().join("real")).unwrap();
        assert!(!dir_is_empty(dir.path()).unwrap());
    }

    #[test]
    fn glob_matching() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("unit.conf")).unwrap();

        let hit = format!("{}/*.conf", dir.path().display());
        let miss = format!("{}/*.service", dir.path().display());
        assert!(glob_exists(&hit).unwrap());
        assert!(!glob_exists(&miss).unwrap());
        assert!(glob_exists("[invalid").is_err());
    }

    #[test]
    fn device_number_split() {
        assert_eq!(dev_split(0x0802), (8, 2));
        assert_eq!(dev_split(0x0000_0B00), (11, 0));
    }
}
