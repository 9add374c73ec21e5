//! Virtualization detection.
//!
//! Container environments are detected before hypervisors: a container on a
//! virtualized host should report the container.

use std::fs;

/// Detected virtualization technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Virtualization {
    None,
    // Machine virtualization.
    Kvm,
    Amazon,
    Qemu,
    Bochs,
    Xen,
    Vmware,
    Oracle,
    Microsoft,
    Parallels,
    Bhyve,
    Apple,
    VmOther,
    // Containers.
    SystemdNspawn,
    Lxc,
    LxcLibvirt,
    OpenVz,
    Docker,
    Podman,
    Rkt,
    Wsl,
    Proot,
    Pouch,
    ContainerOther,
}

impl Virtualization {
    pub(crate) fn is_vm(self) -> bool {
        use Virtualization::*;
        matches!(
            self,
            Kvm | Amazon
                | Qemu
                | Bochs
                | Xen
                | Vmware
                | Oracle
                | Microsoft
                | Parallels
                | Bhyve
                | Apple
                | VmOther
        )
    }

    pub(crate) fn is_container(self) -> bool {
        use Virtualization::*;
        matches!(
            self,
            SystemdNspawn
                | Lxc
                | LxcLibvirt
                | OpenVz
                | Docker
                | Podman
                | Rkt
                | Wsl
                | Proot
                | Pouch
                | ContainerOther
        )
    }

    pub(crate) fn as_str(self) -> &'static str {
        use Virtualization::*;
        match self {
            None => "none",
            Kvm => "kvm",
            Amazon => "amazon",
            Qemu => "qemu",
            Bochs => "bochs",
            Xen => "xen",
            Vmware => "vmware",
            Oracle => "oracle",
            Microsoft => "microsoft",
            Parallels => "parallels",
            Bhyve => "bhyve",
            Apple => "apple",
            VmOther => "vm",
            SystemdNspawn => "systemd-nspawn",
            Lxc => "lxc",
            LxcLibvirt => "lxc-libvirt",
            OpenVz => "openvz",
            Docker => "docker",
            Podman => "podman",
            Rkt => "rkt",
            Wsl => "wsl",
            Proot => "proot",
            Pouch => "pouch",
            ContainerOther => "container-other",
        }
    }
}

fn container_from_id(id: &str) -> Virtualization {
    match id {
        "systemd-nspawn" => Virtualization::SystemdNspawn,
        "lxc" => Virtualization::Lxc,
        "lxc-libvirt" => Virtualization::LxcLibvirt,
        "openvz" => Virtualization::OpenVz,
        "docker" => Virtualization::Docker,
        "podman" => Virtualization::Podman,
        "rkt" => Virtualization::Rkt,
        "wsl" => Virtualization::Wsl,
        "proot" => Virtualization::Proot,
        "pouch" => Virtualization::Pouch,
        "" => Virtualization::None,
        _ => Virtualization::ContainerOther,
    }
}

fn detect_container() -> Virtualization {
    // OpenVZ guests have /proc/vz but not /proc/bc.
    if fs::exists("/proc/vz").unwrap_or(false) && !fs::exists("/proc/bc").unwrap_or(false) {
        return Virtualization::OpenVz;
    }

    if let Ok(osrelease) = fs::read_to_string("/proc/sys/kernel/osrelease") {
        if osrelease.contains("Microsoft") || osrelease.contains("WSL") {
            return Virtualization::Wsl;
        }
    }

    // The container manager is expected to leave its name here.
    if let Ok(id) = fs::read_to_string("/run/systemd/container") {
        let v = container_from_id(id.trim());
        if v != Virtualization::None {
            return v;
        }
    }

    // Or in PID 1's environment as container=.
    if let Ok(environ) = fs::read("/proc/1/environ") {
        for entry in environ.split(|&b| b == 0) {
            if let Some(value) = entry.strip_prefix(b"container=") {
                let v = container_from_id(&String::from_utf8_lossy(value));
                if v != Virtualization::None {
                    return v;
                }
            }
        }
    }

    if fs::exists("/.dockerenv").unwrap_or(false) {
        return Virtualization::Docker;
    }

    Virtualization::None
}

/// DMI vendor strings and the hypervisors they identify.
const DMI_VENDORS: &[(&str, Virtualization)] = &[
    ("KVM", Virtualization::Kvm),
    ("Amazon EC2", Virtualization::Amazon),
    ("QEMU", Virtualization::Qemu),
    ("Bochs", Virtualization::Bochs),
    ("Xen", Virtualization::Xen),
    ("VMware", Virtualization::Vmware),
    ("VMW", Virtualization::Vmware),
    ("innotek GmbH", Virtualization::Oracle),
    ("VirtualBox", Virtualization::Oracle),
    ("Oracle Corporation", Virtualization::Oracle),
    ("Microsoft Corporation", Virtualization::Microsoft),
    ("Parallels", Virtualization::Parallels),
    ("BHYVE", Virtualization::Bhyve),
    ("Apple Virtualization", Virtualization::Apple),
];

fn detect_vm() -> Virtualization {
    for field in ["product_name", "sys_vendor", "board_vendor", "bios_vendor"] {
        let Ok(value) = fs::read_to_string(format!("/sys/class/dmi/id/{field}")) else {
            continue;
        };
        let value = value.trim();
        for &(vendor, v) in DMI_VENDORS {
            if value.starts_with(vendor) {
                return v;
            }
        }
    }

    if let Ok(kind) = fs::read_to_string("/sys/hypervisor/type") {
        if kind.trim() == "xen" {
            return Virtualization::Xen;
        }
    }

    // A set hypervisor CPU flag without a recognized vendor still means
    // some machine virtualization.
    if let Ok(cpuinfo) = fs::read_to_string("/proc/cpuinfo") {
        for line in cpuinfo.lines() {
            if let Some((key, value)) = line.split_once(':') {
                if key.trim() == "flags"
                    && value.split_ascii_whitespace().any(|f| f == "hypervisor")
                {
                    return Virtualization::VmOther;
                }
            }
        }
    }

    Virtualization::None
}

/// Detects the virtualization environment this process runs in.
pub(crate) fn detect_virtualization() -> Virtualization {
    let container = detect_container();
    if container != Virtualization::None {
        return container;
    }
    detect_vm()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_are_disjoint() {
        assert!(!Virtualization::None.is_vm());
        assert!(!Virtualization::None.is_container());
        assert!(Virtualization::Kvm.is_vm());
        assert!(!Virtualization::Kvm.is_container());
        assert!(Virtualization::Docker.is_container());
        assert!(!Virtualization::Docker.is_vm());
    }

    #[test]
    fn container_ids() {
        assert_eq!(container_from_id("docker"), Virtualization::Docker);
        assert_eq!(container_from_id("lxc"), Virtualization::Lxc);
        assert_eq!(container_from_id(""), Virtualization::None);
        assert_eq!(container_from_id("something-new"), Virtualization::ContainerOther);
    }

    #[test]
    fn detection_does_not_panic() {
        let v = detect_virtualization();
        assert!(v == Virtualization::None || v.is_vm() || v.is_container());
    }
}
