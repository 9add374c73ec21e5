//! Processor architecture identification.

/// Architectures with stable textual names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Architecture {
    X86,
    X86_64,
    Ppc,
    PpcLe,
    Ppc64,
    Ppc64Le,
    Ia64,
    S390,
    S390x,
    Sparc,
    Sparc64,
    Mips,
    MipsLe,
    Mips64,
    Mips64Le,
    Alpha,
    Arm,
    ArmBe,
    Arm64,
    Arm64Be,
    Riscv32,
    Riscv64,
    Loongarch64,
    M68k,
}

const NAMES: &[(Architecture, &str)] = &[
    (Architecture::X86, "x86"),
    (Architecture::X86_64, "x86-64"),
    (Architecture::Ppc, "ppc"),
    (Architecture::PpcLe, "ppc-le"),
    (Architecture::Ppc64, "ppc64"),
    (Architecture::Ppc64Le, "ppc64-le"),
    (Architecture::Ia64, "ia64"),
    (Architecture::S390, "s390"),
    (Architecture::S390x, "s390x"),
    (Architecture::Sparc, "sparc"),
    (Architecture::Sparc64, "sparc64"),
    (Architecture::Mips, "mips"),
    (Architecture::MipsLe, "mips-le"),
    (Architecture::Mips64, "mips64"),
    (Architecture::Mips64Le, "mips64-le"),
    (Architecture::Alpha, "alpha"),
    (Architecture::Arm, "arm"),
    (Architecture::ArmBe, "arm-be"),
    (Architecture::Arm64, "arm64"),
    (Architecture::Arm64Be, "arm64-be"),
    (Architecture::Riscv32, "riscv32"),
    (Architecture::Riscv64, "riscv64"),
    (Architecture::Loongarch64, "loongarch64"),
    (Architecture::M68k, "m68k"),
];

impl Architecture {
    pub(crate) fn from_name(name: &str) -> Option<Architecture> {
        NAMES.iter().find(|&&(_, n)| n == name).map(|&(a, _)| a)
    }

    /// Maps the `uname(2)` machine field to an architecture.
    pub(crate) fn from_uname(machine: &str) -> Option<Architecture> {
        Some(match machine {
            "x86_64" | "amd64" => Architecture::X86_64,
            "i386" | "i486" | "i586" | "i686" => Architecture::X86,
            "aarch64" => Architecture::Arm64,
            "aarch64_be" => Architecture::Arm64Be,
            "ppc64le" => Architecture::Ppc64Le,
            "ppc64" => Architecture::Ppc64,
            "ppcle" => Architecture::PpcLe,
            "ppc" => Architecture::Ppc,
            "riscv64" => Architecture::Riscv64,
            "riscv32" => Architecture::Riscv32,
            "s390x" => Architecture::S390x,
            "s390" => Architecture::S390,
            "mips64el" => Architecture::Mips64Le,
            "mips64" => Architecture::Mips64,
            "mipsel" => Architecture::MipsLe,
            "mips" => Architecture::Mips,
            "loongarch64" => Architecture::Loongarch64,
            "ia64" => Architecture::Ia64,
            "alpha" => Architecture::Alpha,
            "sparc64" => Architecture::Sparc64,
            "sparc" => Architecture::Sparc,
            "m68k" => Architecture::M68k,
            m if m.starts_with("arm") => {
                if m.ends_with('b') {
                    Architecture::ArmBe
                } else {
                    Architecture::Arm
                }
            }
            _ => return None,
        })
    }

    /// The architecture this crate was compiled for.
    pub(crate) fn native() -> Option<Architecture> {
        let big = cfg!(target_endian = "big");
        Some(if cfg!(target_arch = "x86_64") {
            Architecture::X86_64
        } else if cfg!(target_arch = "x86") {
            Architecture::X86
        } else if cfg!(target_arch = "aarch64") {
            if big {
                Architecture::Arm64Be
            } else {
                Architecture::Arm64
            }
        } else if cfg!(target_arch = "arm") {
            if big {
                Architecture::ArmBe
            } else {
                Architecture::Arm
            }
        } else if cfg!(target_arch = "powerpc64") {
            if big {
                Architecture::Ppc64
            } else {
                Architecture::Ppc64Le
            }
        } else if cfg!(target_arch = "powerpc") {
            Architecture::Ppc
        } else if cfg!(target_arch = "riscv64") {
            Architecture::Riscv64
        } else if cfg!(target_arch = "riscv32") {
            Architecture::Riscv32
        } else if cfg!(target_arch = "s390x") {
            Architecture::S390x
        } else if cfg!(target_arch = "mips64") {
            if big {
                Architecture::Mips64
            } else {
                Architecture::Mips64Le
            }
        } else if cfg!(target_arch = "mips") {
            if big {
                Architecture::Mips
            } else {
                Architecture::MipsLe
            }
        } else if cfg!(target_arch = "loongarch64") {
            Architecture::Loongarch64
        } else if cfg!(target_arch = "sparc64") {
            Architecture::Sparc64
        } else if cfg!(target_arch = "m68k") {
            Architecture::M68k
        } else {
            return None;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uname_mapping() {
        assert_eq!(Architecture::from_uname("x86_64"), Some(Architecture::X86_64));
        assert_eq!(Architecture::from_uname("i686"), Some(Architecture::X86));
        assert_eq!(Architecture::from_uname("aarch64"), Some(Architecture::Arm64));
        assert_eq!(Architecture::from_uname("armv7l"), Some(Architecture::Arm));
        assert_eq!(Architecture::from_uname("armv7b"), Some(Architecture::ArmBe));
        assert_eq!(Architecture::from_uname("ppc64le"), Some(Architecture::Ppc64Le));
        assert_eq!(Architecture::from_uname("z80"), None);
    }

    #[test]
    fn names_round_trip() {
        for &(arch, name) in NAMES {
            assert_eq!(Architecture::from_name(name), Some(arch));
        }
        assert_eq!(Architecture::from_name("vax"), None);
    }

    #[test]
    fn native_known_on_common_targets() {
        // All targets this crate is routinely built for map to a name.
        if cfg!(any(target_arch = "x86_64", target_arch = "aarch64")) {
            assert!(Architecture::native().is_some());
        }
    }
}
