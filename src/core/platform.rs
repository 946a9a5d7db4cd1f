//! Purpose: Identify the running platform and derive the library file name for it.
//! Exports: `Os`, `Arch`, `Libc`, `PlatformKey`, `EnvProbe`, `OsProbe`, `detect_libc`.
//! Role: Leaf of the resolution pipeline; every later stage keys off `PlatformKey`.
//! Invariants: Filename and bundle root are derived from one `PlatformKey`, never re-probed.
//! Invariants: Probing goes through `EnvProbe` so detection is deterministic under test.

use std::fmt;
use std::path::Path;
use std::process::Command;

use serde::Serialize;

use crate::core::error::{Error, ErrorKind};

pub const LIBRARY_NAME: &str = "turso_sync_sdk_kit";

const ALPINE_MARKER: &str = "/etc/alpine-release";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Linux,
    Darwin,
    Windows,
}

impl Os {
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            "linux" => Ok(Self::Linux),
            "macos" | "darwin" => Ok(Self::Darwin),
            "windows" => Ok(Self::Windows),
            other => Err(Error::new(ErrorKind::UnsupportedPlatform)
                .with_message(format!("unsupported operating system: {other}"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Darwin => "darwin",
            Self::Windows => "windows",
        }
    }

    /// Environment variable listing the directories searched for a system install.
    pub fn search_path_var(self) -> &'static str {
        match self {
            Self::Windows => "PATH",
            Self::Linux | Self::Darwin => "LD_LIBRARY_PATH",
        }
    }

    pub fn search_path_separator(self) -> char {
        match self {
            Self::Windows => ';',
            Self::Linux | Self::Darwin => ':',
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    Amd64,
    Arm64,
    #[serde(rename = "386")]
    X86,
    Arm,
    Riscv64,
}

impl Arch {
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            "x86_64" | "amd64" => Ok(Self::Amd64),
            "aarch64" | "arm64" => Ok(Self::Arm64),
            "x86" | "386" => Ok(Self::X86),
            "arm" => Ok(Self::Arm),
            "riscv64" => Ok(Self::Riscv64),
            other => Err(Error::new(ErrorKind::UnsupportedPlatform)
                .with_message(format!("unsupported architecture: {other}"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
            Self::X86 => "386",
            Self::Arm => "arm",
            Self::Riscv64 => "riscv64",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Libc {
    Gnu,
    Musl,
}

/// Side-effecting checks used for libc detection.
pub trait EnvProbe {
    fn path_exists(&self, path: &Path) -> bool;

    /// Combined stdout and stderr of a finished command, `None` if it could not be spawned.
    /// Exit status is ignored: musl's `ldd --version` prints its banner and exits 1.
    fn command_output(&self, program: &str, args: &[&str]) -> Option<String>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct OsProbe;

impl EnvProbe for OsProbe {
    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn command_output(&self, program: &str, args: &[&str]) -> Option<String> {
        let output = Command::new(program).args(args).output().ok()?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Some(text)
    }
}

pub fn detect_libc(probe: &dyn EnvProbe) -> Libc {
    if probe.path_exists(Path::new(ALPINE_MARKER)) {
        return Libc::Musl;
    }
    match probe.command_output("ldd", &["--version"]) {
        Some(text) if text.to_ascii_lowercase().contains("musl") => Libc::Musl,
        _ => Libc::Gnu,
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
pub struct PlatformKey {
    pub os: Os,
    pub arch: Arch,
    pub libc: Option<Libc>,
}

impl PlatformKey {
    /// Builds the key for an OS/arch pair; libc is only probed on Linux.
    pub fn from_parts(os: &str, arch: &str, probe: &dyn EnvProbe) -> Result<Self, Error> {
        let os = Os::from_name(os)?;
        let arch = Arch::from_name(arch)?;
        let libc = match os {
            Os::Linux => Some(detect_libc(probe)),
            Os::Darwin | Os::Windows => None,
        };
        Ok(Self { os, arch, libc })
    }

    pub fn detect(probe: &dyn EnvProbe) -> Result<Self, Error> {
        let key = Self::from_parts(std::env::consts::OS, std::env::consts::ARCH, probe)?;
        tracing::debug!(platform = %key, "detected platform");
        Ok(key)
    }

    pub fn is_musl(&self) -> bool {
        self.libc == Some(Libc::Musl)
    }

    pub fn library_filename(&self) -> String {
        match self.os {
            Os::Darwin => format!("lib{LIBRARY_NAME}.dylib"),
            Os::Linux if self.is_musl() => format!("lib{LIBRARY_NAME}.a"),
            Os::Linux => format!("lib{LIBRARY_NAME}.so"),
            Os::Windows => format!("{LIBRARY_NAME}.dll"),
        }
    }

    /// Top-level directory of this platform inside the embedded bundle.
    pub fn bundle_root(&self) -> String {
        let base = format!("{}_{}", self.os.as_str(), self.arch.as_str());
        if self.is_musl() {
            format!("{base}_musl")
        } else {
            base
        }
    }
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.bundle_root())
    }
}
