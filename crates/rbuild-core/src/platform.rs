//! Platform, architecture and build-system catalog
//!
//! The catalog is an immutable table built once at process start and
//! shared (usually behind an `Arc`) by the orchestrator and the RPC service.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the platform that gets the multi-step APK packaging sequence
pub const ANDROID: &str = "android";

/// A target architecture of a platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Architecture {
    /// Canonical architecture name (e.g., "x86_64", "i386", "armv7")
    pub name: String,
    /// Alternative names for this architecture
    pub aliases: Vec<String>,
    /// Word size in bits
    pub bit: u8,
    /// Prefix where dependency libraries are installed for this target
    pub default_install_prefix: PathBuf,
}

impl Architecture {
    /// Create an architecture without aliases
    pub fn new(name: &str, bit: u8, default_install_prefix: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            aliases: Vec::new(),
            bit,
            default_install_prefix: default_install_prefix.into(),
        }
    }

    /// Add alternative names
    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Check whether a name or bit count designates this architecture
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim();
        if self.name.eq_ignore_ascii_case(query)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(query))
        {
            return true;
        }

        query.parse::<u8>().map(|bit| bit == self.bit).unwrap_or(false)
    }
}

/// A supported target platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// Platform name (e.g., "linux", "windows", "android")
    pub name: String,
    /// Supported architectures, preferred first
    pub architectures: Vec<Architecture>,
    /// Package generator names, used when a request names none
    pub package_types: Vec<String>,
}

impl Platform {
    /// Resolve an architecture by name, alias or bit count
    pub fn architecture(&self, query: &str) -> Result<&Architecture> {
        self.architectures
            .iter()
            .find(|arch| arch.matches(query))
            .ok_or_else(|| Error::InvalidArchitecture {
                platform: self.name.clone(),
                name: query.to_string(),
            })
    }

    /// Whether packaging runs the APK target sequence instead of cpack
    pub fn is_android(&self) -> bool {
        self.name == ANDROID
    }
}

/// Immutable lookup table of supported platforms
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    platforms: Vec<Platform>,
}

impl Catalog {
    /// Create a catalog from an explicit platform list
    pub fn new(platforms: Vec<Platform>) -> Self {
        Self { platforms }
    }

    /// The platforms supported out of the box
    pub fn standard() -> Self {
        let x86_64 = || Architecture::new("x86_64", 64, "/usr/local").with_aliases(&["amd64"]);
        let i386 = || Architecture::new("i386", 32, "/usr/local").with_aliases(&["i686", "x86"]);

        Self::new(vec![
            Platform {
                name: "linux".to_string(),
                architectures: vec![x86_64(), i386()],
                package_types: strings(&["DEB", "RPM", "TGZ"]),
            },
            Platform {
                name: "windows".to_string(),
                architectures: vec![
                    Architecture::new("x86_64", 64, "/mingw64").with_aliases(&["amd64"]),
                    Architecture::new("i386", 32, "/mingw32").with_aliases(&["i686", "x86"]),
                ],
                package_types: strings(&["NSIS", "ZIP"]),
            },
            Platform {
                name: "macosx".to_string(),
                architectures: vec![x86_64()],
                package_types: strings(&["DragNDrop", "ZIP"]),
            },
            Platform {
                name: "freebsd".to_string(),
                architectures: vec![x86_64()],
                package_types: strings(&["TGZ"]),
            },
            Platform {
                name: ANDROID.to_string(),
                architectures: vec![Architecture::new("armv7", 32, "/opt/android/toolchain")
                    .with_aliases(&["arm", "armeabi-v7a"])],
                package_types: strings(&["APK"]),
            },
        ])
    }

    /// Look up a platform by name
    pub fn lookup(&self, name: &str) -> Result<&Platform> {
        self.platforms
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::InvalidPlatform { name: name.to_string() })
    }

    /// All known platforms
    pub fn platforms(&self) -> &[Platform] {
        &self.platforms
    }

    /// Catalog name of the platform this process runs on
    pub fn host_platform() -> &'static str {
        match std::env::consts::OS {
            "macos" => "macosx",
            other => other,
        }
    }

    /// Catalog name of the architecture this process runs on
    pub fn host_architecture() -> &'static str {
        match std::env::consts::ARCH {
            "x86" => "i386",
            "arm" => "armv7",
            other => other,
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// File extension produced by a package generator
pub fn extension_for_package(package_type: &str) -> Option<&'static str> {
    let extension = match package_type.to_ascii_uppercase().as_str() {
        "DEB" => "deb",
        "RPM" => "rpm",
        "TGZ" => "tar.gz",
        "ZIP" => "zip",
        "NSIS" => "exe",
        "DRAGNDROP" => "dmg",
        "APK" => "apk",
        _ => return None,
    };
    Some(extension)
}

/// Supported native build drivers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildSystemKind {
    /// Ninja
    #[default]
    Ninja,
    /// GNU make
    Make,
}

impl BuildSystemKind {
    /// Name as written in configuration and on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ninja => "ninja",
            Self::Make => "make",
        }
    }

    /// CMake generator argument selecting this driver
    pub fn generator_arg(&self) -> &'static str {
        match self {
            Self::Ninja => "-GNinja",
            Self::Make => "-GUnix Makefiles",
        }
    }

    /// Driver invocation used when the configuration does not override it
    pub fn default_command_line(&self) -> Vec<String> {
        match self {
            Self::Ninja => strings(&["ninja"]),
            Self::Make => strings(&["make", "-j2"]),
        }
    }
}

impl fmt::Display for BuildSystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BuildSystemKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ninja" => Ok(Self::Ninja),
            "make" | "gmake" => Ok(Self::Make),
            _ => Err(Error::InvalidBuildSystem { name: s.to_string() }),
        }
    }
}

/// A build driver together with the command line that invokes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSystem {
    /// Which driver this is
    pub kind: BuildSystemKind,
    /// Program and leading arguments
    pub command_line: Vec<String>,
}

impl BuildSystem {
    /// Build system with its default command line
    pub fn new(kind: BuildSystemKind) -> Self {
        Self { kind, command_line: kind.default_command_line() }
    }

    /// Resolve a build system by name
    pub fn by_name(name: &str) -> Result<Self> {
        name.parse().map(Self::new)
    }

    /// Replace the command line
    pub fn with_command_line(mut self, command_line: Vec<String>) -> Self {
        if !command_line.is_empty() {
            self.command_line = command_line;
        }
        self
    }

    /// Command line that builds the given target
    pub fn target(&self, target: &str) -> Vec<String> {
        let mut argv = self.command_line.clone();
        argv.push(target.to_string());
        argv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_platform_and_architecture() {
        let catalog = Catalog::standard();

        let linux = catalog.lookup("linux").unwrap();
        assert_eq!(linux.architecture("x86_64").unwrap().bit, 64);
        assert_eq!(linux.architecture("amd64").unwrap().name, "x86_64");
        assert_eq!(linux.architecture("32").unwrap().name, "i386");
        assert!(!linux.is_android());

        assert!(catalog.lookup("android").unwrap().is_android());
    }

    #[test]
    fn test_lookup_failures() {
        let catalog = Catalog::standard();

        match catalog.lookup("plan9") {
            Err(Error::InvalidPlatform { name }) => assert_eq!(name, "plan9"),
            other => panic!("unexpected result: {other:?}"),
        }

        let linux = catalog.lookup("linux").unwrap();
        assert!(matches!(
            linux.architecture("sparc"),
            Err(Error::InvalidArchitecture { .. })
        ));
    }

    #[test]
    fn test_build_system_by_name() {
        let ninja = BuildSystem::by_name("ninja").unwrap();
        assert_eq!(ninja.kind.generator_arg(), "-GNinja");
        assert_eq!(ninja.target("install"), vec!["ninja", "install"]);

        let make = BuildSystem::by_name("gmake").unwrap();
        assert_eq!(make.kind, BuildSystemKind::Make);
        assert_eq!(make.target("install"), vec!["make", "-j2", "install"]);

        assert!(matches!(
            BuildSystem::by_name("scons"),
            Err(Error::InvalidBuildSystem { .. })
        ));
    }

    #[test]
    fn test_package_extensions() {
        assert_eq!(extension_for_package("DEB"), Some("deb"));
        assert_eq!(extension_for_package("tgz"), Some("tar.gz"));
        assert_eq!(extension_for_package("DragNDrop"), Some("dmg"));
        assert_eq!(extension_for_package("SNAP"), None);
    }
}
