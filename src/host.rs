use std::fmt;

/// Operating-system family the native TTS tiers are selected for.
///
/// Darwin is posix but gets its own branch: it ships `say`, not espeak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostFamily {
    Windows,
    MacOs,
    /// Linux and any other posix-like system without a dedicated branch.
    Posix,
    Other,
}

impl HostFamily {
    pub fn detect() -> Self {
        Self::from_os(std::env::consts::OS, cfg!(unix))
    }

    /// Maps an `std::env::consts::OS` value to a family.
    pub fn from_os(os: &str, unix: bool) -> Self {
        match os {
            "windows" => HostFamily::Windows,
            "macos" | "ios" => HostFamily::MacOs,
            _ if unix => HostFamily::Posix,
            _ => HostFamily::Other,
        }
    }
}

impl fmt::Display for HostFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostFamily::Windows => "windows",
            HostFamily::MacOs => "macos",
            HostFamily::Posix => "posix",
            HostFamily::Other => "other",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn darwin_is_not_generic_posix() {
        assert_eq!(HostFamily::from_os("macos", true), HostFamily::MacOs);
        assert_eq!(HostFamily::from_os("linux", true), HostFamily::Posix);
        assert_eq!(HostFamily::from_os("freebsd", true), HostFamily::Posix);
    }

    #[test]
    fn windows_and_unknown() {
        assert_eq!(HostFamily::from_os("windows", false), HostFamily::Windows);
        assert_eq!(HostFamily::from_os("uefi", false), HostFamily::Other);
    }
}
