//! Version and build information

use std::fmt;

use serde::Serialize;

/// Build information embedded at compile time
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
    /// Short git commit hash
    pub git_hash: &'static str,
    #[serde(skip)]
    git_dirty_str: &'static str,
    pub build_timestamp: &'static str,
    /// Target triple (e.g., x86_64-unknown-linux-gnu)
    pub target: &'static str,
    /// debug / release
    pub profile: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub const fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            git_hash: env!("RTC_CLIENT_GIT_HASH"),
            git_dirty_str: env!("RTC_CLIENT_GIT_DIRTY"),
            build_timestamp: env!("RTC_CLIENT_BUILD_TIMESTAMP"),
            target: env!("RTC_CLIENT_TARGET"),
            profile: env!("RTC_CLIENT_PROFILE"),
            rustc_version: env!("RTC_CLIENT_RUSTC_VERSION"),
        }
    }

    pub fn git_dirty(&self) -> bool {
        self.git_dirty_str == "true"
    }

    /// Version plus revision, e.g. "0.1.0-abc1234"
    pub fn full_version(&self) -> String {
        if self.git_dirty() {
            format!("{}-{}-dirty", self.version, self.git_hash)
        } else {
            format!("{}-{}", self.version, self.git_hash)
        }
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.name, self.full_version())?;
        writeln!(f)?;
        writeln!(f, "Build Information:")?;
        writeln!(f, "  Version:    {}", self.version)?;
        writeln!(f, "  Git Hash:   {}{}", self.git_hash, if self.git_dirty() { " (dirty)" } else { "" })?;
        writeln!(f, "  Built:      {}", self.build_timestamp)?;
        writeln!(f, "  Profile:    {}", self.profile)?;
        writeln!(f, "  Target:     {}", self.target)?;
        writeln!(f, "  Compiler:   {}", self.rustc_version)?;
        Ok(())
    }
}

pub fn build_info() -> BuildInfo {
    BuildInfo::current()
}

/// Print version information to stdout, as text or JSON
pub fn print_version(json: bool) {
    let info = build_info();
    if json {
        match serde_json::to_string_pretty(&info) {
            Ok(rendered) => println!("{}", rendered),
            Err(_) => print!("{}", info),
        }
    } else {
        print!("{}", info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_version_contains_revision() {
        let info = build_info();
        let full = info.full_version();
        assert!(full.starts_with(info.version));
        assert!(full.contains(info.git_hash));
    }

    #[test]
    fn test_display_format() {
        let display = build_info().to_string();
        assert!(display.contains("realtime-client"));
        assert!(display.contains("Git Hash:"));
        assert!(display.contains("Target:"));
    }

    #[test]
    fn test_json_omits_raw_dirty_flag() {
        let value = serde_json::to_value(build_info()).unwrap();
        assert!(value.get("git_hash").is_some());
        assert!(value.get("git_dirty_str").is_none());
    }
}
