use std::fmt;

pub const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");

/// What `tally version` reports about the running binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: &'static str,
    /// Short commit hash, suffixed `-dirty` for uncommitted trees.
    pub commit: &'static str,
    pub built_on: &'static str,
    pub target: &'static str,
    pub profile: &'static str,
}

pub const CURRENT: BuildInfo = BuildInfo {
    version: CLI_VERSION,
    commit: embedded(option_env!("TALLY_BUILD_COMMIT")),
    built_on: embedded(option_env!("TALLY_BUILD_DATE")),
    target: embedded(option_env!("TALLY_BUILD_TARGET")),
    profile: embedded(option_env!("TALLY_BUILD_PROFILE")),
};

const fn embedded(value: Option<&'static str>) -> &'static str {
    match value {
        Some(value) => value,
        None => "unknown",
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tally {} ({}, built {})\n{} {}",
            self.version, self.commit, self.built_on, self.target, self.profile
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_leads_with_name_and_version() {
        let info = BuildInfo {
            version: "1.2.3",
            commit: "abc1234-dirty",
            built_on: "2024-05-01",
            target: "x86_64-unknown-linux-gnu",
            profile: "release",
        };
        assert_eq!(
            info.to_string(),
            "tally 1.2.3 (abc1234-dirty, built 2024-05-01)\nx86_64-unknown-linux-gnu release"
        );
        let current = CURRENT.to_string();
        assert!(current.starts_with(&format!("tally {CLI_VERSION} (")));
    }
}
