use std::fmt;

use serde::Serialize;

/// Build metadata baked in by a binary's build script
///
/// Use [`build_info!`](crate::build_info) from the binary crate so the
/// values come from that crate's environment, not this one.
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub build_profile: &'static str,
    pub build_features: &'static str,
    pub version: &'static str,
    pub build_timestamp: &'static str,
    pub rust_version: &'static str,
    pub build_target: &'static str,
}

impl BuildInfo {
    pub fn new(
        build_profile: Option<&'static str>,
        build_features: Option<&'static str>,
        version: Option<&'static str>,
        build_timestamp: Option<&'static str>,
        rust_version: Option<&'static str>,
        build_target: Option<&'static str>,
    ) -> Self {
        Self {
            build_profile: build_profile.unwrap_or("unknown"),
            build_features: build_features.unwrap_or("none"),
            version: version.unwrap_or("unknown"),
            build_timestamp: build_timestamp.unwrap_or("unknown"),
            rust_version: rust_version.unwrap_or("unknown"),
            build_target: build_target.unwrap_or("unknown"),
        }
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {}) built {} with {} for {}",
            self.version,
            self.build_profile,
            self.build_features,
            self.build_timestamp,
            self.rust_version,
            self.build_target
        )
    }
}

#[macro_export]
macro_rules! build_info {
    () => {
        $crate::version::BuildInfo::new(
            option_env!("BUILD_PROFILE"),
            option_env!("BUILD_FEATURES"),
            option_env!("REPO_VERSION"),
            option_env!("BUILD_TIMESTAMP"),
            option_env!("RUST_VERSION"),
            option_env!("BUILD_TARGET"),
        )
    };
}
