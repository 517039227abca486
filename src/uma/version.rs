//! UMA protocol version negotiation.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::Error;

/// Version this crate speaks by default.
pub const UMA_PROTOCOL_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParsedVersion {
    pub major: u32,
    pub minor: u32,
}

impl ParsedVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl FromStr for ParsedVersion {
    type Err = Error;

    fn from_str(version: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::invalid_input(format!("invalid UMA version: {}", version));
        let (major, minor) = version.split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for ParsedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Highest supported minor version for each supported major version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedVersions {
    minors: BTreeMap<u32, u32>,
}

impl Default for SupportedVersions {
    fn default() -> Self {
        Self::new([ParsedVersion::new(0, 3), ParsedVersion::new(1, 0)])
    }
}

impl SupportedVersions {
    pub fn new(versions: impl IntoIterator<Item = ParsedVersion>) -> Self {
        let mut minors = BTreeMap::new();
        for version in versions {
            let minor = minors.entry(version.major).or_insert(version.minor);
            *minor = (*minor).max(version.minor);
        }
        Self { minors }
    }

    pub fn major_versions(&self) -> Vec<u32> {
        self.minors.keys().copied().collect()
    }

    /// The newest supported version, used for first contact.
    pub fn current(&self) -> Option<ParsedVersion> {
        self.minors
            .iter()
            .next_back()
            .map(|(major, minor)| ParsedVersion::new(*major, *minor))
    }

    pub fn highest_for_major(&self, major: u32) -> Option<ParsedVersion> {
        self.minors
            .get(&major)
            .map(|minor| ParsedVersion::new(major, *minor))
    }

    /// Only the major version has to match.
    pub fn is_version_supported(&self, version: &str) -> bool {
        version
            .parse::<ParsedVersion>()
            .map(|parsed| self.minors.contains_key(&parsed.major))
            .unwrap_or(false)
    }

    /// Highest version both sides support, at our minor for that major.
    pub fn select_highest_supported_version(
        &self,
        other_major_versions: &[u32],
    ) -> Option<ParsedVersion> {
        other_major_versions
            .iter()
            .filter_map(|major| self.highest_for_major(*major))
            .max()
    }

    /// CSV of the supported major versions, as sent in a 412 body.
    pub fn major_versions_csv(&self) -> String {
        self.major_versions()
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

pub fn is_version_supported(version: &str) -> bool {
    SupportedVersions::default().is_version_supported(version)
}

pub fn select_highest_supported_version(other_major_versions: &[u32]) -> Option<ParsedVersion> {
    SupportedVersions::default().select_highest_supported_version(other_major_versions)
}

/// The lower of two versions, used to answer a peer on a version both know.
pub fn select_lower_version(version1: &str, version2: &str) -> Result<String, Error> {
    let parsed1: ParsedVersion = version1.parse()?;
    let parsed2: ParsedVersion = version2.parse()?;
    Ok(parsed1.min(parsed2).to_string())
}

/// Reads `supportedMajorVersions` from a 412 response body.
///
/// The field is a CSV string; a JSON array of integers is accepted as well.
pub fn get_supported_major_versions_from_error_response_body(
    body: &[u8],
) -> Result<Vec<u32>, Error> {
    let body: Value = serde_json::from_slice(body)?;
    let invalid = || Error::invalid_input("invalid supportedMajorVersions in error response");
    match body.get("supportedMajorVersions") {
        Some(Value::String(csv)) => csv
            .split(',')
            .map(|major| major.trim().parse::<u32>().map_err(|_| invalid()))
            .collect(),
        Some(Value::Array(majors)) => majors
            .iter()
            .map(|major| {
                major
                    .as_u64()
                    .and_then(|major| u32::try_from(major).ok())
                    .ok_or_else(invalid)
            })
            .collect(),
        _ => Err(Error::missing_field("supportedMajorVersions")),
    }
}
