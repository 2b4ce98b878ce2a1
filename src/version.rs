//! API microversions
//!
//! Clients pick a version per request through the
//! `X-OpenStack-Ironic-API-Version` header. The major version is fixed at 1;
//! the minor version gates which fields and verbs a client can see.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Header carrying the requested (and negotiated) version.
pub const VERSION_HEADER: &str = "X-OpenStack-Ironic-API-Version";
/// Header carrying the oldest supported version.
pub const MIN_VERSION_HEADER: &str = "X-OpenStack-Ironic-API-Minimum-Version";
/// Header carrying the newest supported version.
pub const MAX_VERSION_HEADER: &str = "X-OpenStack-Ironic-API-Maximum-Version";

/// Only major version served.
pub const BASE_VERSION: u32 = 1;

/// A `<major>.<minor>` API version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    pub const MIN: Self = Self::new(1, 1);
    pub const MAX: Self = Self::new(1, 11);

    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// True if `feature` is visible at this version.
    #[inline]
    pub fn supports(self, feature: Feature) -> bool {
        self >= feature.min_version()
    }

    /// Negotiate the version for a request from its raw header value.
    ///
    /// - no header selects [`ApiVersion::MIN`]
    /// - `latest` selects [`ApiVersion::MAX`]
    /// - anything else must parse and fall inside the supported range
    pub fn negotiate(header: Option<&str>) -> Result<Self, VersionError> {
        let version = match header.map(str::trim) {
            None | Some("") => return Ok(Self::MIN),
            Some(raw) if raw.eq_ignore_ascii_case("latest") => return Ok(Self::MAX),
            Some(raw) => raw.parse::<Self>()?,
        };

        if version.major != BASE_VERSION {
            return Err(VersionError::UnsupportedMajor { requested: version });
        }
        if version < Self::MIN || version > Self::MAX {
            return Err(VersionError::UnsupportedMinor { requested: version });
        }
        Ok(version)
    }
}

impl Default for ApiVersion {
    fn default() -> Self {
        Self::MIN
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ApiVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || VersionError::Malformed(s.to_string());
        let (major, minor) = s.trim().split_once('.').ok_or_else(malformed)?;
        let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !digits(major) || !digits(minor) {
            return Err(malformed());
        }
        Ok(Self::new(
            major.parse().map_err(|_| malformed())?,
            minor.parse().map_err(|_| malformed())?,
        ))
    }
}

/// Errors raised while negotiating a version
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// Header is not `<major>.<minor>` or `latest`
    #[error("Invalid value for X-OpenStack-Ironic-API-Version header: '{0}'")]
    Malformed(String),

    #[error(
        "Mutually exclusive versions requested. Version {requested} requested but not supported by this service. The supported version range is: [{}, {}].",
        ApiVersion::MIN,
        ApiVersion::MAX
    )]
    UnsupportedMajor { requested: ApiVersion },

    #[error(
        "Version {requested} was requested but the minor version is not supported by this service. The supported version range is: [{}, {}].",
        ApiVersion::MIN,
        ApiVersion::MAX
    )]
    UnsupportedMinor { requested: ApiVersion },
}

/// Behaviours introduced by a specific microversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// `available` replaces a null provision state
    AvailableState,
    DriverInternalInfo,
    /// `manageable` state with the `manage` and `provide` verbs
    ManageableState,
    LogicalNames,
    Inspection,
    CleanStep,
    FieldSelection,
    ProvisionStateFilter,
    /// Logical names may use any RFC 3986 unreserved character
    Rfc3986Names,
    /// Nodes start in `enroll` instead of `available`
    EnrollDefault,
}

impl Feature {
    pub const fn min_version(self) -> ApiVersion {
        let minor = match self {
            Self::AvailableState => 2,
            Self::DriverInternalInfo => 3,
            Self::ManageableState => 4,
            Self::LogicalNames => 5,
            Self::Inspection => 6,
            Self::CleanStep => 7,
            Self::FieldSelection => 8,
            Self::ProvisionStateFilter => 9,
            Self::Rfc3986Names => 10,
            Self::EnrollDefault => 11,
        };
        ApiVersion::new(BASE_VERSION, minor)
    }
}

/// Change log of every served microversion, oldest first.
pub const VERSION_LOG: &[(u32, &str)] = &[
    (1, "API at the point in time when versioning support was added"),
    (2, "Renamed the null provision state to 'available'"),
    (3, "Added node.driver_internal_info"),
    (4, "Added the 'manageable' state and the manage/provide verbs"),
    (5, "Added logical node names"),
    (6, "Added the inspecting and inspect failed states"),
    (7, "Added node.clean_step"),
    (8, "Added the ability to return a subset of resource fields"),
    (9, "Added filtering of nodes by provision state"),
    (10, "Logical node names support RFC 3986 unreserved characters"),
    (11, "Nodes appear in the enroll state by default"),
];
