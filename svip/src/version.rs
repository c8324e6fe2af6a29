use crate::errors::{ErrorKind, SvipError, SvipResult};
use semver::VersionReq;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An opaque, totally ordered version identifier.
///
/// Any ordered, printable type qualifies: `u32`, `u64`, [`SchemaVersion`] or an
/// application's own newtype. `Default::default()` is the version of a store that
/// has never been migrated.
pub trait Version: Ord + Clone + Debug + Display + Default + Send + Sync + 'static {}

impl<T> Version for T where T: Ord + Clone + Debug + Display + Default + Send + Sync + 'static {}

/// A version that can be read as a semantic version.
///
/// Requirement matching (`latest_match`, `check_requirement`, the `match`
/// command) is only offered for these. Plain integers read as `N.0.0`, so `^2`
/// matches version `2` but not `3`.
pub trait SemanticVersion: Version {
    fn to_semver(&self) -> semver::Version;

    /// `true` when this version satisfies `requirement`.
    fn satisfies(&self, requirement: &VersionReq) -> bool {
        requirement.matches(&self.to_semver())
    }
}

macro_rules! integer_semantic_version {
    ($($ty:ty),*) => {
        $(
            impl SemanticVersion for $ty {
                fn to_semver(&self) -> semver::Version {
                    semver::Version::new(u64::from(*self), 0, 0)
                }
            }
        )*
    };
}

integer_semantic_version!(u8, u16, u32, u64);

impl SemanticVersion for usize {
    fn to_semver(&self) -> semver::Version {
        semver::Version::new(*self as u64, 0, 0)
    }
}

/// Parses a version requirement such as `^1.2`, `>=1, <3` or `*`.
pub fn parse_requirement(spec: &str) -> SvipResult<VersionReq> {
    VersionReq::parse(spec.trim()).map_err(|err| {
        log::error!("Invalid version requirement '{}': {}", spec, err);
        SvipError::new(
            &format!("Invalid version requirement '{}': {}", spec, err),
            ErrorKind::ValidationError,
        )
    })
}

/// Direction of travel between two versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Upgrade,
    Downgrade,
}

impl Direction {
    /// Direction needed to go from `from` to `to`, `None` when they are equal.
    pub fn between<V: Ord>(from: &V, to: &V) -> Option<Direction> {
        match from.cmp(to) {
            std::cmp::Ordering::Less => Some(Direction::Upgrade),
            std::cmp::Ordering::Greater => Some(Direction::Downgrade),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// `true` when moving from `from` to `to` goes this way.
    pub fn advances<V: Ord>(&self, from: &V, to: &V) -> bool {
        match self {
            Direction::Upgrade => to > from,
            Direction::Downgrade => to < from,
        }
    }

    /// `true` when `to` lies past `limit` for this direction.
    pub fn overshoots<V: Ord>(&self, to: &V, limit: &V) -> bool {
        match self {
            Direction::Upgrade => to > limit,
            Direction::Downgrade => to < limit,
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Upgrade => write!(f, "upgrade"),
            Direction::Downgrade => write!(f, "downgrade"),
        }
    }
}

/// A semantic version, `major.minor.patch` with optional pre-release and build
/// metadata.
///
/// Parsing follows semver 2.0 strictly: all three components are required and
/// leading zeros are rejected. The default `0.0.0` stands for an uninitialized
/// store. Pre-releases order before their release, `1.0.0-rc.1 < 1.0.0`.
///
/// ```rust
/// use svip::SchemaVersion;
///
/// let v: SchemaVersion = "1.4.0".parse().unwrap();
/// assert_eq!(v, SchemaVersion::new(1, 4, 0));
/// assert_eq!(v.next_minor().unwrap().to_string(), "1.5.0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct SchemaVersion(semver::Version);

impl SchemaVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        SchemaVersion(semver::Version::new(major, minor, patch))
    }

    pub fn major(&self) -> u64 {
        self.0.major
    }

    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    pub fn patch(&self) -> u64 {
        self.0.patch
    }

    /// `true` for versions carrying a pre-release tag such as `-rc.1`.
    pub fn is_prerelease(&self) -> bool {
        !self.0.pre.is_empty()
    }

    pub fn as_semver(&self) -> &semver::Version {
        &self.0
    }

    /// Next major release, `None` on overflow.
    pub fn next_major(&self) -> Option<SchemaVersion> {
        let major = self.0.major.checked_add(1)?;
        Some(SchemaVersion::new(major, 0, 0))
    }

    /// Next minor release, `None` on overflow.
    pub fn next_minor(&self) -> Option<SchemaVersion> {
        let minor = self.0.minor.checked_add(1)?;
        Some(SchemaVersion::new(self.0.major, minor, 0))
    }

    /// Next patch release, `None` on overflow.
    pub fn next_patch(&self) -> Option<SchemaVersion> {
        let patch = self.0.patch.checked_add(1)?;
        Some(SchemaVersion::new(self.0.major, self.0.minor, patch))
    }

    /// Parses a version string, reporting malformed input as a validation error.
    pub fn parse(value: &str) -> SvipResult<SchemaVersion> {
        semver::Version::parse(value.trim())
            .map(SchemaVersion)
            .map_err(|err| {
                log::error!("Invalid version '{}': {}", value, err);
                SvipError::new(
                    &format!("Invalid version '{}': {}", value, err),
                    ErrorKind::ValidationError,
                )
            })
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        SchemaVersion::new(0, 0, 0)
    }
}

impl SemanticVersion for SchemaVersion {
    fn to_semver(&self) -> semver::Version {
        self.0.clone()
    }
}

impl Display for SchemaVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl FromStr for SchemaVersion {
    type Err = SvipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SchemaVersion::parse(s)
    }
}

impl From<semver::Version> for SchemaVersion {
    fn from(value: semver::Version) -> Self {
        SchemaVersion(value)
    }
}

impl From<(u64, u64, u64)> for SchemaVersion {
    fn from(value: (u64, u64, u64)) -> Self {
        SchemaVersion::new(value.0, value.1, value.2)
    }
}
