//! Document schema versions.

use std::fmt;

/// Newest document version this engine can emit.
pub const CURRENT_VERSION: Version = Version::new(0, 2, 0);

/// A `(major, minor, patch)` document version, ordered lexicographically.
///
/// # Examples
///
/// ```
/// use engine::Version;
///
/// let parsed = Version::parse("0.1.0").unwrap();
/// assert!(parsed < Version::new(0, 2, 0));
/// assert_eq!(parsed.to_string(), "0.1.0");
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Version {
    /// Major component; incompatible schema changes.
    pub major: u32,
    /// Minor component; additive schema changes.
    pub minor: u32,
    /// Patch component.
    pub patch: u32,
}

impl Version {
    /// The all-zero version selecting the legacy CSV format.
    pub const ZERO: Version = Version::new(0, 0, 0);

    /// Creates a version from its components.
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses a `major.minor.patch` string.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(major, minor, patch))
    }

    /// Reports whether this version may be requested as an output version.
    ///
    /// Anything within the engine's major line is acceptable; the effective
    /// version is clamped downward at export time, never upward.
    #[must_use]
    pub fn is_valid_output(self) -> bool {
        self.major <= CURRENT_VERSION.major
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
