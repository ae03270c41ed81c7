//! Document versioning for optimistic concurrency control.
//!
//! Every mutable document (a court's day schedule, a game) is stored together with
//! a [`Version`]. Writers read a [`Versioned`] value, decide, and write back with the
//! version they read; the store rejects the write if someone else committed first.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Document version number for optimistic concurrency control.
///
/// Version 0 means "the document does not exist yet". The first committed write
/// produces version 1 and every subsequent write increments by one.
///
/// # Examples
///
/// ```
/// use courtbook_core::version::Version;
///
/// let v0 = Version::ABSENT;
/// let v1 = v0.next();
/// assert_eq!(v1, Version::new(1));
/// assert_eq!(v1.value(), 1);
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// The version of a document that has never been written.
    pub const ABSENT: Self = Self(0);

    /// Create a new `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next version (current + 1).
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Whether this is the version of a document that does not exist yet.
    #[must_use]
    pub const fn is_absent(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A value paired with the version it was read at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// The document
    pub value: T,
    /// Version the document was read at
    pub version: Version,
}

impl<T> Versioned<T> {
    /// Pair a value with a version.
    #[must_use]
    pub const fn new(value: T, version: Version) -> Self {
        Self { value, version }
    }

    /// A value that has not been persisted yet.
    #[must_use]
    pub const fn absent(value: T) -> Self {
        Self {
            value,
            version: Version::ABSENT,
        }
    }

    /// Drop the version and keep the value.
    #[must_use]
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Transform the value, keeping the version.
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Versioned<U> {
        Versioned {
            value: f(self.value),
            version: self.version,
        }
    }
}
