// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian package version strings and their ordering.

The catalog engine only needs a total order over version strings. That order is
injected as a [VersionComparator] so alternative orderings can be plugged in.
[DpkgVersionComparator] implements the ordering used by `dpkg`.
*/

use {
    std::{
        cmp::Ordering,
        fmt::{Display, Formatter},
        num::ParseIntError,
        str::FromStr,
    },
    thiserror::Error,
};

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum VersionError {
    #[error("error parsing epoch to integer: {0}")]
    ParseInt(#[from] ParseIntError),

    #[error("version string is empty")]
    Empty,

    #[error("the epoch component has non-digit characters: {0}")]
    EpochNonNumeric(String),

    #[error("upstream_version component is empty: {0}")]
    UpstreamVersionEmpty(String),

    #[error("upstream_version component has illegal character: {0}")]
    UpstreamVersionIllegalChar(String),

    #[error("debian_revision component has illegal character: {0}")]
    DebianRevisionIllegalChar(String),
}

pub type Result<T> = std::result::Result<T, VersionError>;

/// A Debian package version.
///
/// The format is `[epoch:]upstream_version[-debian_revision]`. See
/// <https://www.debian.org/doc/debian-policy/ch-controlfields.html#version>.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageVersion {
    epoch: Option<u32>,
    upstream_version: String,
    debian_revision: Option<String>,
}

impl PackageVersion {
    /// Construct an instance by parsing a version string.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionError::Empty);
        }

        let (epoch, remainder) = match s.split_once(':') {
            Some((epoch, remainder)) => (Some(epoch), remainder),
            None => (None, s),
        };

        let (upstream, debian) = match remainder.rsplit_once('-') {
            Some((upstream, debian)) => (upstream, Some(debian)),
            None => (remainder, None),
        };

        let epoch = match epoch {
            Some(epoch) if epoch.is_empty() || !epoch.chars().all(|c| c.is_ascii_digit()) => {
                return Err(VersionError::EpochNonNumeric(s.to_string()));
            }
            Some(epoch) => Some(u32::from_str(epoch)?),
            None => None,
        };

        if upstream.is_empty() {
            return Err(VersionError::UpstreamVersionEmpty(s.to_string()));
        }

        // Hyphens are only allowed in the upstream part when a revision follows. Colons
        // only when an epoch was given.
        if !upstream.chars().all(|c| match c {
            c if c.is_ascii_alphanumeric() => true,
            '.' | '+' | '~' => true,
            '-' => debian.is_some(),
            ':' => epoch.is_some(),
            _ => false,
        }) {
            return Err(VersionError::UpstreamVersionIllegalChar(s.to_string()));
        }

        if let Some(debian) = debian {
            if !debian
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '~'))
            {
                return Err(VersionError::DebianRevisionIllegalChar(s.to_string()));
            }
        }

        Ok(Self {
            epoch,
            upstream_version: upstream.to_string(),
            debian_revision: debian.map(|x| x.to_string()),
        })
    }

    /// The `epoch` component, if present.
    pub fn epoch(&self) -> Option<u32> {
        self.epoch
    }

    /// The `epoch` component, defaulting to `0`.
    pub fn epoch_assumed(&self) -> u32 {
        self.epoch.unwrap_or(0)
    }

    /// `upstream_version` component of the version string.
    pub fn upstream_version(&self) -> &str {
        &self.upstream_version
    }

    /// `debian_revision` component of the version string.
    pub fn debian_revision(&self) -> Option<&str> {
        self.debian_revision.as_deref()
    }

    /// The version without its epoch, as used in `.deb` filenames.
    pub fn without_epoch(&self) -> String {
        match &self.debian_revision {
            Some(revision) => format!("{}-{}", self.upstream_version, revision),
            None => self.upstream_version.clone(),
        }
    }
}

impl Display for PackageVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(epoch) = self.epoch {
            write!(f, "{}:", epoch)?;
        }

        write!(f, "{}", self.without_epoch())
    }
}

/// Sort weight of a non-digit character.
///
/// `~` sorts before everything, even the end of a part. Letters sort before
/// everything else.
fn char_order(c: Option<u8>) -> i32 {
    match c {
        None => 0,
        Some(b'~') => -1,
        Some(c) if c.is_ascii_digit() => 0,
        Some(c) if c.is_ascii_alphabetic() => c as i32,
        Some(c) => c as i32 + 256,
    }
}

/// Compare a version component (upstream or revision) using Debian rules.
///
/// Components are alternating runs of non-digits, compared with [char_order],
/// and digits, compared numerically.
fn compare_component(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut i, mut j) = (0, 0);

    while i < a.len() || j < b.len() {
        while (i < a.len() && !a[i].is_ascii_digit()) || (j < b.len() && !b[j].is_ascii_digit())
        {
            let ac = char_order(a.get(i).copied());
            let bc = char_order(b.get(j).copied());

            if ac != bc {
                return ac.cmp(&bc);
            }

            i += 1;
            j += 1;
        }

        while i < a.len() && a[i] == b'0' {
            i += 1;
        }
        while j < b.len() && b[j] == b'0' {
            j += 1;
        }

        let mut first_diff = Ordering::Equal;

        while i < a.len() && a[i].is_ascii_digit() && j < b.len() && b[j].is_ascii_digit() {
            if first_diff == Ordering::Equal {
                first_diff = a[i].cmp(&b[j]);
            }
            i += 1;
            j += 1;
        }

        // The longer run of significant digits is the larger number.
        if i < a.len() && a[i].is_ascii_digit() {
            return Ordering::Greater;
        }
        if j < b.len() && b[j].is_ascii_digit() {
            return Ordering::Less;
        }
        if first_diff != Ordering::Equal {
            return first_diff;
        }
    }

    Ordering::Equal
}

impl PartialOrd<Self> for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        // The absence of a revision is equivalent to an empty one.
        self.epoch_assumed()
            .cmp(&other.epoch_assumed())
            .then_with(|| compare_component(&self.upstream_version, &other.upstream_version))
            .then_with(|| {
                compare_component(
                    self.debian_revision.as_deref().unwrap_or(""),
                    other.debian_revision.as_deref().unwrap_or(""),
                )
            })
    }
}

/// A total order over version strings.
pub trait VersionComparator: Send + Sync {
    /// Compare version `a` against version `b`.
    ///
    /// Errors if either string cannot be parsed.
    fn compare(&self, a: &str, b: &str) -> Result<Ordering>;
}

/// Compares version strings the way `dpkg --compare-versions` does.
#[derive(Clone, Copy, Debug, Default)]
pub struct DpkgVersionComparator;

impl VersionComparator for DpkgVersionComparator {
    fn compare(&self, a: &str, b: &str) -> Result<Ordering> {
        Ok(PackageVersion::parse(a)?.cmp(&PackageVersion::parse(b)?))
    }
}
