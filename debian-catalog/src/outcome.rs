// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Results of catalog mutations.

A mutation touches up to three independently stored subsystems: the package table,
the file reference ledger and the tracking ledger. There is no transaction spanning
them. [StoreUpdates] records which of them an operation actually changed, both on
success (inside [Outcome::Changed]) and on failure (inside
[crate::error::CatalogError::Incomplete]).
*/

use std::fmt::{Display, Formatter};

/// What happened to the tracking ledger during a mutation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TrackingUpdate {
    /// No tracking work was attempted.
    NotAttempted,
    /// The tracking ledger was updated.
    Updated,
    /// No tracking context was supplied, so the partition was flagged as having stale tracking.
    MarkedStale,
    /// A tracking context was supplied but the record had no usable source linkage.
    NoLinkage,
    /// Updating the tracking ledger failed.
    Failed,
}

impl Default for TrackingUpdate {
    fn default() -> Self {
        Self::NotAttempted
    }
}

/// Which stores a mutation changed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StoreUpdates {
    /// The package table was written.
    pub table: bool,
    /// The reference ledger was completely updated.
    pub references: bool,
    /// Tracking ledger disposition.
    pub tracking: TrackingUpdate,
    /// The audit logger was invoked.
    pub logged: bool,
}

impl Display for StoreUpdates {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "table={} references={} tracking={:?} logged={}",
            self.table, self.references, self.tracking, self.logged
        )
    }
}

/// The result of a catalog mutation that did not fail.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// Nothing was changed. e.g. the package was already present or absent.
    Nothing,
    /// Stores were changed.
    Changed(StoreUpdates),
}

impl Outcome {
    /// Whether anything was changed.
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed(_))
    }

    /// The applied updates, if anything changed.
    pub fn updates(&self) -> Option<StoreUpdates> {
        match self {
            Self::Nothing => None,
            Self::Changed(updates) => Some(*updates),
        }
    }
}
