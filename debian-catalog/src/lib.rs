// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Versioned package catalogs of Debian repository partitions.

A Debian repository publishes, for every distribution, one package index per
*partition*: a component (e.g. `main`), an architecture (e.g. `amd64` or `source`)
and a kind of package (`.deb`, `.udeb` or `.dsc`). This crate maintains the
authoritative store behind those indices and keeps it consistent with the
repository's pool of files.

# A Tour of Functionality

[target::Target] is the handle of a partition. It owns the partition's record table
while open. Records map a package name, and when old versions are retained also a
version, to a version string and a control chunk. [record] defines how records are
stored. Tables are provided by a [table::TableStore]; [table::MemoryTableStore] is an
in-memory implementation.

Everything the catalog needs to know about a control chunk is obtained through
[capabilities::PackageCapabilities], with implementations for binary and source
packages. Control chunks are parsed by [control]. Versions are ordered by
[version::VersionComparator], following dpkg's rules by default.

Packages enter a partition through [target::Target::add_package()] (see [admission])
and leave it through [target::Target::remove_package()] (see [removal]). Both keep
three stores in step: the record table, the file [references] ledger and the source
[tracking] ledger. There is no transaction spanning these. Changes are applied in a
fixed order and a failure after the table was written is reported as
[error::CatalogError::Incomplete] naming the stores that were updated.

[cursor::PackageCursor] walks a partition. While a walk is open, only the walk itself
may modify the table. The [maintenance] operations are walks rebuilding references,
reapplying [overrides] and completing [checksums] from a [files::FileStore].
[check] verifies records against the pool and the reference ledger.

Partitions remember whether they changed since they were last exported.
[target::Target::export()] writes index files through an [export::IndexExporter].
[distribution::Distribution] constructs all partitions of a [config::DistributionConfig].

Operations report their decisions as [events::CatalogEvent]. Install an
[events::EventSink] to receive them, otherwise they go to the `log` crate.
*/

pub mod admission;
pub mod capabilities;
pub mod check;
pub mod checksums;
pub mod config;
pub mod control;
pub mod cursor;
pub mod description;
pub mod distribution;
pub mod error;
pub mod events;
pub mod export;
pub mod files;
pub mod logger;
pub mod maintenance;
pub mod outcome;
pub mod overrides;
pub mod pool;
pub mod record;
pub mod references;
pub mod removal;
pub mod table;
pub mod target;
#[cfg(test)]
mod testutil;
pub mod tracking;
pub mod version;
