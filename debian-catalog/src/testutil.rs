// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    crate::{
        config::ExportMode,
        error::Result,
        events::CatalogEvent,
        table::MemoryTableStore,
        target::{Target, TargetContext, TargetOptions},
        version::{DpkgVersionComparator, VersionComparator},
    },
    std::sync::{Arc, Mutex},
};

pub type CapturedEvents = Arc<Mutex<Vec<CatalogEvent>>>;

/// A context with an in-memory table store whose events are captured.
pub fn context() -> (TargetContext, CapturedEvents) {
    let versions: Arc<dyn VersionComparator> = Arc::new(DpkgVersionComparator);
    let events = CapturedEvents::default();
    let sink_events = events.clone();

    (
        TargetContext {
            store: Arc::new(MemoryTableStore::new(versions.clone())),
            versions,
            events: Some(Arc::new(move |event: &CatalogEvent| {
                sink_events.lock().unwrap().push(event.clone())
            })),
        },
        events,
    )
}

/// The `bookworm|main|amd64` binary partition.
pub fn binary_target(context: &TargetContext, options: &TargetOptions) -> Result<Target> {
    Target::new_binary(
        context,
        "bookworm",
        "main",
        "amd64",
        Arc::new(ExportMode::packages()),
        options,
    )
}

/// The pool file key of a binary package.
pub fn deb_key(name: &str, version: &str) -> String {
    format!("pool/main/{}/{}/{}_{}_amd64.deb", &name[0..1], name, name, version)
}

/// A binary package control chunk.
pub fn deb_chunk(name: &str, version: &str) -> String {
    format!(
        "Package: {}\nVersion: {}\nArchitecture: amd64\nFilename: {}\n",
        name,
        version,
        deb_key(name, version)
    )
}

/// Take the captured events.
pub fn take_events(events: &CapturedEvents) -> Vec<CatalogEvent> {
    std::mem::take(&mut *events.lock().unwrap())
}
