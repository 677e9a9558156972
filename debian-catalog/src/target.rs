// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Catalog partitions.

A [Target] is one partition of a distribution: the packages of one package kind for
one component and architecture. It owns the handle of the partition's record table
while open and tracks whether the partition needs exporting.

Admission, removal, cursor walks, bulk maintenance, consistency checks and export are
implemented on [Target] in their own modules.
*/

use {
    crate::{
        capabilities::{
            BinaryCapabilities, PackageCapabilities, PackageType, SourceCapabilities,
        },
        config::{ExportMode, IgnoreOptions},
        error::{CatalogError, Result},
        events::{CatalogEvent, EventSink},
        record::{primary_key, PackageData},
        table::{RecordTable, TableStore},
        version::VersionComparator,
    },
    std::sync::Arc,
};

/// Collaborators shared by every partition of a distribution.
#[derive(Clone)]
pub struct TargetContext {
    /// Opens record tables.
    pub store: Arc<dyn TableStore>,
    /// Orders version strings.
    pub versions: Arc<dyn VersionComparator>,
    /// Receives diagnostics. Without one they go to the `log` crate.
    pub events: Option<EventSink>,
}

/// Partition wide settings.
#[derive(Clone, Debug, Default)]
pub struct TargetOptions {
    /// Refuse opening the table for writing.
    pub read_only: bool,
    /// Refuse exporting.
    pub no_export: bool,
    /// Keep old versions next to newer ones.
    pub retain_old_versions: bool,
    /// Tolerated inconsistencies.
    pub ignore: IgnoreOptions,
    /// Component name prefix that is omitted in export directories.
    pub fake_component_prefix: Option<String>,
}

/// Derive the partition identifier.
fn identifier(
    codename: &str,
    component: &str,
    architecture: &str,
    package_type: PackageType,
) -> Result<String> {
    if codename.contains('|') {
        return Err(CatalogError::CodenameSeparator(codename.to_string()));
    }

    Ok(if package_type == PackageType::Udeb {
        format!("u|{}|{}|{}", codename, component, architecture)
    } else {
        format!("{}|{}|{}", codename, component, architecture)
    })
}

/// Component name as used in export directories.
fn directory_component<'a>(component: &'a str, fake_prefix: Option<&str>) -> &'a str {
    match fake_prefix {
        Some(prefix) => component
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(component),
        None => component,
    }
}

/// A catalog partition.
pub struct Target {
    pub(crate) codename: String,
    pub(crate) component: String,
    pub(crate) architecture: String,
    pub(crate) package_type: PackageType,
    pub(crate) identifier: String,
    pub(crate) relative_directory: String,
    pub(crate) export_mode: Arc<ExportMode>,
    pub(crate) capabilities: Arc<dyn PackageCapabilities>,
    pub(crate) versions: Arc<dyn VersionComparator>,
    store: Arc<dyn TableStore>,
    pub(crate) packages: Option<Box<dyn RecordTable>>,
    pub(crate) cursor_open: bool,
    pub(crate) read_only: bool,
    pub(crate) no_export: bool,
    pub(crate) retain_old_versions: bool,
    pub(crate) ignore: IgnoreOptions,
    pub(crate) was_modified: bool,
    pub(crate) saved_was_modified: bool,
    pub(crate) stale_tracking: bool,
    events: Option<EventSink>,
}

impl Target {
    /// Construct a partition bound to a capability set.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: &TargetContext,
        codename: &str,
        component: &str,
        architecture: &str,
        capabilities: Arc<dyn PackageCapabilities>,
        relative_directory: String,
        export_mode: Arc<ExportMode>,
        options: &TargetOptions,
    ) -> Result<Self> {
        let package_type = capabilities.package_type();

        Ok(Self {
            codename: codename.to_string(),
            component: component.to_string(),
            architecture: architecture.to_string(),
            package_type,
            identifier: identifier(codename, component, architecture, package_type)?,
            relative_directory,
            export_mode,
            capabilities,
            versions: context.versions.clone(),
            store: context.store.clone(),
            packages: None,
            cursor_open: false,
            read_only: options.read_only,
            no_export: options.no_export,
            retain_old_versions: options.retain_old_versions,
            ignore: options.ignore,
            was_modified: false,
            saved_was_modified: false,
            stale_tracking: false,
            events: context.events.clone(),
        })
    }

    /// Construct a binary package partition.
    pub fn new_binary(
        context: &TargetContext,
        codename: &str,
        component: &str,
        architecture: &str,
        export_mode: Arc<ExportMode>,
        options: &TargetOptions,
    ) -> Result<Self> {
        let directory = format!(
            "{}/binary-{}",
            directory_component(component, options.fake_component_prefix.as_deref()),
            architecture
        );

        Self::new(
            context,
            codename,
            component,
            architecture,
            Arc::new(BinaryCapabilities::deb()),
            directory,
            export_mode,
            options,
        )
    }

    /// Construct an installer package partition.
    pub fn new_installer(
        context: &TargetContext,
        codename: &str,
        component: &str,
        architecture: &str,
        export_mode: Arc<ExportMode>,
        options: &TargetOptions,
    ) -> Result<Self> {
        let directory = format!(
            "{}/debian-installer/binary-{}",
            directory_component(component, options.fake_component_prefix.as_deref()),
            architecture
        );

        Self::new(
            context,
            codename,
            component,
            architecture,
            Arc::new(BinaryCapabilities::udeb()),
            directory,
            export_mode,
            options,
        )
    }

    /// Construct a source package partition.
    pub fn new_source(
        context: &TargetContext,
        codename: &str,
        component: &str,
        export_mode: Arc<ExportMode>,
        options: &TargetOptions,
    ) -> Result<Self> {
        let directory = format!(
            "{}/source",
            directory_component(component, options.fake_component_prefix.as_deref())
        );

        Self::new(
            context,
            codename,
            component,
            "source",
            Arc::new(SourceCapabilities::default()),
            directory,
            export_mode,
            options,
        )
    }

    /// The unique partition identifier, `[u|]codename|component|architecture`.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn codename(&self) -> &str {
        &self.codename
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    pub fn package_type(&self) -> PackageType {
        self.package_type
    }

    /// Directory of index files relative to the distribution directory.
    pub fn relative_directory(&self) -> &str {
        &self.relative_directory
    }

    pub fn export_mode(&self) -> &ExportMode {
        &self.export_mode
    }

    pub fn capabilities(&self) -> &dyn PackageCapabilities {
        self.capabilities.as_ref()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_export_forbidden(&self) -> bool {
        self.no_export
    }

    pub fn retains_old_versions(&self) -> bool {
        self.retain_old_versions
    }

    /// Whether the partition changed since it was last exported.
    pub fn was_modified(&self) -> bool {
        self.was_modified
    }

    /// Whether the partition changed at any point, including changes already exported.
    pub fn saved_was_modified(&self) -> bool {
        self.saved_was_modified || self.was_modified
    }

    /// Whether a change happened without the tracking ledger taking part.
    pub fn has_stale_tracking(&self) -> bool {
        self.stale_tracking
    }

    /// Whether the record table is open.
    pub fn is_open(&self) -> bool {
        self.packages.is_some()
    }

    /// Open the record table.
    ///
    /// Opening for writing fails on read-only partitions. Opening an open table fails.
    pub fn open_table(&mut self, read_only: bool) -> Result<()> {
        if !read_only && self.read_only {
            return Err(CatalogError::TargetReadOnly {
                identifier: self.identifier.clone(),
                codename: self.codename.clone(),
            });
        }
        if self.packages.is_some() {
            return Err(CatalogError::TableAlreadyOpen(self.identifier.clone()));
        }

        self.packages = Some(self.store.open(&self.identifier, read_only)?);

        Ok(())
    }

    /// Close the record table.
    ///
    /// Closing a closed table only emits a warning.
    pub fn close_table(&mut self) -> Result<()> {
        if self.cursor_open {
            return Err(CatalogError::CursorOpen(self.identifier.clone()));
        }

        match self.packages.take() {
            Some(table) => table.close(),
            None => {
                self.emit(CatalogEvent::DoubleClose {
                    identifier: self.identifier.clone(),
                });
                Ok(())
            }
        }
    }

    /// Look up a record.
    ///
    /// Without a version the current record of the name is returned.
    pub fn get_package(&self, name: &str, version: Option<&str>) -> Result<Option<PackageData>> {
        Ok(self.find_record(name, version)?.map(|(_, data)| data))
    }

    /// Look up a record along with the key it is stored under.
    pub(crate) fn find_record(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<Option<(String, PackageData)>> {
        let table = self.table()?;

        let found = match version {
            None => table.get_latest(name)?,
            Some(_) => {
                let key = primary_key(name, version, self.retain_old_versions);
                table.get(&key)?.map(|bytes| (key, bytes))
            }
        };

        let (key, bytes) = match found {
            Some(found) => found,
            None => return Ok(None),
        };

        Ok(match PackageData::decode(&key, &bytes)? {
            // Without retention the key does not carry the version.
            Some(data) if version.map(|v| v == data.version).unwrap_or(true) => {
                Some((key, data))
            }
            _ => None,
        })
    }

    pub(crate) fn table(&self) -> Result<&dyn RecordTable> {
        self.packages
            .as_deref()
            .ok_or_else(|| CatalogError::TableNotOpen(self.identifier.clone()))
    }

    pub(crate) fn table_mut(&mut self) -> Result<&mut (dyn RecordTable + 'static)> {
        match self.packages.as_deref_mut() {
            Some(table) => Ok(table),
            None => Err(CatalogError::TableNotOpen(self.identifier.clone())),
        }
    }

    /// Fail if a cursor is open, as only cursor operations may then modify the table.
    pub(crate) fn check_no_cursor(&self) -> Result<()> {
        if self.cursor_open {
            Err(CatalogError::CursorOpen(self.identifier.clone()))
        } else {
            Ok(())
        }
    }

    pub(crate) fn emit(&self, event: CatalogEvent) {
        event.emit(self.events.as_ref());
    }
}

impl Drop for Target {
    fn drop(&mut self) {
        if let Some(table) = self.packages.take() {
            if let Err(e) = table.close() {
                log::error!("error closing package table of {}: {}", self.identifier, e);
            }
        }

        if self.was_modified && !self.no_export {
            self.emit(CatalogEvent::ModifiedNotExported {
                identifier: self.identifier.clone(),
            });
        }
    }
}

#[cfg(test)]
mod test {
    use {super::*, crate::testutil::context};

    #[test]
    fn identifiers_and_directories() -> Result<()> {
        let (context, _) = context();
        let options = TargetOptions {
            fake_component_prefix: Some("updates".into()),
            ..Default::default()
        };
        let mode = Arc::new(ExportMode::packages());

        let t = Target::new_binary(
            &context,
            "bookworm",
            "updates/main",
            "amd64",
            mode.clone(),
            &options,
        )?;
        assert_eq!(t.identifier(), "bookworm|updates/main|amd64");
        assert_eq!(t.relative_directory(), "main/binary-amd64");
        assert_eq!(t.package_type(), PackageType::Deb);

        let t = Target::new_installer(&context, "bookworm", "main", "arm64", mode, &options)?;
        assert_eq!(t.identifier(), "u|bookworm|main|arm64");
        assert_eq!(t.relative_directory(), "main/debian-installer/binary-arm64");

        let t = Target::new_source(
            &context,
            "bookworm",
            "contrib",
            Arc::new(ExportMode::sources()),
            &TargetOptions::default(),
        )?;
        assert_eq!(t.identifier(), "bookworm|contrib|source");
        assert_eq!(t.relative_directory(), "contrib/source");
        assert_eq!(t.architecture(), "source");

        assert!(matches!(
            Target::new_source(
                &context,
                "a|b",
                "main",
                Arc::new(ExportMode::sources()),
                &TargetOptions::default()
            ),
            Err(CatalogError::CodenameSeparator(_))
        ));

        Ok(())
    }

    #[test]
    fn open_close() -> Result<()> {
        let (context, events) = context();
        let options = TargetOptions {
            read_only: true,
            ..Default::default()
        };

        let mut t = Target::new_binary(
            &context,
            "bookworm",
            "main",
            "amd64",
            Arc::new(ExportMode::packages()),
            &options,
        )?;

        assert!(matches!(
            t.open_table(false),
            Err(CatalogError::TargetReadOnly { .. })
        ));
        assert!(!t.is_open());

        t.open_table(true)?;
        assert!(matches!(
            t.open_table(true),
            Err(CatalogError::TableAlreadyOpen(_))
        ));
        assert_eq!(t.get_package("foo", None)?, None);

        t.close_table()?;
        t.close_table()?;
        assert!(matches!(t.get_package("foo", None), Err(CatalogError::TableNotOpen(_))));

        assert_eq!(
            events.lock().unwrap().as_slice(),
            &[CatalogEvent::DoubleClose {
                identifier: "bookworm|main|amd64".into()
            }]
        );

        Ok(())
    }

    #[test]
    fn drop_warns_when_unexported() -> Result<()> {
        let (context, events) = context();

        let mut t = Target::new_binary(
            &context,
            "bookworm",
            "main",
            "amd64",
            Arc::new(ExportMode::packages()),
            &TargetOptions::default(),
        )?;
        t.open_table(false)?;
        t.was_modified = true;
        drop(t);

        assert_eq!(
            events.lock().unwrap().as_slice(),
            &[CatalogEvent::ModifiedNotExported {
                identifier: "bookworm|main|amd64".into()
            }]
        );

        Ok(())
    }
}
