// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Distributions and their partitions. */

use {
    crate::{
        capabilities::PackageType,
        config::DistributionConfig,
        error::{CatalogError, Result},
        export::{IndexExporter, ReleaseIndex},
        overrides::OverrideFile,
        target::{Target, TargetContext, TargetOptions},
    },
    std::{collections::HashMap, sync::Arc},
};

/// A distribution: the set of partitions of one codename.
pub struct Distribution {
    config: DistributionConfig,
    targets: Vec<Target>,
    overrides: HashMap<PackageType, OverrideFile>,
}

impl Distribution {
    /// Construct every partition a configuration describes.
    ///
    /// Binary partitions exist for every component and architecture, installer
    /// partitions for every installer component and architecture, and source
    /// partitions for every component if `source` is among the architectures.
    /// Configured override files are loaded.
    pub fn new(config: DistributionConfig, context: &TargetContext) -> Result<Self> {
        let options = TargetOptions {
            read_only: config.read_only,
            no_export: config.no_export,
            retain_old_versions: config.retain_old_versions,
            ignore: config.ignore,
            fake_component_prefix: config.fake_component_prefix.clone(),
        };

        let deb_export = Arc::new(config.deb_export.clone());
        let udeb_export = Arc::new(config.udeb_export.clone());
        let dsc_export = Arc::new(config.dsc_export.clone());

        let architectures = config
            .architectures
            .iter()
            .filter(|arch| arch.as_str() != "source")
            .collect::<Vec<_>>();

        let mut targets = vec![];

        for component in &config.components {
            for arch in &architectures {
                targets.push(Target::new_binary(
                    context,
                    &config.codename,
                    component,
                    arch,
                    deb_export.clone(),
                    &options,
                )?);
            }

            if config.udeb_components.contains(component) {
                for arch in &architectures {
                    targets.push(Target::new_installer(
                        context,
                        &config.codename,
                        component,
                        arch,
                        udeb_export.clone(),
                        &options,
                    )?);
                }
            }

            if architectures.len() != config.architectures.len() {
                targets.push(Target::new_source(
                    context,
                    &config.codename,
                    component,
                    dsc_export.clone(),
                    &options,
                )?);
            }
        }

        let mut overrides = HashMap::new();
        for (package_type, path) in [
            (PackageType::Deb, &config.deb_override),
            (PackageType::Udeb, &config.udeb_override),
            (PackageType::Dsc, &config.dsc_override),
        ] {
            if let Some(path) = path {
                overrides.insert(package_type, OverrideFile::from_path(path)?);
            }
        }

        Ok(Self {
            config,
            targets,
            overrides,
        })
    }

    pub fn codename(&self) -> &str {
        &self.config.codename
    }

    pub fn config(&self) -> &DistributionConfig {
        &self.config
    }

    /// Find a partition.
    pub fn target(
        &mut self,
        component: &str,
        architecture: &str,
        package_type: PackageType,
    ) -> Result<&mut Target> {
        self.targets
            .iter_mut()
            .find(|t| {
                t.component() == component
                    && t.architecture() == architecture
                    && t.package_type() == package_type
            })
            .ok_or_else(|| {
                CatalogError::UnknownPartition(format!(
                    "{} {} {} {}",
                    self.config.codename, component, architecture, package_type
                ))
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Target> {
        self.targets.iter_mut()
    }

    /// The override file configured for a kind of packages.
    pub fn overrides(&self, package_type: PackageType) -> Option<&OverrideFile> {
        self.overrides.get(&package_type)
    }

    /// Whether any partition changed since it was loaded.
    pub fn was_modified(&self) -> bool {
        self.targets.iter().any(|t| t.saved_was_modified())
    }

    /// Export every partition.
    ///
    /// Nothing is exported if the distribution forbids it.
    pub fn export_all(
        &mut self,
        exporter: &mut dyn IndexExporter,
        only_if_changed: bool,
    ) -> Result<ReleaseIndex> {
        let mut release = ReleaseIndex::default();

        if self.config.no_export {
            return Ok(release);
        }

        for target in self.targets.iter_mut() {
            target.export(exporter, &mut release, only_if_changed, false)?;
        }

        Ok(release)
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{
            admission::NewPackage, export::FilesystemIndexExporter,
            references::MemoryReferences, testutil::context,
        },
        indoc::indoc,
    };

    const CONFIG: &str = indoc! {"
        codename: bookworm
        components: [main, contrib]
        architectures: [amd64, arm64, source]
        udeb_components: [main]
    "};

    #[test]
    fn partitions() -> Result<()> {
        let (context, _) = context();
        let mut dist = Distribution::new(DistributionConfig::from_yaml_str(CONFIG)?, &context)?;

        let identifiers = dist
            .iter()
            .map(|t| t.identifier().to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            identifiers,
            vec![
                "bookworm|main|amd64",
                "bookworm|main|arm64",
                "u|bookworm|main|amd64",
                "u|bookworm|main|arm64",
                "bookworm|main|source",
                "bookworm|contrib|amd64",
                "bookworm|contrib|arm64",
                "bookworm|contrib|source",
            ]
        );

        assert_eq!(
            dist.target("contrib", "source", PackageType::Dsc)?.relative_directory(),
            "contrib/source"
        );
        assert!(matches!(
            dist.target("contrib", "amd64", PackageType::Udeb),
            Err(CatalogError::UnknownPartition(_))
        ));
        assert!(dist.overrides(PackageType::Deb).is_none());

        Ok(())
    }

    #[test]
    fn overrides_and_export() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let override_path = td.path().join("override.deb");
        std::fs::write(&override_path, "hello optional devel\n")?;

        let mut config = DistributionConfig::from_yaml_str(CONFIG)?;
        config.deb_override = Some(override_path);

        let (context, _) = context();
        let mut dist = Distribution::new(config, &context)?;
        assert_eq!(
            dist.overrides(PackageType::Deb)
                .and_then(|o| o.fields("hello"))
                .map(|f| f.len()),
            Some(2)
        );

        let mut refs = MemoryReferences::default();
        let chunk = indoc! {"
            Package: hello
            Version: 1.0
            Architecture: amd64
            Filename: pool/main/h/hello/hello_1.0_amd64.deb
        "};
        let keys = vec!["pool/main/h/hello/hello_1.0_amd64.deb".to_string()];

        let target = dist.target("main", "amd64", PackageType::Deb)?;
        target.open_table(false)?;
        target.add_package(
            &mut refs,
            None,
            None,
            &NewPackage::new("hello", "1.0", chunk, &keys, "amd64"),
            None,
        )?;
        target.close_table()?;
        assert!(dist.was_modified());

        let mut exporter = FilesystemIndexExporter::new(td.path().join("dists/bookworm"));
        let release = dist.export_all(&mut exporter, true)?;

        // Two compressions for each of the eight partitions.
        assert_eq!(release.len(), 16);
        assert!(dist.iter().all(|t| !t.was_modified()));
        assert!(dist.was_modified());
        assert!(td
            .path()
            .join("dists/bookworm/main/debian-installer/binary-arm64/Packages.gz")
            .exists());
        assert!(td.path().join("dists/bookworm/contrib/source/Sources").exists());

        Ok(())
    }
}
