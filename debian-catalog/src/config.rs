// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Distribution configuration. */

use {
    crate::error::{CatalogError, Result},
    serde::{Deserialize, Serialize},
    std::path::{Path, PathBuf},
};

/// Compression format of exported index files.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// No compression (no extension).
    None,

    /// Gzip compression (.gz extension).
    Gzip,

    /// XZ compression (.xz extension).
    Xz,
}

impl Compression {
    /// Filename extension for files compressed in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Gzip => ".gz",
            Self::Xz => ".xz",
        }
    }
}

/// How index files of a partition are exported.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExportMode {
    /// Base name of the index file, e.g. `Packages`.
    pub filename: String,

    /// Compressed variants to write.
    #[serde(default = "ExportMode::default_compressions")]
    pub compressions: Vec<Compression>,
}

impl ExportMode {
    fn default_compressions() -> Vec<Compression> {
        vec![Compression::None, Compression::Gzip]
    }

    /// Export mode of binary package partitions.
    pub fn packages() -> Self {
        Self {
            filename: "Packages".to_string(),
            compressions: Self::default_compressions(),
        }
    }

    /// Export mode of source package partitions.
    pub fn sources() -> Self {
        Self {
            filename: "Sources".to_string(),
            compressions: Self::default_compressions(),
        }
    }
}

/// Tolerated inconsistencies.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct IgnoreOptions {
    /// Treat records whose version cannot be compared as absent.
    ///
    /// References of overwritten records are not released until the partition is
    /// rereferenced.
    pub broken_version_comparison: bool,

    /// Ignore stored records whose file list or source cannot be extracted.
    pub broken_old_data: bool,
}

/// A configuration for initializing a [crate::distribution::Distribution].
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DistributionConfig {
    /// Codename of the distribution, e.g. `bookworm`.
    pub codename: String,

    /// Components, e.g. `main`.
    pub components: Vec<String>,

    /// Architectures. `source` enables source package partitions.
    pub architectures: Vec<String>,

    /// Components having installer package partitions.
    #[serde(default)]
    pub udeb_components: Vec<String>,

    /// Refuse modifications.
    #[serde(default)]
    pub read_only: bool,

    /// Never write index files.
    #[serde(default)]
    pub no_export: bool,

    /// Keep older versions next to newer ones instead of replacing them.
    #[serde(default)]
    pub retain_old_versions: bool,

    /// Prefix of component names that is omitted in index file directories.
    pub fake_component_prefix: Option<String>,

    #[serde(default = "ExportMode::packages")]
    pub deb_export: ExportMode,

    #[serde(default = "ExportMode::packages")]
    pub udeb_export: ExportMode,

    #[serde(default = "ExportMode::sources")]
    pub dsc_export: ExportMode,

    /// Override file applied to binary packages.
    pub deb_override: Option<PathBuf>,

    /// Override file applied to installer packages.
    pub udeb_override: Option<PathBuf>,

    /// Override file applied to source packages.
    pub dsc_override: Option<PathBuf>,

    #[serde(default)]
    pub ignore: IgnoreOptions,
}

impl DistributionConfig {
    /// Parse a YAML document.
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(s)?;

        if config.codename.contains('|') {
            return Err(CatalogError::CodenameSeparator(config.codename));
        }

        Ok(config)
    }

    /// Parse a YAML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::IoPath(format!("{}", path.display()), e))?;

        Self::from_yaml_str(&data)
    }
}

#[cfg(test)]
mod test {
    use {super::*, indoc::indoc};

    #[test]
    fn parse_yaml() -> Result<()> {
        let config = DistributionConfig::from_yaml_str(indoc! {"
            codename: bookworm
            components: [main, contrib]
            architectures: [amd64, source]
            udeb_components: [main]
            retain_old_versions: true
            dsc_export:
              filename: Sources
              compressions: [xz]
            ignore:
              broken_old_data: true
        "})?;

        assert_eq!(config.components, vec!["main", "contrib"]);
        assert!(config.retain_old_versions);
        assert!(!config.read_only);
        assert_eq!(config.deb_export, ExportMode::packages());
        assert_eq!(config.dsc_export.compressions, vec![Compression::Xz]);
        assert!(config.ignore.broken_old_data);
        assert!(!config.ignore.broken_version_comparison);

        Ok(())
    }

    #[test]
    fn rejects_bad_config() {
        assert!(matches!(
            DistributionConfig::from_yaml_str(
                "codename: a|b\ncomponents: [main]\narchitectures: [amd64]\n"
            ),
            Err(CatalogError::CodenameSeparator(_))
        ));
        assert!(DistributionConfig::from_yaml_str(
            "codename: a\ncomponents: [main]\narchitectures: [amd64]\nbogus: 1\n"
        )
        .is_err());
    }
}
