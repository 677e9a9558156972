// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Pool directory layout. */

/// Describes the layout of the `pool` part of a repository.
///
/// This type effectively controls where files are stored, which in turn defines the
/// file keys install data is expected to produce.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PoolLayout {
    /// File paths are `pool/<component>/<name_prefix>/<package>/<filename>`.
    ///
    /// For packages beginning with `lib`, the prefix is the first 4 characters
    /// (`libz`). For everything else, it is the first character.
    ComponentThenNamePrefix,
}

impl Default for PoolLayout {
    fn default() -> Self {
        Self::ComponentThenNamePrefix
    }
}

impl PoolLayout {
    /// The directory holding files of a source package.
    pub fn directory(&self, component: &str, package: &str) -> String {
        match self {
            Self::ComponentThenNamePrefix => {
                let prefix_len = if package.starts_with("lib") && package.len() > 3 {
                    4
                } else {
                    1
                };
                let prefix = package
                    .char_indices()
                    .nth(prefix_len)
                    .map(|(i, _)| &package[0..i])
                    .unwrap_or(package);

                format!("pool/{}/{}/{}", component, prefix, package)
            }
        }
    }

    /// Compute the path to a file given the source package name and its filename.
    pub fn path(&self, component: &str, package: &str, filename: &str) -> String {
        format!("{}/{}", self.directory(component, package), filename)
    }
}
