// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Merging of package descriptions into stored control chunks. */

use crate::{checksums::ChecksumType, control::ControlParagraph, error::Result};

/// Adjusts the description of a control chunk before it is stored.
pub trait DescriptionMerger {
    /// Produce the chunk to store for package `name`.
    ///
    /// `old_chunk` is the chunk of the record being replaced, if any. Returns [None]
    /// if `new_chunk` should be stored as is.
    fn merge(
        &self,
        identifier: &str,
        name: &str,
        new_chunk: &str,
        old_chunk: Option<&str>,
    ) -> Result<Option<String>>;
}

/// Stores only the first line of descriptions, plus a `Description-md5` field.
///
/// This is the form `Packages` files carry descriptions in when long descriptions are
/// shipped in translation files.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShortDescriptionMerger;

impl DescriptionMerger for ShortDescriptionMerger {
    fn merge(
        &self,
        _identifier: &str,
        _name: &str,
        new_chunk: &str,
        _old_chunk: Option<&str>,
    ) -> Result<Option<String>> {
        let mut para = ControlParagraph::parse_chunk(new_chunk)?;

        let description = match para.field_str("Description") {
            Some(description) => description.to_string(),
            None => return Ok(None),
        };

        // The md5 covers the full multiline value plus a trailing newline.
        if let Some(index) = description.find('\n') {
            let digest = ChecksumType::Md5.digest(format!("{}\n", description).as_bytes());

            para.set_field_from_string(
                "Description".into(),
                description[0..index].to_string().into(),
            );
            para.set_field_from_string("Description-md5".into(), digest.digest_hex().into());

            Ok(Some(para.to_chunk()))
        } else {
            Ok(None)
        }
    }
}
