//! Image reference parsing.
//!
//! A reference is `name[:tag][@sha256:<hex>]`. The name may carry a
//! registry host with a port (`localhost:5000/python`); a `:` only starts a
//! tag when it follows the last `/`.

use std::fmt;
use std::str::FromStr;

use bootstack_common::constants::DEFAULT_TAG;
use bootstack_common::error::{BootstackError, Result};
use bootstack_common::types::Sha256Hash;
use serde::{Deserialize, Serialize};

/// A named, tagged image, optionally pinned to a digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference {
    /// Repository name (`python`, `library/python`, `host:5000/app`).
    pub name: String,
    /// Version tag; `latest` when omitted.
    pub tag: String,
    /// Optional content pin.
    pub digest: Option<Sha256Hash>,
}

impl ImageReference {
    /// Parses a reference string.
    ///
    /// # Errors
    ///
    /// Returns an error for empty names, empty tags, invalid characters,
    /// or a malformed digest.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let (rest, digest) = match input.split_once('@') {
            Some((rest, digest)) => (rest, Some(Sha256Hash::from_hex(digest)?)),
            None => (input, None),
        };

        let last_slash = rest.rfind('/').map_or(0, |i| i + 1);
        let (name, tag) = match rest[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&rest[..split], &rest[split + 1..])
            }
            None => (rest, DEFAULT_TAG),
        };

        if name.is_empty() || !name.chars().all(is_name_char) {
            return Err(invalid(input, "invalid repository name"));
        }
        if tag.is_empty() || !tag.chars().all(is_tag_char) {
            return Err(invalid(input, "invalid tag"));
        }

        Ok(Self {
            name: name.to_string(),
            tag: tag.to_string(),
            digest,
        })
    }

    /// `name:tag` without the digest, used as the catalog key.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }
}

const fn is_name_char(c: char) -> bool {
    c.is_ascii_lowercase()
        || c.is_ascii_digit()
        || matches!(c, '.' | '_' | '-' | '/' | ':')
}

const fn is_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

fn invalid(input: &str, why: &str) -> BootstackError {
    BootstackError::Config {
        message: format!("{why} in image reference {input:?}"),
    }
}

impl FromStr for ImageReference {
    type Err = BootstackError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)?;
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}
