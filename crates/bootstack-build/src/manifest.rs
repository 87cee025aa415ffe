//! Requirements-style dependency manifests.
//!
//! One requirement per line: a package name, optional `[extras]`, then an
//! optional constraint (`==2.31.0`, `>=1,<2`, `; python_version < "3.12"`).
//! `#` starts a comment. Option lines (`-r other.txt`, `--index-url ...`),
//! direct URLs and local paths or archives (`./pkg`, `/wheels/a.whl`) are
//! kept verbatim as opaque options; the installer interprets them.

use std::path::Path;

use nom::{
    IResult, Parser,
    bytes::complete::{take_till, take_while1},
    character::complete::{char, space0},
    combinator::{opt, rest, verify},
    sequence::delimited,
};

use crate::error::{BuildError, Result};

/// One declared package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Package name as written, extras included (`uvicorn[standard]`).
    pub name: String,
    /// Version constraint and markers, empty when unconstrained.
    pub constraint: String,
}

/// Parsed dependency manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyManifest {
    /// Package requirements in file order.
    pub requirements: Vec<Requirement>,
    /// Option and URL lines, passed through untouched.
    pub options: Vec<String>,
}

impl DependencyManifest {
    /// Reads and parses a manifest file.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::ManifestMissing`] if the file does not exist
    /// or cannot be read, and [`BuildError::Manifest`] for a malformed line.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            tracing::debug!(path = %path.display(), error = %e, "manifest unreadable");
            BuildError::ManifestMissing {
                path: path.to_path_buf(),
            }
        })?;
        Self::parse(&content)
    }

    /// Parses manifest text.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Manifest`] for a line that names no package.
    pub fn parse(content: &str) -> Result<Self> {
        let mut manifest = Self::default();
        for (idx, raw) in content.lines().enumerate() {
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('-') || line.contains("://") || is_local_path(line) {
                manifest.options.push(line.to_string());
                continue;
            }
            let (_, requirement) = requirement(line).map_err(|_| BuildError::Manifest {
                line: idx + 1,
                message: format!("cannot read requirement {line:?}"),
            })?;
            manifest.requirements.push(requirement);
        }
        Ok(manifest)
    }

    /// Whether the manifest declares nothing at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty() && self.options.is_empty()
    }
}

/// A `#` starts a comment at line start or after whitespace.
fn strip_comment(line: &str) -> &str {
    if line.trim_start().starts_with('#') {
        return "";
    }
    line.find(" #")
        .or_else(|| line.find("\t#"))
        .map_or(line, |idx| &line[..idx])
}

const ARCHIVE_SUFFIXES: &[&str] = &[".whl", ".tar.gz", ".tgz", ".zip"];

fn is_local_path(line: &str) -> bool {
    let spec = line.split(';').next().unwrap_or(line).trim();
    spec.starts_with(['/', '.', '~'])
        || spec.contains(std::path::MAIN_SEPARATOR)
        || ARCHIVE_SUFFIXES.iter().any(|suffix| spec.ends_with(suffix))
}

const fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

fn requirement(input: &str) -> IResult<&str, Requirement> {
    let (input, name) = verify(take_while1(is_name_char), |name: &str| {
        name.starts_with(|c: char| c.is_ascii_alphanumeric())
    })
    .parse(input)?;
    let (input, extras) = opt(delimited(char('['), take_till(|c: char| c == ']'), char(']'))).parse(input)?;
    let (input, _) = space0.parse(input)?;
    let (input, constraint) = rest.parse(input)?;
    let name = match extras {
        Some(extras) => format!("{name}[{extras}]"),
        None => name.to_string(),
    };
    Ok((
        input,
        Requirement {
            name,
            constraint: constraint.trim().to_string(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_constraints_and_extras() {
        let manifest = DependencyManifest::parse(
            "requests==2.31.0\nuvicorn[standard] >=0.23\nbeautifulsoup4\nlxml; python_version < \"3.13\"\n",
        )
        .expect("parse");
        let pairs: Vec<_> = manifest
            .requirements
            .iter()
            .map(|r| (r.name.as_str(), r.constraint.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("requests", "==2.31.0"),
                ("uvicorn[standard]", ">=0.23"),
                ("beautifulsoup4", ""),
                ("lxml", "; python_version < \"3.13\""),
            ]
        );
    }

    #[test]
    fn comments_blank_lines_and_options() {
        let manifest = DependencyManifest::parse(
            "# pinned\n\n-r base.txt\n--index-url https://pypi.example/simple\nflask  # web\ngit+https://example.com/pkg.git\n",
        )
        .expect("parse");
        assert_eq!(manifest.requirements.len(), 1);
        assert_eq!(manifest.requirements[0].name, "flask");
        assert_eq!(manifest.requirements[0].constraint, "");
        assert_eq!(manifest.options.len(), 3);
    }

    #[test]
    fn local_paths_and_archives_are_options() {
        let manifest = DependencyManifest::parse(
            "/opt/wheels/pkg-1.0-py3-none-any.whl\n./local\n../shared/lib\nvendor/tool-2.0.tar.gz\nrequests\n",
        )
        .expect("parse");
        assert_eq!(manifest.options.len(), 4);
        assert_eq!(manifest.options[0], "/opt/wheels/pkg-1.0-py3-none-any.whl");
        assert_eq!(manifest.requirements.len(), 1);
        assert_eq!(manifest.requirements[0].name, "requests");
    }

    #[test]
    fn empty_manifest_is_valid() {
        let manifest = DependencyManifest::parse("").expect("parse");
        assert!(manifest.is_empty());
    }

    #[test]
    fn line_without_a_name_is_rejected() {
        let err = DependencyManifest::parse("ok\n>=1.0\n").expect_err("no name");
        assert!(matches!(err, BuildError::Manifest { line: 2, .. }));
        assert!(DependencyManifest::parse("_private\n").is_err());
    }

    #[test]
    fn missing_file_is_manifest_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = DependencyManifest::load(&dir.path().join("requirements.txt")).expect_err("missing");
        assert!(matches!(err, BuildError::ManifestMissing { .. }));
    }
}
