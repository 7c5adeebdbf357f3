//! Profile metadata: parsing the manifest (`inspec.yml` or the deprecated
//! `metadata.rb`), finalizing derived fields, and validating the result.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use semver::Version;
use thiserror::Error;

use crate::report::Diagnostic;
use crate::version::{parse_version_lenient, Constraint, VersionError};

const KNOWN_TOP_LEVEL_KEYS: &[&str] = &[
    "name",
    "title",
    "maintainer",
    "copyright",
    "copyright_email",
    "license",
    "summary",
    "version",
    "supports",
    "depends",
    "inspec_version",
];

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("manifest is not a mapping at its top level")]
    NotAMapping,
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("dependency {index} is missing a required `name`")]
    DependencyMissingName { index: usize },
    #[error("dependency {name:?} names {count} source keys (path/url/git/supermarket); exactly one is required")]
    DependencyAmbiguousSource { name: String, count: usize },
    #[error("dependency {name:?} has a malformed version constraint: {source}")]
    DependencyBadVersion {
        name: String,
        #[source]
        source: VersionError,
    },
    #[error("malformed `version` field: {0}")]
    BadVersion(#[source] VersionError),
    #[error("metadata.rb parse error at line {line}: {msg}")]
    LegacyParse { line: u32, msg: String },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Supports {
    pub os_name: Option<String>,
    pub os_family: Option<String>,
    pub release: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RequirementSource {
    Path(String),
    Supermarket { slug: String },
    Git { url: String, branch: Option<String> },
    Url(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Requirement {
    pub name: String,
    pub constraint: Constraint,
    pub source: Option<RequirementSource>,
}

/// The finalized, validated profile manifest.
///
/// Malformed individual fields (`version`, a `supports` entry, a `depends`
/// entry) never prevent a `Metadata` from being constructed — they are
/// recorded here and surfaced as `errors()` by [`Metadata::valid`] instead,
/// matching `MetadataError` being accumulated at `check()` time rather than
/// fatal at parse time.
#[derive(Clone, Debug, Default)]
pub struct Metadata {
    pub name: Option<String>,
    pub title: Option<String>,
    pub maintainer: Option<String>,
    pub copyright: Option<String>,
    pub copyright_email: Option<String>,
    pub license: Option<String>,
    pub summary: Option<String>,
    pub version: Option<Version>,
    pub version_error: Option<String>,
    pub supports: Vec<Supports>,
    pub supports_errors: Vec<String>,
    pub depends: Vec<Requirement>,
    pub dependency_errors: Vec<String>,
    pub inspec_version: Option<String>,
    pub unsupported_keys: Vec<String>,
}

impl Metadata {
    /// Parses `inspec.yml` contents into a [`Metadata`], recording any
    /// top-level keys this crate does not recognize rather than rejecting
    /// them outright.
    pub fn from_yaml(raw: &str) -> Result<Self, MetadataError> {
        let value: serde_yaml::Value = serde_yaml::from_str(raw)?;
        let serde_yaml::Value::Mapping(map) = value else {
            return Err(MetadataError::NotAMapping);
        };

        let mut md = Metadata::default();
        for (k, v) in &map {
            let Some(key) = k.as_str() else { continue };
            if !KNOWN_TOP_LEVEL_KEYS.contains(&key) {
                md.unsupported_keys.push(key.to_string());
                continue;
            }
            match key {
                "name" => md.name = v.as_str().map(str::to_string),
                "title" => md.title = v.as_str().map(str::to_string),
                "maintainer" => md.maintainer = v.as_str().map(str::to_string),
                "copyright" => md.copyright = v.as_str().map(str::to_string),
                "copyright_email" => md.copyright_email = v.as_str().map(str::to_string),
                "license" => md.license = v.as_str().map(str::to_string),
                "summary" => md.summary = v.as_str().map(str::to_string),
                "inspec_version" => md.inspec_version = v.as_str().map(str::to_string),
                "version" => {
                    if let Some(s) = v.as_str() {
                        match parse_version_lenient(s) {
                            Ok(parsed) => md.version = Some(parsed),
                            Err(e) => md.version_error = Some(MetadataError::BadVersion(e).to_string()),
                        }
                    }
                }
                "supports" => {
                    let (supports, errors) = parse_supports(v);
                    md.supports = supports;
                    md.supports_errors = errors;
                }
                "depends" => {
                    let (depends, errors) = parse_depends(v);
                    md.depends = depends;
                    md.dependency_errors = errors;
                }
                _ => unreachable!(),
            }
        }
        Ok(md)
    }

    /// Parses the deprecated `metadata.rb` line format: one `key "value"`
    /// call per line, plus `depends do ... end` blocks of the same shape.
    /// This is a constrained, recognized subset — not a Ruby interpreter.
    pub fn from_legacy_rb(raw: &str) -> Result<Self, MetadataError> {
        let mut md = Metadata::default();
        let mut in_depends = false;
        let mut current_dep: Option<BTreeMap<String, String>> = None;

        for (idx, raw_line) in raw.lines().enumerate() {
            let line = raw_line.trim();
            let lineno = idx as u32 + 1;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with("depends") && line.contains("do") {
                in_depends = true;
                continue;
            }
            if in_depends && line == "end" {
                if let Some(dep) = current_dep.take() {
                    match legacy_dep_to_requirement(dep) {
                        Ok(req) => md.depends.push(req),
                        Err(e) => md
                            .dependency_errors
                            .push(format!("metadata.rb line {lineno}: {e}")),
                    }
                }
                in_depends = false;
                continue;
            }
            let Some((key, value)) = split_legacy_call(line) else {
                return Err(MetadataError::LegacyParse {
                    line: lineno,
                    msg: format!("unrecognized statement {line:?}"),
                });
            };
            if in_depends {
                let dep = current_dep.get_or_insert_with(BTreeMap::new);
                dep.insert(key, value);
                continue;
            }
            match key.as_str() {
                "name" => md.name = Some(value),
                "title" => md.title = Some(value),
                "maintainer" => md.maintainer = Some(value),
                "copyright" => md.copyright = Some(value),
                "copyright_email" => md.copyright_email = Some(value),
                "license" => md.license = Some(value),
                "summary" => md.summary = Some(value),
                "inspec_version" => md.inspec_version = Some(value),
                "version" => match parse_version_lenient(&value) {
                    Ok(parsed) => md.version = Some(parsed),
                    Err(e) => md.version_error = Some(MetadataError::BadVersion(e).to_string()),
                },
                other => md.unsupported_keys.push(other.to_string()),
            }
        }
        Ok(md)
    }

    /// Applies derivation rules: an explicit `name` override (from the
    /// fetch target, e.g. a directory basename) takes precedence over the
    /// manifest's own `name` when the manifest omitted one.
    pub fn finalize(&mut self, name_override: Option<&str>) {
        if self.name.is_none() {
            self.name = name_override.map(str::to_string);
        }
    }

    /// Returns `(errors, warnings)`. Does not mutate; callers clamp impact
    /// at the control level, not here.
    pub fn valid(&self) -> (Vec<Diagnostic>, Vec<Diagnostic>) {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.name.as_deref().map(str::trim).unwrap_or("").is_empty() {
            errors.push(Diagnostic::new("metadata is missing a required `name`"));
        }
        if let Some(msg) = &self.version_error {
            errors.push(Diagnostic::new(msg.clone()));
        }
        for msg in &self.supports_errors {
            errors.push(Diagnostic::new(msg.clone()));
        }
        for msg in &self.dependency_errors {
            errors.push(Diagnostic::new(msg.clone()));
        }

        if self.title.is_none() {
            warnings.push(Diagnostic::new("metadata has no `title`"));
        }
        if self.summary.is_none() {
            warnings.push(Diagnostic::new("metadata has no `summary`"));
        }
        if self.version.is_none() && self.version_error.is_none() {
            warnings.push(Diagnostic::new("metadata has no `version`"));
        }
        if self.maintainer.is_none() {
            warnings.push(Diagnostic::new("metadata has no `maintainer`"));
        }
        for key in &self.unsupported_keys {
            warnings.push(Diagnostic::new(format!(
                "unrecognized metadata key `{key}`"
            )));
        }
        (errors, warnings)
    }
}

/// Returns the successfully-parsed entries plus a message for each one that
/// was dropped; a malformed entry never aborts the rest of the list.
fn parse_supports(v: &serde_yaml::Value) -> (Vec<Supports>, Vec<String>) {
    let serde_yaml::Value::Sequence(seq) = v else {
        return (Vec::new(), Vec::new());
    };
    let mut out = Vec::new();
    let mut errors = Vec::new();
    for (index, entry) in seq.iter().enumerate() {
        if let Some(s) = entry.as_str() {
            out.push(Supports {
                os_family: Some(s.to_string()),
                ..Default::default()
            });
            continue;
        }
        let serde_yaml::Value::Mapping(m) = entry else {
            errors.push(format!("malformed `supports` entry at index {index}"));
            continue;
        };
        let get = |k: &str| {
            m.get(serde_yaml::Value::from(k))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        let supports = Supports {
            os_name: get("os-name").or_else(|| get("os_name")),
            os_family: get("os-family").or_else(|| get("os_family")),
            release: get("release"),
        };
        if supports.os_name.is_none() && supports.os_family.is_none() && supports.release.is_none() {
            errors.push(format!(
                "malformed `supports` entry at index {index}: no recognized keys"
            ));
            continue;
        }
        out.push(supports);
    }
    (out, errors)
}

/// Returns the successfully-parsed dependencies plus a message for each
/// entry that was dropped (missing name, ambiguous source, bad version
/// constraint); a malformed entry never aborts the rest of the list.
fn parse_depends(v: &serde_yaml::Value) -> (Vec<Requirement>, Vec<String>) {
    let serde_yaml::Value::Sequence(seq) = v else {
        return (Vec::new(), Vec::new());
    };
    let mut out = Vec::new();
    let mut errors = Vec::new();
    for (index, entry) in seq.iter().enumerate() {
        let serde_yaml::Value::Mapping(m) = entry else {
            errors.push(MetadataError::DependencyMissingName { index }.to_string());
            continue;
        };
        let get = |k: &str| {
            m.get(serde_yaml::Value::from(k))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        let Some(name) = get("name") else {
            errors.push(MetadataError::DependencyMissingName { index }.to_string());
            continue;
        };

        let sources: Vec<RequirementSource> = [
            get("path").map(RequirementSource::Path),
            get("supermarket").map(|slug| RequirementSource::Supermarket { slug }),
            get("git").map(|url| RequirementSource::Git {
                url,
                branch: get("branch"),
            }),
            get("url").map(RequirementSource::Url),
        ]
        .into_iter()
        .flatten()
        .collect();

        if sources.len() > 1 {
            errors.push(
                MetadataError::DependencyAmbiguousSource {
                    name,
                    count: sources.len(),
                }
                .to_string(),
            );
            continue;
        }

        let constraint = match get("version") {
            Some(raw) => match Constraint::parse(&raw) {
                Ok(c) => c,
                Err(source) => {
                    errors.push(
                        MetadataError::DependencyBadVersion {
                            name: name.clone(),
                            source,
                        }
                        .to_string(),
                    );
                    continue;
                }
            },
            None => Constraint::any(),
        };

        out.push(Requirement {
            name,
            constraint,
            source: sources.into_iter().next(),
        });
    }
    (out, errors)
}

fn split_legacy_call(line: &str) -> Option<(String, String)> {
    let line = line.trim_end_matches(';').trim();
    let mut parts = line.splitn(2, char::is_whitespace);
    let key = parts.next()?.to_string();
    let rest = parts.next().unwrap_or("").trim();
    let value = rest.trim_matches(|c| c == '"' || c == '\'').to_string();
    Some((key, value))
}

fn legacy_dep_to_requirement(fields: BTreeMap<String, String>) -> Result<Requirement, String> {
    let name = fields.get("name").cloned().ok_or("dependency missing name")?;
    let constraint = match fields.get("version") {
        Some(v) => Constraint::parse(v).map_err(|e| e.to_string())?,
        None => Constraint::any(),
    };
    let source = if let Some(p) = fields.get("path") {
        Some(RequirementSource::Path(p.clone()))
    } else if let Some(s) = fields.get("supermarket") {
        Some(RequirementSource::Supermarket { slug: s.clone() })
    } else if let Some(g) = fields.get("git") {
        Some(RequirementSource::Git {
            url: g.clone(),
            branch: fields.get("branch").cloned(),
        })
    } else {
        fields.get("url").map(|u| RequirementSource::Url(u.clone()))
    };
    Ok(Requirement {
        name,
        constraint,
        source,
    })
}

/// Declared `tag`/attribute metadata shared between [`crate::control`] and
/// the DSL evaluator; kept here since both consume the same JSON-valued
/// shape and `indexmap` ordering.
pub type TagMap = IndexMap<String, serde_json::Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_manifest_parses() {
        let md = Metadata::from_yaml("name: sshd-baseline\ntitle: SSHD baseline\n").unwrap();
        assert_eq!(md.name.as_deref(), Some("sshd-baseline"));
        let (errors, _) = md.valid();
        assert!(errors.is_empty());
    }

    #[test]
    fn missing_name_is_an_error() {
        let md = Metadata::from_yaml("title: x\n").unwrap();
        let (errors, _) = md.valid();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn unrecognized_key_is_a_warning_not_an_error() {
        let md = Metadata::from_yaml("name: x\nfoo: bar\n").unwrap();
        let (errors, warnings) = md.valid();
        assert!(errors.is_empty());
        assert!(warnings.iter().any(|w| w.msg.contains("foo")));
    }

    #[test]
    fn depends_requires_exactly_one_source() {
        let yaml = "name: x\ndepends:\n  - name: a\n    path: ../a\n    git: https://x\n";
        let md = Metadata::from_yaml(yaml).unwrap();
        assert!(md.depends.is_empty());
        assert_eq!(md.dependency_errors.len(), 1);
        let (errors, _) = md.valid();
        assert!(errors.iter().any(|e| e.msg.contains("exactly one")));
    }

    #[test]
    fn malformed_version_is_deferred_to_valid() {
        let md = Metadata::from_yaml("name: x\nversion: \"not-a-version!!\"\n").unwrap();
        assert!(md.version.is_none());
        assert!(md.version_error.is_some());
        let (errors, _) = md.valid();
        assert!(errors.iter().any(|e| e.msg.contains("malformed `version`")));
    }

    #[test]
    fn missing_summary_version_maintainer_are_warnings() {
        let md = Metadata::from_yaml("name: x\n").unwrap();
        let (errors, warnings) = md.valid();
        assert!(errors.is_empty());
        assert!(warnings.iter().any(|w| w.msg.contains("`summary`")));
        assert!(warnings.iter().any(|w| w.msg.contains("`version`")));
        assert!(warnings.iter().any(|w| w.msg.contains("`maintainer`")));
    }

    #[test]
    fn legacy_metadata_rb_parses() {
        let raw = "name \"legacy\"\ntitle \"Legacy profile\"\ndepends do\n  name \"dep-a\"\n  path \"../dep-a\"\nend\n";
        let md = Metadata::from_legacy_rb(raw).unwrap();
        assert_eq!(md.name.as_deref(), Some("legacy"));
        assert_eq!(md.depends.len(), 1);
        assert_eq!(md.depends[0].name, "dep-a");
    }

    #[test]
    fn name_override_applies_only_when_absent() {
        let mut md = Metadata::from_yaml("title: x\n").unwrap();
        md.finalize(Some("from-target"));
        assert_eq!(md.name.as_deref(), Some("from-target"));

        let mut md2 = Metadata::from_yaml("name: explicit\n").unwrap();
        md2.finalize(Some("from-target"));
        assert_eq!(md2.name.as_deref(), Some("explicit"));
    }
}
