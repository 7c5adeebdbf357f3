//! Profile (C8): the façade a caller actually uses. Wraps a fetched,
//! read, and metadata-finalized target and exposes `info`, `check`,
//! `archive`, and `locked_dependencies`.

use std::cell::OnceCell;
use std::path::PathBuf;

use indexmap::IndexMap;
use semver::Version;
use serde_json::Value as Json;
use tracing::instrument;

use crate::archive_gen::{self, ArchiveFormat, ArchiveOptions};
use crate::context::{Attribute, ProfileContext};
use crate::control::Control;
use crate::error::ProfileError;
use crate::fetch::FetcherRegistry;
use crate::metadata::{Metadata, Requirement, Supports};
use crate::reader::ReaderRegistry;
use crate::report::{CheckReport, CheckSummary, Diagnostic};
use crate::require_loader::RequireLoader;
use crate::resolver::{Resolver, SpecificationProvider};
use crate::tree::FileTree;
use crate::vendor::VendorIndex;

#[derive(Default)]
pub struct ProfileOpts {
    pub id_override: Option<String>,
    pub inputs: IndexMap<String, Json>,
}

/// The metadata plus evaluated control registry, before stripping
/// anything for presentation. [`Profile::info`] derives the smaller,
/// presentation-shaped [`Params`] from this.
pub struct NormalizedParams {
    pub metadata: Metadata,
    pub controls: IndexMap<String, Control>,
    pub attributes: IndexMap<String, Attribute>,
}

#[derive(Clone, Debug)]
pub struct InfoControl {
    pub id: String,
    pub title: Option<String>,
    pub desc: Option<String>,
    pub impact: f64,
    pub refs: Vec<Json>,
    pub tags: IndexMap<String, Json>,
    pub source_file: PathBuf,
    pub source_line: u32,
}

#[derive(Clone, Debug)]
pub struct Params {
    pub name: String,
    pub title: Option<String>,
    pub maintainer: Option<String>,
    pub version: Option<Version>,
    pub summary: Option<String>,
    pub supports: Vec<Supports>,
    pub depends: Vec<Requirement>,
    pub controls: IndexMap<String, InfoControl>,
    pub groups: IndexMap<String, Vec<String>>,
}

pub struct Profile {
    tree: FileTree,
    metadata: Metadata,
    layout_warnings: Vec<Diagnostic>,
    control_files: Vec<(PathBuf, String)>,
    libraries: Vec<crate::reader::LibraryFile>,
    inputs: IndexMap<String, Json>,
    params_cache: OnceCell<NormalizedParams>,
}

impl Profile {
    #[instrument(skip(fetchers, readers, opts))]
    pub fn for_target(
        target: &str,
        fetchers: &FetcherRegistry,
        readers: &ReaderRegistry,
        opts: ProfileOpts,
    ) -> Result<Self, ProfileError> {
        let tree = fetchers.resolve(target)?;
        let reader = readers.resolve(&tree)?;
        let mut metadata = reader.metadata(&tree)?;

        let name_override = opts.id_override.clone().or_else(|| {
            PathBuf::from(target)
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
        });
        metadata.finalize(name_override.as_deref());

        let layout_warnings = reader.warnings(&tree);
        let control_files = reader.control_files(&tree);
        let libraries = reader.libraries(&tree);

        Ok(Self {
            tree,
            metadata,
            layout_warnings,
            control_files,
            libraries,
            inputs: opts.inputs,
            params_cache: OnceCell::new(),
        })
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn tree(&self) -> &FileTree {
        &self.tree
    }

    /// Evaluates the profile context against a mock backend (no real host
    /// queries) and memoizes the result. This only walks the profile's
    /// own libraries and control files; nested dependency profiles are
    /// folded in by [`Profile::params_with_dependencies`] when a vendor
    /// index is available.
    pub fn params(&self) -> &NormalizedParams {
        self.params_cache.get_or_init(|| self.evaluate(None))
    }

    /// Like [`Profile::params`], but also walks nested profiles named in
    /// `depends`, in declaration order, looking each one up in `vendor`.
    /// A dependency not found in the cache is skipped with a recorded
    /// diagnostic rather than failing the whole evaluation.
    pub fn params_with_dependencies(&self, vendor: &VendorIndex) -> NormalizedParams {
        self.evaluate(Some(vendor))
    }

    fn evaluate(&self, vendor: Option<&VendorIndex>) -> NormalizedParams {
        let profile_id = self.metadata.name.clone().unwrap_or_default();
        let mut loader = RequireLoader::new();
        for lib in &self.libraries {
            loader.add(lib.logical_path.clone(), lib.bytes.clone(), lib.source_ref.clone(), 1);
        }
        let mut ctx = ProfileContext::new(profile_id.clone(), loader).with_inputs(self.inputs.clone());

        for (path, source) in &self.control_files {
            ctx.evaluate_control_file(path, source);
        }

        let (mut registry, attributes, diagnostics) = ctx.into_parts();
        for d in &diagnostics {
            tracing::warn!(%d, "control-unit evaluation error");
        }

        if let Some(vendor) = vendor {
            for dep in &self.metadata.depends {
                match vendor.find(dep) {
                    Ok(specs) if !specs.is_empty() => {
                        let spec = specs.last().unwrap();
                        if let Ok(nested) = Profile::for_target(
                            &spec.dir.to_string_lossy(),
                            &FetcherRegistry::with_defaults(),
                            &ReaderRegistry::with_defaults(),
                            ProfileOpts::default(),
                        ) {
                            let nested_params = nested.evaluate(Some(vendor));
                            for (_, control) in nested_params.controls {
                                registry.register(control);
                            }
                        }
                    }
                    _ => {
                        tracing::warn!(dependency = %dep.name, "dependency not resolved, skipping nested controls");
                    }
                }
            }
        }

        NormalizedParams {
            metadata: self.metadata.clone(),
            controls: registry.into_inner(),
            attributes,
        }
    }

    pub fn info(&self) -> Params {
        let normalized = self.params();
        let mut groups: IndexMap<String, Vec<String>> = IndexMap::new();
        let mut controls = IndexMap::new();
        for (id, c) in &normalized.controls {
            if let Some(title) = &c.group_title {
                groups.entry(title.clone()).or_default().push(id.clone());
            }
            controls.insert(
                id.clone(),
                InfoControl {
                    id: id.clone(),
                    title: c.title.clone(),
                    desc: c.desc.clone(),
                    impact: c.clamped_impact(),
                    refs: c.refs.clone(),
                    tags: c.tags.clone(),
                    source_file: c.source_location.file.clone(),
                    source_line: c.source_location.line,
                },
            );
        }
        Params {
            name: self.metadata.name.clone().unwrap_or_default(),
            title: self.metadata.title.clone(),
            maintainer: self.metadata.maintainer.clone(),
            version: self.metadata.version.clone(),
            summary: self.metadata.summary.clone(),
            supports: self.metadata.supports.clone(),
            depends: self.metadata.depends.clone(),
            controls,
            groups,
        }
    }

    #[instrument(skip(self))]
    pub fn check(&self) -> CheckReport {
        let (mut errors, mut warnings) = self.metadata.valid();
        warnings.extend(self.layout_warnings.clone());

        let normalized = self.params();
        if normalized.controls.is_empty() {
            warnings.push(Diagnostic::new("profile defines no controls"));
        }
        for (id, control) in &normalized.controls {
            if control.is_synthetic() {
                continue;
            }
            if control.title.is_none() {
                warnings.push(Diagnostic::new("control has no title").with_control_id(id));
            }
            if control.desc.is_none() {
                warnings.push(Diagnostic::new("control has no desc").with_control_id(id));
            }
            if !(0.0..=1.0).contains(&control.impact) {
                warnings.push(
                    Diagnostic::new(format!("control impact {} is outside [0.0, 1.0]", control.impact))
                        .with_control_id(id),
                );
            }
            if control.checks.is_empty() {
                warnings.push(Diagnostic::new("control has no checks").with_control_id(id));
            }
        }

        let valid = errors.is_empty();
        CheckReport {
            summary: CheckSummary {
                valid,
                timestamp: now_rfc3339(),
                location: self.tree.prefix().to_path_buf(),
                profile: self.metadata.name.clone().unwrap_or_default(),
                controls: normalized.controls.len(),
            },
            errors: std::mem::take(&mut errors),
            warnings,
        }
    }

    /// `{name}-{version}.{ext}`, or just `{name}.{ext}` when no version is
    /// declared.
    pub fn archive_name(&self, format: ArchiveFormat) -> String {
        let ext = match format {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarGz => "tar.gz",
        };
        let name = self.metadata.name.as_deref().unwrap_or("profile");
        match &self.metadata.version {
            Some(v) => format!("{name}-{v}.{ext}"),
            None => format!("{name}.{ext}"),
        }
    }

    pub fn archive(&self, destination: PathBuf, format: ArchiveFormat, overwrite: bool) -> Result<(), ProfileError> {
        archive_gen::generate(
            &self.tree,
            &ArchiveOptions {
                destination,
                format,
                overwrite,
            },
        )?;
        Ok(())
    }

    pub fn locked_dependencies(&self, vendor: &VendorIndex) -> Result<crate::resolver::DependencyGraph, ProfileError> {
        let resolver = Resolver::new(vendor);
        Ok(resolver.resolve(self.metadata.depends.clone())?)
    }
}

fn now_rfc3339() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{secs}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_profile(dir: &std::path::Path, manifest: &str, control_src: &str) {
        std::fs::write(dir.join("inspec.yml"), manifest).unwrap();
        std::fs::create_dir_all(dir.join("controls")).unwrap();
        std::fs::write(dir.join("controls/a.rb"), control_src).unwrap();
    }

    fn open(dir: &std::path::Path) -> Profile {
        let fetchers = FetcherRegistry::with_defaults();
        let readers = ReaderRegistry::with_defaults();
        Profile::for_target(&dir.to_string_lossy(), &fetchers, &readers, ProfileOpts::default()).unwrap()
    }

    #[test]
    fn info_strips_checks_and_clamps_impact() {
        let dir = tempfile::tempdir().unwrap();
        write_profile(
            dir.path(),
            "name: x\ntitle: X\n",
            "control 'c1' do\n  impact 1.8\n  title 't'\n  desc 'd'\n  describe file('/x') do\n    it { should exist }\n  end\nend",
        );
        let profile = open(dir.path());
        let info = profile.info();
        let c = info.controls.get("c1").unwrap();
        assert_eq!(c.impact, 1.0);
    }

    #[test]
    fn check_reports_missing_name_as_error() {
        let dir = tempfile::tempdir().unwrap();
        write_profile(dir.path(), "title: x\n", "");
        let profile = open(dir.path());
        let report = profile.check();
        assert!(!report.summary.valid);
        assert!(!report.errors.is_empty());
    }

    #[test]
    fn check_warns_on_controls_with_no_checks() {
        let dir = tempfile::tempdir().unwrap();
        write_profile(
            dir.path(),
            "name: x\n",
            "control 'c1' do\n  title 't'\n  desc 'd'\nend",
        );
        let profile = open(dir.path());
        let report = profile.check();
        assert!(report.warnings.iter().any(|w| w.msg.contains("no checks")));
    }

    #[test]
    fn archive_name_includes_version_when_present() {
        let dir = tempfile::tempdir().unwrap();
        write_profile(dir.path(), "name: x\nversion: \"1.2.0\"\n", "");
        let profile = open(dir.path());
        assert_eq!(profile.archive_name(ArchiveFormat::Zip), "x-1.2.0.zip");
    }
}
