//! End-to-end scenarios exercised through `Profile::for_target`, matching
//! the testable properties enumerated for the profile core.

use std::path::Path;

use profile_core::fetch::FetcherRegistry;
use profile_core::reader::ReaderRegistry;
use profile_core::resolver::ResolveError;
use profile_core::vendor::VendorIndex;
use profile_core::{Profile, ProfileError, ProfileOpts};

fn write_file(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn open(dir: &Path) -> Result<Profile, ProfileError> {
    let fetchers = FetcherRegistry::with_defaults();
    let readers = ReaderRegistry::with_defaults();
    Profile::for_target(&dir.to_string_lossy(), &fetchers, &readers, ProfileOpts::default())
}

/// 1. A minimal valid profile (name + one control with a check) reports
/// zero errors and at least one control.
#[test]
fn minimal_valid_profile_has_no_errors() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "inspec.yml", "name: sshd-baseline\ntitle: SSHD baseline\n");
    write_file(
        dir.path(),
        "controls/a.rb",
        "control 'c1' do\n  impact 0.7\n  title 't'\n  desc 'd'\n  describe file('/etc/hosts') do\n    it { should exist }\n  end\nend",
    );

    let profile = open(dir.path()).unwrap();
    let report = profile.check();
    assert!(report.summary.valid);
    assert!(report.errors.is_empty());
    assert_eq!(report.summary.controls, 1);
}

/// 2. A manifest missing `name` is an error, not a warning.
#[test]
fn missing_name_is_reported_as_error() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "inspec.yml", "title: no name here\n");

    let profile = open(dir.path()).unwrap();
    let report = profile.check();
    assert!(!report.summary.valid);
    assert!(report.errors.iter().any(|e| e.msg.contains("name")));
}

/// 3. An out-of-range impact is clamped to [0.0, 1.0] for presentation
/// but still surfaces a warning in `check()`.
#[test]
fn impact_is_clamped_and_warned_about() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "inspec.yml", "name: x\n");
    write_file(
        dir.path(),
        "controls/a.rb",
        "control 'c1' do\n  impact 5.0\n  title 't'\n  desc 'd'\n  describe file('/x') do\n    it { should exist }\n  end\nend",
    );

    let profile = open(dir.path()).unwrap();
    let info = profile.info();
    assert_eq!(info.controls.get("c1").unwrap().impact, 1.0);

    let report = profile.check();
    assert!(report.warnings.iter().any(|w| w.msg.contains("outside [0.0, 1.0]")));
}

/// 4. Two control blocks sharing an id merge rather than one silently
/// replacing the other.
#[test]
fn duplicate_control_ids_merge() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "inspec.yml", "name: x\n");
    write_file(
        dir.path(),
        "controls/a.rb",
        "control 'c1' do\n  title 'first'\n  describe file('/a') do\n    it { should exist }\n  end\nend\ncontrol 'c1' do\n  title 'second'\n  describe file('/b') do\n    it { should exist }\n  end\nend",
    );

    let profile = open(dir.path()).unwrap();
    let info = profile.info();
    assert_eq!(info.controls.len(), 1);
    let merged = info.controls.get("c1").unwrap();
    assert_eq!(merged.title.as_deref(), Some("second"));
}

/// 5. An anonymous `describe` block at file scope is exempt from the
/// missing-title/missing-desc warnings real controls get.
#[test]
fn anonymous_describe_is_exempt_from_title_desc_warnings() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "inspec.yml", "name: x\n");
    write_file(
        dir.path(),
        "controls/a.rb",
        "describe file('/etc/hosts') do\n  it { should exist }\nend",
    );

    let profile = open(dir.path()).unwrap();
    let report = profile.check();
    assert!(!report.warnings.iter().any(|w| w.msg.contains("no title")));
    assert!(!report.warnings.iter().any(|w| w.msg.contains("no desc")));
}

/// 6. A -> B -> A dependency cycle is reported as `ResolveError::Cyclic`
/// naming both profiles, sorted.
#[test]
fn cyclic_dependency_between_two_profiles_is_detected() {
    let vendor_root = tempfile::tempdir().unwrap();
    let vendor = VendorIndex::open(vendor_root.path()).unwrap();

    let a_src = tempfile::tempdir().unwrap();
    write_file(a_src.path(), "inspec.yml", "name: profile-a\ndepends:\n  - name: profile-b\n    path: ../b\n");
    let a_bytes = make_tar_gz(a_src.path());
    vendor.store("profile-a", &semver::Version::new(1, 0, 0), &a_bytes).unwrap();

    let b_src = tempfile::tempdir().unwrap();
    write_file(b_src.path(), "inspec.yml", "name: profile-b\ndepends:\n  - name: profile-a\n    path: ../a\n");
    let b_bytes = make_tar_gz(b_src.path());
    vendor.store("profile-b", &semver::Version::new(1, 0, 0), &b_bytes).unwrap();

    let root_src = tempfile::tempdir().unwrap();
    write_file(
        root_src.path(),
        "inspec.yml",
        "name: root\ndepends:\n  - name: profile-a\n    path: ../a\n",
    );
    let profile = open(root_src.path()).unwrap();

    let err = profile.locked_dependencies(&vendor).unwrap_err();
    match err {
        ProfileError::Resolve(ResolveError::Cyclic(names)) => {
            assert_eq!(names, vec!["profile-a".to_string(), "profile-b".to_string()]);
        }
        other => panic!("expected a cyclic dependency error, got {other:?}"),
    }
}

fn make_tar_gz(dir: &Path) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let enc = flate2::write::GzEncoder::new(&mut buf, flate2::Compression::default());
        let mut builder = tar::Builder::new(enc);
        builder.append_dir_all(".", dir).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }
    buf
}
