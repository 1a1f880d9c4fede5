use wright_core::profile::Profile;
use wright_core::requirement::{
    validate_all, PackageName, RawRequirement, Requirement, RequirementSpec, SourceDescriptor,
};
use wright_util::errors::RequirementError;

fn reason(err: RequirementError) -> String {
    match err {
        RequirementError::Malformed { reason, .. } => reason,
        other => panic!("expected Malformed, got {other:?}"),
    }
}

#[test]
fn package_name_normalizes_separators_and_case() {
    let a = PackageName::parse("Foo_Bar").unwrap();
    let b = PackageName::parse("foo--bar").unwrap();
    let c = PackageName::parse("foo.bar").unwrap();
    assert_eq!(a, b);
    assert_eq!(b, c);
    assert_eq!(a.as_str(), "foo-bar");
}

#[test]
fn package_name_rejects_bad_characters() {
    assert!(PackageName::parse("").is_err());
    assert!(PackageName::parse("foo bar").is_err());
    assert!(PackageName::parse("foo/bar").is_err());
    assert!(PackageName::parse("-foo").is_err());
    assert!(PackageName::parse("foo.").is_err());
}

#[test]
fn registry_requirement_parses_constraint() {
    let req = Requirement::from_raw(&RawRequirement::registry("requests", ">=2.0,<3.0")).unwrap();
    assert_eq!(req.name.as_str(), "requests");
    assert_eq!(req.profile, Profile::Runtime);
    assert!(!req.is_pinned());
    assert_eq!(req.constraint().unwrap().to_string(), ">=2.0,<3.0");
    assert!(req.build_options().is_empty());
}

#[test]
fn registry_requirement_without_version_is_any() {
    let req = Requirement::from_raw(&RawRequirement::registry("six", "")).unwrap();
    assert!(req.constraint().unwrap().is_any());
    assert_eq!(req.to_string(), "six");
}

#[test]
fn editable_requirement_keeps_options_in_order() {
    let raw = RawRequirement::editable("m2x", "../m2x").with_options(["build_ext", "--inplace"]);
    let req = Requirement::from_raw(&raw).unwrap();
    assert!(req.is_pinned());
    assert!(req.constraint().is_none());
    assert_eq!(req.build_options(), ["build_ext", "--inplace"]);
    assert!(matches!(req.source, SourceDescriptor::Editable { ref location, .. } if location == "../m2x"));
}

#[test]
fn vcs_requirement_accepts_git_alias() {
    let mut raw = RawRequirement::vcs("lint", "git+https://example.com/lint.git", Some("v1.0"));
    raw.source = Some("git".to_string());
    let req = Requirement::from_raw(&raw).unwrap();
    match req.source {
        SourceDescriptor::Vcs {
            locator, revision, ..
        } => {
            assert_eq!(locator, "git+https://example.com/lint.git");
            assert_eq!(revision.as_deref(), Some("v1.0"));
        }
        other => panic!("expected VCS source, got {other:?}"),
    }
}

#[test]
fn pinned_source_with_version_is_malformed() {
    let raw = RawRequirement::editable("m2x", "../m2x").with_version(">=1.0");
    let err = Requirement::from_raw(&raw).unwrap_err();
    assert!(reason(err).contains("cannot also require version"));
}

#[test]
fn registry_source_with_options_is_malformed() {
    let raw = RawRequirement::registry("foo", ">=1").with_options(["build_ext"]);
    let err = Requirement::from_raw(&raw).unwrap_err();
    assert!(reason(err).contains("build options"));
}

#[test]
fn bad_constraint_is_malformed() {
    let err = Requirement::from_raw(&RawRequirement::registry("foo", ">>1.0")).unwrap_err();
    assert!(reason(err).contains("invalid constraint"));
}

#[test]
fn unknown_profile_and_source_are_malformed() {
    let raw = RawRequirement::registry("foo", "").with_profile("docs");
    assert!(reason(Requirement::from_raw(&raw).unwrap_err()).contains("unknown profile"));

    let mut raw = RawRequirement::registry("foo", "");
    raw.source = Some("ftp".to_string());
    assert!(reason(Requirement::from_raw(&raw).unwrap_err()).contains("unknown source kind"));
}

#[test]
fn pinned_source_without_location_is_malformed() {
    let mut raw = RawRequirement::editable("m2x", "");
    raw.location = None;
    assert!(reason(Requirement::from_raw(&raw).unwrap_err()).contains("needs a location"));
}

#[test]
fn revision_on_editable_is_malformed() {
    let mut raw = RawRequirement::editable("m2x", "../m2x");
    raw.revision = Some("main".to_string());
    assert!(reason(Requirement::from_raw(&raw).unwrap_err()).contains("revision"));
}

#[test]
fn short_form_splits_name_and_constraint() {
    let raw = RawRequirement::from_short("bar==1.2");
    assert_eq!(raw.name, "bar");
    assert_eq!(raw.version.as_deref(), Some("==1.2"));

    let raw = RawRequirement::from_short("six");
    assert_eq!(raw.name, "six");
    assert!(raw.version.is_none());
}

#[test]
fn requirement_spec_accepts_both_forms() {
    #[derive(serde::Deserialize)]
    struct Doc {
        requires: Vec<RequirementSpec>,
    }
    let doc: Doc = toml::from_str(
        r#"requires = ["bar>=1.0", { name = "baz", version = "<2", optional = true }]"#,
    )
    .unwrap();
    let raws: Vec<RawRequirement> = doc.requires.into_iter().map(|s| s.into_raw()).collect();
    assert_eq!(raws[0].name, "bar");
    assert_eq!(raws[1].name, "baz");
    assert!(raws[1].optional);
}

#[test]
fn validate_all_collects_every_error() {
    let raw = vec![
        RawRequirement::registry("good", ">=1"),
        RawRequirement::registry("bad name", ""),
        RawRequirement::editable("m2x", "../m2x").with_version("==1"),
        RawRequirement::registry("also-good", ""),
    ];
    let (reqs, errors) = validate_all(&raw);
    assert_eq!(reqs.len(), 2);
    assert_eq!(reqs[0].name.as_str(), "good");
    assert_eq!(reqs[1].name.as_str(), "also-good");
    assert_eq!(errors.len(), 2);
}

#[test]
fn validate_all_rejects_duplicates_within_a_profile() {
    let raw = vec![
        RawRequirement::registry("foo", ">=1"),
        RawRequirement::registry("Foo", "<2"),
    ];
    let (reqs, errors) = validate_all(&raw);
    assert_eq!(reqs.len(), 1);
    assert_eq!(
        errors,
        vec![RequirementError::Duplicate {
            name: "foo".to_string(),
            profile: "runtime".to_string(),
        }]
    );
}

#[test]
fn validate_all_allows_same_package_in_different_profiles() {
    let raw = vec![
        RawRequirement::registry("foo", ">=1"),
        RawRequirement::registry("foo", "<2").with_profile("test"),
    ];
    let (reqs, errors) = validate_all(&raw);
    assert_eq!(reqs.len(), 2);
    assert!(errors.is_empty());
}
