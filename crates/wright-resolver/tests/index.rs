use std::fs;

use wright_core::requirement::PackageName;
use wright_resolver::{MetadataError, MetadataProvider, PackageVersion, StaticIndex};

#[tokio::test]
async fn index_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.toml");
    fs::write(
        &path,
        r#"
[[package]]
name = "Requests"
version = "2.31.0"
requires = ["idna>=2.5", { name = "pysocks", version = ">=1.5", optional = true }]

[[package]]
name = "idna"
version = "3.6"
"#,
    )
    .unwrap();

    let index = StaticIndex::from_path(&path).unwrap();
    let requests = PackageName::parse("requests").unwrap();
    let versions = index.versions(&requests).await.unwrap();
    assert_eq!(versions.len(), 1);

    let requires = index
        .lookup(&requests, &PackageVersion::Release(versions[0].clone()))
        .await
        .unwrap();
    assert_eq!(requires.len(), 2);
    assert_eq!(requires[0].name, "idna");
    assert!(requires[1].optional);
}

#[test]
fn missing_index_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = StaticIndex::from_path(&dir.path().join("nope.toml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read"));
}

#[tokio::test]
async fn unknown_release_is_not_found() {
    let index = StaticIndex::parse_toml("[[package]]\nname = \"idna\"\nversion = \"3.6\"\n").unwrap();
    let idna = PackageName::parse("idna").unwrap();
    let missing = PackageVersion::Release("9.9".parse().unwrap());
    assert_eq!(index.lookup(&idna, &missing).await, Err(MetadataError::NotFound));
}
