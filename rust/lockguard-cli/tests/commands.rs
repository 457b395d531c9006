use lockguard_cli::commands::{self, ValidateFlags, ValidateOptions};
use lockguard_cli::config::{LockguardConfig, RepositoryConfig};
use lockguard_cli::CliError;
use lockguard_core::{ErrorKind, PartialValidationMode};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

fn package(name: &str, version: &str, require: Value) -> Value {
    json!({
        "name": name,
        "version": version,
        "dist": {
            "type": "zip",
            "url": format!("https://example.org/dist/{}/{}.zip", name, version),
            "reference": "abc123",
            "shasum": ""
        },
        "require": require,
        "type": "library"
    })
}

fn write(path: &Path, value: &Value) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

fn lock_document(packages: Vec<Value>) -> Value {
    json!({"content-hash": "x", "packages": packages, "packages-dev": []})
}

fn packages_json(packages: Vec<Value>) -> Value {
    let mut by_name = serde_json::Map::new();
    for entry in packages {
        let name = entry["name"].as_str().unwrap().to_string();
        by_name
            .entry(name)
            .or_insert_with(|| json!([]))
            .as_array_mut()
            .unwrap()
            .push(entry);
    }
    json!({ "packages": by_name })
}

/// A project whose composer.json points at a local mirror and a remote
/// repository, requiring vendor/a which requires vendor/b.
struct Project {
    dir: tempfile::TempDir,
}

impl Project {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let project = Self { dir };
        write(
            &project.path("composer.json"),
            &json!({
                "name": "acme/app",
                "require": {"vendor/a": "^1.0"},
                "repositories": [
                    {"type": "composer", "url": "mirror"},
                    {"type": "composer", "url": "https://repo.packagist.org"},
                    {"type": "package", "package": package("vendor/c", "3.0.0", json!({}))},
                    {"packagist.org": false}
                ]
            }),
        );
        write(
            &project.path("mirror/packages.json"),
            &packages_json(vec![
                package("vendor/a", "1.0.0", json!({"vendor/b": "^2.0"})),
                package("vendor/b", "2.0.0", json!({})),
                package("vendor/b", "2.1.0", json!({})),
            ]),
        );
        write(
            &project.path("composer.lock"),
            &lock_document(vec![
                package("vendor/a", "1.0.0", json!({"vendor/b": "^2.0"})),
                package("vendor/b", "2.0.0", json!({})),
            ]),
        );
        project
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    fn options(&self) -> ValidateOptions {
        ValidateOptions {
            manifest: self.path("composer.json"),
            lock: self.path("composer.lock"),
            ..ValidateOptions::default()
        }
    }
}

fn validation_kind(err: CliError) -> ErrorKind {
    match err {
        CliError::Validation(err) => err.kind(),
        other => panic!("expected a validation failure, got {}", other),
    }
}

#[test]
fn validates_against_local_mirror() {
    let project = Project::new();
    let validated = commands::validate(&project.options()).unwrap();
    assert_eq!(validated.packages, 2);
}

#[test]
fn tampered_lock_fails() {
    let project = Project::new();
    let mut tampered = package("vendor/b", "2.0.0", json!({}));
    tampered["dist"]["url"] = json!("https://evil.example/b.zip");
    write(
        &project.path("composer.lock"),
        &lock_document(vec![
            package("vendor/a", "1.0.0", json!({"vendor/b": "^2.0"})),
            tampered,
        ]),
    );

    let err = commands::validate(&project.options()).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("https://evil.example/b.zip"), "{}", message);
    assert_eq!(validation_kind(err), ErrorKind::MetadataMismatch);
}

#[test]
fn inline_package_repository_is_consulted() {
    let project = Project::new();
    write(
        &project.path("composer.json"),
        &json!({
            "require": {"vendor/c": "^3.0"},
            "repositories": [
                {"type": "package", "package": package("vendor/c", "3.0.0", json!({}))}
            ]
        }),
    );
    write(
        &project.path("composer.lock"),
        &lock_document(vec![package("vendor/c", "3.0.0", json!({}))]),
    );
    assert_eq!(commands::validate(&project.options()).unwrap().packages, 1);
}

#[test]
fn flag_repositories_are_consulted() {
    let project = Project::new();
    write(
        &project.path("composer.json"),
        &json!({"require": {"vendor/a": "^1.0"}}),
    );
    let mut options = project.options();
    assert_eq!(
        validation_kind(commands::validate(&options).unwrap_err()),
        ErrorKind::MetadataMismatch
    );

    options.repositories = vec![RepositoryConfig::Packages {
        path: project.path("mirror/packages.json"),
    }];
    assert!(commands::validate(&options).is_ok());
}

#[test]
fn lock_repository_is_authoritative() {
    let project = Project::new();
    write(
        &project.path("composer.json"),
        &json!({"require": {"vendor/a": "^1.0"}}),
    );
    std::fs::copy(project.path("composer.lock"), project.path("reviewed.lock")).unwrap();

    let mut options = project.options();
    options.repositories = vec![RepositoryConfig::Lock {
        path: project.path("reviewed.lock"),
    }];
    assert!(commands::validate(&options).is_ok());
}

#[test]
fn partial_validation_trusts_the_existing_lock() {
    let project = Project::new();
    // vendor/b 2.1.0 is new; vendor/a is unchanged and only in the old lock's keeping
    let existing = lock_document(vec![
        package("vendor/a", "1.0.0", json!({"vendor/b": "^2.0"})),
        package("vendor/b", "2.0.0", json!({})),
    ]);
    write(&project.path("old.lock"), &existing);
    write(
        &project.path("composer.lock"),
        &lock_document(vec![
            package("vendor/a", "1.0.0", json!({"vendor/b": "^2.0"})),
            package("vendor/b", "2.1.0", json!({})),
        ]),
    );
    write(
        &project.path("composer.json"),
        &json!({
            "require": {"vendor/a": "^1.0"},
            "repositories": [{"type": "composer", "url": "mirror"}]
        }),
    );

    let options = ValidateOptions {
        trusted_lock: Some(project.path("old.lock")),
        touched: vec!["vendor/b".to_string()],
        mode: PartialValidationMode::OnlyListed,
        ..project.options()
    };
    assert!(commands::validate(&options).is_ok());

    // vendor/b 2.1.0 is not in the trusted lock
    let options = ValidateOptions {
        touched: vec!["vendor/a".to_string()],
        ..options
    };
    assert_eq!(
        validation_kind(commands::validate(&options).unwrap_err()),
        ErrorKind::ExpectedPackageMissing
    );
}

#[test]
fn missing_lock_is_an_io_error() {
    let project = Project::new();
    std::fs::remove_file(project.path("composer.lock")).unwrap();
    let err = commands::validate(&project.options()).unwrap_err();
    assert!(matches!(err, CliError::Io { .. }), "{}", err);
    assert!(!err.is_validation_failure());
}

#[test]
fn invalid_lock_json_is_malformed_input() {
    let project = Project::new();
    std::fs::write(project.path("composer.lock"), "{ not json").unwrap();
    let err = commands::validate(&project.options()).unwrap_err();
    assert_eq!(validation_kind(err), ErrorKind::MalformedInput);
}

#[test]
fn why_lists_dependents() {
    let project = Project::new();
    let dependents = commands::why(
        &project.path("composer.json"),
        &project.path("composer.lock"),
        "vendor/b",
    )
    .unwrap();
    assert_eq!(dependents.len(), 1);
    assert_eq!(dependents[0].name, "vendor/a");
    assert_eq!(dependents[0].version.as_deref(), Some("1.0.0"));
    assert_eq!(dependents[0].constraint, "^2.0");

    let dependents = commands::why(
        &project.path("composer.json"),
        &project.path("composer.lock"),
        "vendor/a",
    )
    .unwrap();
    assert_eq!(dependents[0].name, "acme/app");
    assert_eq!(dependents[0].version, None);
}

#[test]
fn config_file_drives_the_run() {
    let project = Project::new();
    write(
        &project.path("app/composer.json"),
        &json!({"require": {"vendor/a": "^1.0"}}),
    );
    std::fs::copy(project.path("composer.lock"), project.path("app/composer.lock")).unwrap();
    std::fs::write(
        project.path("lockguard.toml"),
        r#"
manifest = "app/composer.json"
lock = "app/composer.lock"

[[repository]]
type = "packages"
path = "mirror/packages.json"
"#,
    )
    .unwrap();

    let config = LockguardConfig::load_from(&project.path("lockguard.toml")).unwrap();
    let options = ValidateOptions::merge(&config, ValidateFlags::default()).unwrap();
    assert_eq!(options.manifest, project.path("app/composer.json"));
    assert_eq!(commands::validate(&options).unwrap().packages, 2);
}
