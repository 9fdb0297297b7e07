//! The shipped specs under `tests/e2e/specs` parse and validate

use std::path::PathBuf;

use shopcheck_e2e::{SpecFile, TestStep};

fn specs_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../tests/e2e/specs")
}

#[test]
fn shipped_specs_load() {
    let specs = SpecFile::load_all(&specs_dir()).unwrap();

    let titles: Vec<String> = specs.iter().map(|s| s.full_title()).collect();
    assert!(titles.contains(&"Login flow › user can log in with valid credentials".to_string()));
    assert!(titles.contains(&"Login flow › shows error for invalid password".to_string()));
    assert!(titles.contains(&"Dashboard access › locked out user cannot reach the dashboard".to_string()));
    assert!(titles.contains(&"API › homepage responds with a success status".to_string()));

    // Nothing focused may be committed; CI rejects it.
    assert!(specs.iter().all(|s| !s.only));
}

#[test]
fn login_reaches_inventory() {
    let specs = SpecFile::load_all(&specs_dir()).unwrap();
    let login = specs
        .iter()
        .find(|s| s.name == "user can log in with valid credentials")
        .unwrap();

    assert!(login.needs_browser());
    assert!(login.tags.contains(&"smoke".to_string()));
    assert!(login
        .steps
        .iter()
        .any(|s| matches!(s, TestStep::AssertUrl { pattern } if pattern.contains("inventory"))));
}

#[test]
fn locked_out_message() {
    let specs = SpecFile::load_all(&specs_dir()).unwrap();
    let locked = specs
        .iter()
        .find(|s| s.suite == "Dashboard access" && s.name.starts_with("locked out"))
        .unwrap();

    let expects_message = locked.steps.iter().any(|s| {
        matches!(s, TestStep::Assert { text_contains: Some(t), .. }
            if t == "Sorry, this user has been locked out.")
    });
    assert!(expects_message);
}

#[test]
fn api_suite_runs_without_a_browser() {
    let specs = SpecFile::load_all(&specs_dir()).unwrap();
    let api: Vec<_> = specs.iter().filter(|s| s.suite == "API").collect();

    assert!(!api.is_empty());
    assert!(api.iter().all(|s| !s.needs_browser()));
}
