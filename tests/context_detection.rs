mod helpers;

use guardian::context::ContextProbe;
use guardian::{Decision, OperationContext};
use helpers::{create_test_repo, protect_main};
use std::process::Command;

/// Detected values fill gaps but never override explicit flags
#[test]
fn test_explicit_values_win_over_detection() {
    let (_temp, repo_path) = create_test_repo();
    let detected = ContextProbe::discover_from(&repo_path).detect();
    if detected.branch.is_empty() {
        // git missing or too old for `init -b`
        return;
    }

    let explicit = OperationContext::new("release", "", "");
    let merged = explicit.or_else(detected.clone());
    assert_eq!(merged.branch, "release");
    assert_eq!(merged.user, detected.user);
}

/// A repository on main with an origin upstream trips the default-style policy
#[test]
fn test_detected_context_drives_decision() {
    let (_temp, repo_path) = create_test_repo();
    Command::new("git")
        .args(["config", "branch.main.remote", "origin"])
        .current_dir(&repo_path)
        .output()
        .unwrap();

    let detected = ContextProbe::discover_from(&repo_path).detect();
    if detected.branch.is_empty() {
        return;
    }

    let store = protect_main();
    assert!(matches!(
        store.check("git", "push", &detected),
        Decision::RequiresApproval(_)
    ));
}
