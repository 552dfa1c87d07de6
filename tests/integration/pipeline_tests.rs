//! End-to-end pipeline runs against the engine double

use crate::support::{snapshot, FakeEngine, Project, IMAGE_NAME, STAGING_TAG};
use stagecraft::lifecycle::Step;
use stagecraft::pipeline::{RunOptions, RunOutcome};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

fn prime() -> RunOptions {
    RunOptions::new(Step::Prime)
}

fn stage_builds(engine: &FakeEngine) -> usize {
    engine.count(&format!("build {}", STAGING_TAG))
}

#[tokio::test]
async fn first_run_builds_layer_and_final_image() {
    let project = Project::new(&["curl"]);
    let engine = FakeEngine::default();

    let outcome = project.run(&engine, &prime()).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Executed(4)));

    assert_eq!(
        engine.calls(),
        vec![
            format!("build {}", STAGING_TAG),
            format!("save {}", STAGING_TAG),
            "inspect ubuntu:20.04".to_string(),
            format!("build {}", IMAGE_NAME),
        ]
    );
    assert!(project.path("layer/usr/bin/curl").is_file());
    assert!(project.path("prime/bin/hello").is_file());
    assert!(project.path("prime/usr/bin/curl").is_file());

    let dockerfile = fs::read_to_string(project.path("Dockerfile")).unwrap();
    assert_eq!(dockerfile, "FROM ubuntu:20.04\nCOPY prime /\n");
}

#[tokio::test]
async fn only_topmost_layer_is_extracted() {
    let project = Project::new(&["curl"]);
    let engine = FakeEngine::default();
    project.run(&engine, &prime()).await.unwrap();

    for dir in ["layer", "stage", "prime"] {
        let root = project.path(dir);
        assert!(root.join("usr/bin/curl").is_file(), "{} lacks curl", dir);
        assert!(!root.join("etc/os-release").exists(), "{} has base layer", dir);
        assert!(!root.join("usr/lib/base.so").exists(), "{} has base layer", dir);
    }
}

#[tokio::test]
async fn unchanged_packages_reuse_the_cache() {
    let project = Project::new(&["curl"]);
    let engine = FakeEngine::default();
    project.run(&engine, &prime()).await.unwrap();
    let stage_before = snapshot(&project.path("stage"));
    let prime_before = snapshot(&project.path("prime"));
    let cached = fs::metadata(project.path("layer/usr/bin/curl")).unwrap();
    engine.reset();

    let outcome = project.run(&engine, &prime()).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Executed(0)));
    assert!(engine.calls().is_empty());
    assert_eq!(snapshot(&project.path("stage")), stage_before);
    assert_eq!(snapshot(&project.path("prime")), prime_before);

    let after = fs::metadata(project.path("layer/usr/bin/curl")).unwrap();
    assert_eq!(cached.ino(), after.ino());
    assert_eq!(cached.mtime(), after.mtime());
}

#[tokio::test]
async fn requested_reprime_uses_existing_layer() {
    let project = Project::new(&["curl"]);
    let engine = FakeEngine::default();
    project.run(&engine, &prime()).await.unwrap();
    engine.reset();

    let mut options = prime();
    options.parts = vec!["hello".to_string()];
    let outcome = project.run(&engine, &options).await.unwrap();

    assert!(matches!(outcome, RunOutcome::Executed(1)));
    assert_eq!(stage_builds(&engine), 0);
    assert_eq!(engine.count("save"), 0);
    assert_eq!(engine.calls(), vec![format!("build {}", IMAGE_NAME)]);
}

#[tokio::test]
async fn package_change_rebuilds_layer() {
    let project = Project::new(&["curl"]);
    let engine = FakeEngine::default();
    project.run(&engine, &prime()).await.unwrap();

    project.set_packages(&["git"]);
    project.run(&engine, &prime()).await.unwrap();

    assert_eq!(stage_builds(&engine), 2);
    assert!(project.path("layer/usr/bin/git").is_file());
    assert!(!project.path("layer/usr/bin/curl").exists());
    assert!(!project.path("stage/usr/bin/curl").exists());
    assert!(project.path("prime/usr/bin/git").is_file());
}

#[tokio::test]
async fn stage_and_prime_match_the_layer() {
    let project = Project::new(&["curl", "git"]);
    let engine = FakeEngine::default();
    project.run(&engine, &prime()).await.unwrap();

    let layer = snapshot(&project.path("layer"));
    let stage = snapshot(&project.path("stage"));
    let prime = snapshot(&project.path("prime"));
    for (path, content) in &layer {
        assert_eq!(stage.get(path), Some(content), "stage {}", path.display());
        assert_eq!(prime.get(path), Some(content), "prime {}", path.display());
    }

    let linked = |dir: &str| {
        fs::metadata(project.path(dir).join(Path::new("usr/bin/git")))
            .unwrap()
            .ino()
    };
    assert_eq!(linked("layer"), linked("stage"));
}

#[tokio::test]
async fn empty_package_set_never_calls_the_builder() {
    let project = Project::new(&[]);
    let engine = FakeEngine::default();

    project.run(&engine, &RunOptions::new(Step::Stage)).await.unwrap();
    assert!(engine.calls().is_empty());
    assert!(project.path("layer").is_dir());
    assert!(project.path("stage/bin/hello").is_file());
}

#[tokio::test]
async fn plan_only_has_no_side_effects() {
    let project = Project::new(&["curl"]);
    let engine = FakeEngine::default();
    let mut options = prime();
    options.plan_only = true;

    let outcome = project.run(&engine, &options).await.unwrap();
    let RunOutcome::Planned(actions) = outcome else {
        panic!("expected a plan");
    };
    assert_eq!(actions.len(), 4);
    assert!(engine.calls().is_empty());
    for dir in ["parts", "stage", "prime", "layer"] {
        assert!(!project.path(dir).exists(), "{} created", dir);
    }
}

#[tokio::test]
async fn clean_then_prime_rebuilds() {
    let project = Project::new(&["curl"]);
    let engine = FakeEngine::default();
    project.run(&engine, &prime()).await.unwrap();

    project.clean().await.unwrap();
    for dir in ["parts", "stage", "prime", "layer"] {
        assert!(!project.path(dir).exists(), "{} left behind", dir);
    }

    engine.reset();
    let outcome = project.run(&engine, &prime()).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Executed(4)));
    assert_eq!(stage_builds(&engine), 1);
    assert!(project.path("prime/usr/bin/curl").is_file());
}
