//! End-to-end tests driving the engine against the real git executable.

mod common;

use common::GitFixture;
use gitstate::{
    BadgePolicy, CancelFlag, EngineConfig, GitErrorKind, Model, RepositoryEvent, StatusType,
    UntrackedMode,
};
use gitstate::repository::Repository;

#[tokio::test]
async fn full_edit_stage_commit_cycle() {
    let fixture = GitFixture::new();
    fixture.commit_file("src/lib.rs", "pub fn f() {}\n", "initial");

    let model = Model::new(EngineConfig::default());
    let mut events = model.subscribe();
    let repository = model.open_repository(fixture.path()).await.unwrap();

    // Clean repository after open.
    let snapshot = repository.snapshot();
    assert!(snapshot.groups.is_empty());
    assert_eq!(snapshot.head.name.as_deref(), Some("main"));

    // Edit shows up in the working tree group after a refresh.
    fixture.write("src/lib.rs", "pub fn f() { todo!() }\n");
    repository.refresh().await.unwrap();
    let snapshot = repository.snapshot();
    assert_eq!(snapshot.groups.working_tree.len(), 1);
    assert_eq!(snapshot.groups.working_tree[0].status, StatusType::Modified);

    // Staging moves it to the index group.
    repository.stage(&["src/lib.rs"]).await.unwrap();
    let snapshot = repository.snapshot();
    assert!(snapshot.groups.working_tree.is_empty());
    assert_eq!(snapshot.groups.index.len(), 1);

    // Committing clears it.
    repository.commit("update").await.unwrap();
    let snapshot = repository.snapshot();
    assert!(snapshot.groups.is_empty());
    assert_eq!(snapshot.badge_count, 0);

    // Every state transition arrived as an event carrying the snapshot.
    let mut status_changes = 0;
    while let Ok(event) = events.try_recv() {
        if let RepositoryEvent::StatusChanged { snapshot, .. } = event {
            status_changes += 1;
            let _ = snapshot.badge_count;
        }
    }
    assert!(status_changes >= 3);
}

#[tokio::test]
async fn partially_staged_path_appears_in_both_groups() {
    let fixture = GitFixture::new();
    fixture.commit_file("a.txt", "one\n", "initial");

    let model = Model::new(EngineConfig::default());
    let repository = model.open_repository(fixture.path()).await.unwrap();

    fixture.write("a.txt", "two\n");
    repository.stage(&["a.txt"]).await.unwrap();
    fixture.write("a.txt", "three\n");
    repository.refresh().await.unwrap();

    let snapshot = repository.snapshot();
    assert_eq!(snapshot.groups.index.len(), 1);
    assert_eq!(snapshot.groups.working_tree.len(), 1);
    assert_eq!(snapshot.groups.index[0].path, "a.txt");
    assert_eq!(snapshot.groups.working_tree[0].path, "a.txt");
}

#[tokio::test]
async fn merge_conflict_lands_in_merge_group() {
    let fixture = GitFixture::new();
    fixture.commit_file("shared.txt", "base\n", "base");
    fixture.git(&["checkout", "-q", "-b", "topic"]);
    fixture.commit_file("shared.txt", "topic\n", "topic change");
    fixture.git(&["checkout", "-q", "main"]);
    fixture.commit_file("shared.txt", "main\n", "main change");

    let model = Model::new(EngineConfig::default());
    let repository = model.open_repository(fixture.path()).await.unwrap();

    let err = repository.merge("topic").await.unwrap_err();
    assert_eq!(err.kind, GitErrorKind::Conflict);

    repository.refresh().await.unwrap();
    let snapshot = repository.snapshot();
    assert_eq!(snapshot.groups.merge.len(), 1);
    assert_eq!(snapshot.groups.merge[0].status, StatusType::BothModified);
    assert_eq!(snapshot.groups.merge[0].path, "shared.txt");

    // Committing with unmerged paths refines the classification.
    let err = repository.commit("nope").await.unwrap_err();
    assert_eq!(err.kind, GitErrorKind::UnmergedChanges);
}

#[tokio::test]
async fn untracked_mode_routes_files() {
    let fixture = GitFixture::new();
    fixture.commit_file("tracked.txt", "x\n", "initial");
    fixture.write("fresh.txt", "new\n");

    let separate = EngineConfig {
        untracked_mode: UntrackedMode::Separate,
        ..Default::default()
    };
    let model = Model::new(separate);
    let repository = model.open_repository(fixture.path()).await.unwrap();
    let snapshot = repository.snapshot();
    assert!(snapshot.groups.working_tree.is_empty());
    assert_eq!(snapshot.groups.untracked.len(), 1);
    assert_eq!(snapshot.groups.untracked[0].status, StatusType::Untracked);
    // Untracked files in their own group do not contribute to the badge.
    assert_eq!(snapshot.badge_count, 0);
    model.close_repository(fixture.path()).await.unwrap();

    let hidden = EngineConfig {
        untracked_mode: UntrackedMode::Hidden,
        badge_policy: BadgePolicy::Tracked,
        ..Default::default()
    };
    let model = Model::new(hidden);
    let repository = model.open_repository(fixture.path()).await.unwrap();
    let snapshot = repository.snapshot();
    assert!(snapshot.groups.is_empty());
    assert_eq!(snapshot.badge_count, 0);
}

#[tokio::test]
async fn clone_tracks_upstream_counts() {
    let origin = GitFixture::new();
    origin.commit_file("a.txt", "one\n", "initial");

    let workdir = GitFixture::empty();
    let target = workdir.path().join("checkout");
    let config = EngineConfig::default();
    let origin_url = origin.path().to_string_lossy().into_owned();
    Repository::clone(&origin_url, &target, &config, CancelFlag::new())
        .await
        .unwrap();

    let model = Model::new(config);
    let repository = model.open_repository(&target).await.unwrap();

    let snapshot = repository.snapshot();
    assert_eq!(snapshot.remotes.len(), 1);
    assert_eq!(snapshot.remotes[0].name, "origin");
    assert!(!snapshot.remotes[0].is_read_only());
    assert!(snapshot
        .refs
        .iter()
        .any(|r| r.name == "origin/main" && r.remote.as_deref() == Some("origin")));
    let upstream = snapshot.head.upstream.as_ref().unwrap();
    assert_eq!(upstream.remote, "origin");
    assert_eq!(upstream.name, "main");
    assert_eq!(snapshot.head.ahead, Some(0));
    assert_eq!(snapshot.head.behind, Some(0));

    // A local commit moves the branch ahead of its upstream.
    std::fs::write(target.join("b.txt"), "two\n").unwrap();
    repository.stage(&["b.txt"]).await.unwrap();
    repository.commit("local work").await.unwrap();

    let snapshot = repository.snapshot();
    assert_eq!(snapshot.head.ahead, Some(1));
    assert_eq!(snapshot.head.behind, Some(0));
}

#[tokio::test]
async fn interrupted_rebase_surfaces_rebase_commit() {
    let fixture = GitFixture::new();
    fixture.commit_file("shared.txt", "base\n", "base");
    fixture.git(&["checkout", "-q", "-b", "topic"]);
    fixture.commit_file("shared.txt", "topic\n", "topic change");
    fixture.git(&["checkout", "-q", "main"]);
    fixture.commit_file("shared.txt", "main\n", "main change");
    fixture.git(&["checkout", "-q", "topic"]);

    // The rebase stops on the conflict, leaving the marker behind.
    let rebase = std::process::Command::new("git")
        .current_dir(fixture.path())
        .args(["rebase", "main"])
        .output()
        .unwrap();
    assert!(!rebase.status.success());

    let model = Model::new(EngineConfig::default());
    let repository = model.open_repository(fixture.path()).await.unwrap();

    let snapshot = repository.snapshot();
    let rebase_commit = snapshot.rebase_commit.as_ref().unwrap();
    assert_eq!(rebase_commit.message.trim(), "topic change");
    assert_eq!(snapshot.groups.merge.len(), 1);
}

#[tokio::test]
async fn vanished_repository_disposes_and_fails_fast() {
    let fixture = GitFixture::new();
    fixture.commit_file("a.txt", "x\n", "initial");

    let model = Model::new(EngineConfig::default());
    let repository = model.open_repository(fixture.path()).await.unwrap();
    assert!(!repository.is_disposed());

    std::fs::remove_dir_all(fixture.path().join(".git")).unwrap();

    let err = repository.status().await.unwrap_err();
    assert_eq!(err.kind, GitErrorKind::NotARepository);
    assert!(repository.is_disposed());

    // Subsequent operations fail fast without reaching the executable.
    let err = repository.log(1).await.unwrap_err();
    assert_eq!(err.kind, GitErrorKind::NotARepository);
}

#[tokio::test]
async fn status_cap_reports_hit_limit() {
    let fixture = GitFixture::new();
    for i in 0..8 {
        fixture.write(&format!("file{}.txt", i), "x\n");
    }

    let config = EngineConfig {
        status_limit: 5,
        ..Default::default()
    };
    let model = Model::new(config);
    let repository = model.open_repository(fixture.path()).await.unwrap();

    let list = repository.status().await.unwrap();
    assert_eq!(list.entries.len(), 5);
    assert!(list.hit_limit);

    let snapshot = repository.snapshot();
    assert!(snapshot.hit_limit);
    assert!(!repository.should_auto_refresh());
}
