//! End-to-end pipeline scenarios against real git repositories.
//!
//! Each test builds a small linear history with `git init` + the raw
//! object-store primitives (mirroring `newpr-git`'s own integration tests),
//! then drives the full six-stage pipeline through `newpr::run` and checks
//! the externally observable result: the stack's group commits, branch
//! refs, and final tree.

use tempfile::TempDir;

use newpr::cancel::CancellationToken;
use newpr::coupling;
use newpr::execute::Identity;
use newpr::model::{Group, GroupId, GroupKind, Ownership};
use newpr::pipeline::{self, PipelineInput};
use newpr_git::{EntryMode, GitOid, GitRepo, GixRepo, TreeEntry};

fn setup_repo() -> (TempDir, GixRepo) {
    let dir = TempDir::new().unwrap();
    std::process::Command::new("git")
        .args(["init", dir.path().to_str().unwrap()])
        .output()
        .unwrap();
    std::process::Command::new("git")
        .args(["config", "user.email", "test@test.com"])
        .current_dir(dir.path())
        .output()
        .unwrap();
    std::process::Command::new("git")
        .args(["config", "user.name", "Test User"])
        .current_dir(dir.path())
        .output()
        .unwrap();
    let repo = GixRepo::open(dir.path()).unwrap();
    (dir, repo)
}

/// One file write applied on top of a parent commit (or an empty tree, for
/// the very first commit).
enum Write {
    Put { path: &'static str, content: &'static [u8] },
    Remove { path: &'static str },
    Rename { from: &'static str, to: &'static str },
}

fn commit_on(repo: &GixRepo, parent: Option<GitOid>, writes: &[Write], message: &str) -> GitOid {
    let mut entries: Vec<TreeEntry> = match parent {
        Some(p) => repo.read_tree(repo.read_commit(p).unwrap().tree_oid).unwrap(),
        None => Vec::new(),
    };

    for write in writes {
        match write {
            Write::Put { path, content } => {
                let blob = repo.write_blob(content).unwrap();
                entries.retain(|e| &e.name != path);
                entries.push(TreeEntry {
                    name: (*path).to_owned(),
                    mode: EntryMode::Blob,
                    oid: blob,
                });
            }
            Write::Remove { path } => {
                entries.retain(|e| &e.name != path);
            }
            Write::Rename { from, to } => {
                let existing = entries.iter().find(|e| &e.name == from).cloned().unwrap();
                entries.retain(|e| &e.name != from);
                entries.push(TreeEntry {
                    name: (*to).to_owned(),
                    mode: existing.mode,
                    oid: existing.oid,
                });
            }
        }
    }

    let tree = repo.write_tree(&entries).unwrap();
    let parents: Vec<GitOid> = parent.into_iter().collect();
    repo.create_commit(
        tree,
        &parents,
        "Test User <test@test.com>",
        "Test User <test@test.com>",
        message,
    )
    .unwrap()
}

fn group(id: &str, kind: GroupKind, files: &[&str]) -> Group {
    Group {
        id: GroupId::new(id).unwrap(),
        kind,
        description: format!("{id} changes"),
        files: files.iter().map(|s| (*s).to_owned()).collect(),
        explicit_deps: Vec::new(),
    }
}

fn ownership(assignments: &[(&str, &str)]) -> Ownership {
    let mut ownership = Ownership::new();
    for (path, group_id) in assignments {
        ownership.assign((*path).to_owned(), GroupId::new(*group_id).unwrap());
    }
    ownership
}

fn identity() -> Identity {
    Identity {
        author: "Test User <test@test.com>".to_owned(),
        committer: "Test User <test@test.com>".to_owned(),
    }
}

// ===========================================================================
// Three-group linear happy path
// ===========================================================================

#[test]
fn three_group_linear_happy_path_produces_verified_stack() {
    let (_dir, repo) = setup_repo();

    let base = commit_on(&repo, None, &[Write::Put { path: "README.md", content: b"hi" }], "base");
    let c1 = commit_on(
        &repo,
        Some(base),
        &[Write::Put { path: "src/auth.rs", content: b"fn auth() {}" }],
        "add auth",
    );
    let c2 = commit_on(
        &repo,
        Some(c1),
        &[Write::Put { path: "src/api.rs", content: b"fn api() {}" }],
        "add api",
    );
    let head = commit_on(
        &repo,
        Some(c2),
        &[Write::Put { path: "src/ui.rs", content: b"fn ui() {}" }],
        "add ui",
    );

    let groups = vec![
        group("auth", GroupKind::Feature, &["src/auth.rs"]),
        group("api", GroupKind::Feature, &["src/api.rs"]),
        group("ui", GroupKind::Feature, &["src/ui.rs"]),
    ];
    let initial_ownership = ownership(&[
        ("src/auth.rs", "auth"),
        ("src/api.rs", "api"),
        ("src/ui.rs", "ui"),
    ]);
    let identity = identity();
    let input = PipelineInput {
        base,
        head,
        initial_ownership,
        groups: &groups,
        coupling_rules: &[],
        identity: &identity,
        pr_number: 7,
        source_slug: "feature-branch".to_owned(),
    };

    let outcome = pipeline::run(&repo, input, &CancellationToken::new()).unwrap();

    assert_eq!(outcome.result.group_commits.len(), 3);
    assert!(outcome.result.verified);
    assert!(outcome.verification.errors.is_empty());
    assert_eq!(outcome.result.final_tree_hash, repo.read_commit(head).unwrap().tree_oid);

    for gc in &outcome.result.group_commits {
        assert!(gc.branch_ref.as_str().starts_with("refs/heads/newpr-stack/pr-7/feature-branch/"));
        assert_eq!(repo.read_ref(&gc.branch_ref).unwrap(), Some(gc.commit_hash));
    }

    // Stack order must follow the commit-touch order: auth, api, ui.
    let order: Vec<&str> = outcome
        .result
        .group_commits
        .iter()
        .map(|gc| gc.group_id.as_str())
        .collect();
    assert_eq!(order, vec!["auth", "api", "ui"]);
}

// ===========================================================================
// Rename preservation
// ===========================================================================

#[test]
fn rename_is_preserved_in_final_tree() {
    let (_dir, repo) = setup_repo();

    let base = commit_on(
        &repo,
        None,
        &[Write::Put { path: "src/old_name.rs", content: b"fn f() {}" }],
        "base",
    );
    let head = commit_on(
        &repo,
        Some(base),
        &[Write::Rename { from: "src/old_name.rs", to: "src/new_name.rs" }],
        "rename",
    );

    let groups = vec![group("core", GroupKind::Refactor, &["src/old_name.rs", "src/new_name.rs"])];
    let initial_ownership = ownership(&[
        ("src/old_name.rs", "core"),
        ("src/new_name.rs", "core"),
    ]);
    let identity = identity();
    let input = PipelineInput {
        base,
        head,
        initial_ownership,
        groups: &groups,
        coupling_rules: &[],
        identity: &identity,
        pr_number: 1,
        source_slug: "rename-branch".to_owned(),
    };

    let outcome = pipeline::run(&repo, input, &CancellationToken::new()).unwrap();

    assert!(outcome.result.verified);
    let tree = repo.read_tree(outcome.result.final_tree_hash).unwrap();
    let names: Vec<&str> = tree.iter().map(|e| e.name.as_str()).collect();
    assert!(names.contains(&"src/new_name.rs"));
    assert!(!names.contains(&"src/old_name.rs"));
}

// ===========================================================================
// Deletion
// ===========================================================================

#[test]
fn deletion_is_reflected_in_final_tree() {
    let (_dir, repo) = setup_repo();

    let base = commit_on(
        &repo,
        None,
        &[
            Write::Put { path: "src/keep.rs", content: b"keep" },
            Write::Put { path: "src/drop.rs", content: b"drop" },
        ],
        "base",
    );
    let head = commit_on(&repo, Some(base), &[Write::Remove { path: "src/drop.rs" }], "remove drop.rs");

    let groups = vec![group("cleanup", GroupKind::Chore, &["src/drop.rs"])];
    let initial_ownership = ownership(&[("src/drop.rs", "cleanup")]);
    let identity = identity();
    let input = PipelineInput {
        base,
        head,
        initial_ownership,
        groups: &groups,
        coupling_rules: &[],
        identity: &identity,
        pr_number: 2,
        source_slug: "cleanup-branch".to_owned(),
    };

    let outcome = pipeline::run(&repo, input, &CancellationToken::new()).unwrap();
    assert!(outcome.result.verified);
    let tree = repo.read_tree(outcome.result.final_tree_hash).unwrap();
    let names: Vec<&str> = tree.iter().map(|e| e.name.as_str()).collect();
    assert!(names.contains(&"src/keep.rs"));
    assert!(!names.contains(&"src/drop.rs"));
}

// ===========================================================================
// Coupling forces the manifest and its lockfile into the same group
// ===========================================================================

#[test]
fn coupling_forces_manifest_and_lockfile_into_same_group() {
    let (_dir, repo) = setup_repo();

    let base = commit_on(&repo, None, &[Write::Put { path: "README.md", content: b"hi" }], "base");
    let head = commit_on(
        &repo,
        Some(base),
        &[
            Write::Put { path: "package.json", content: b"{}" },
            Write::Put { path: "package-lock.json", content: b"{}" },
        ],
        "bump deps",
    );

    let groups = vec![
        group("deps-a", GroupKind::Config, &["package.json"]),
        group("deps-b", GroupKind::Config, &["package-lock.json"]),
    ];
    let declared_ownership = ownership(&[
        ("package.json", "deps-a"),
        ("package-lock.json", "deps-b"),
    ]);

    // Manually run C2 first to show the forced move, mirroring how a real
    // caller would assemble `initial_ownership` before handing it to the
    // pipeline (the pipeline itself re-applies the same default rules).
    let config = newpr::config::CouplingConfig::default();
    let rules = coupling::default_rules(&config);
    let changed = vec!["package.json".to_owned(), "package-lock.json".to_owned()];
    let order = vec![GroupId::new("deps-a").unwrap(), GroupId::new("deps-b").unwrap()];
    let coupled = coupling::enforce(&declared_ownership, &changed, &order, &rules);
    assert_eq!(coupled.forced_moves.len(), 1);
    assert_eq!(coupled.ownership.get("package-lock.json"), Some(&GroupId::new("deps-a").unwrap()));

    let identity = identity();
    let input = PipelineInput {
        base,
        head,
        initial_ownership: declared_ownership,
        groups: &groups,
        coupling_rules: &rules,
        identity: &identity,
        pr_number: 3,
        source_slug: "deps-branch".to_owned(),
    };

    let outcome = pipeline::run(&repo, input, &CancellationToken::new()).unwrap();

    // Coupling collapsed both files into one group commit.
    assert_eq!(outcome.result.group_commits.len(), 1);
    assert_eq!(outcome.result.group_commits[0].group_id, GroupId::new("deps-a").unwrap());
    assert!(outcome.result.verified);
}

// ===========================================================================
// Merge commits are rejected outright
// ===========================================================================

#[test]
fn merge_commit_in_range_is_rejected() {
    let (_dir, repo) = setup_repo();

    let base = commit_on(&repo, None, &[Write::Put { path: "a.txt", content: b"a" }], "base");
    let side = commit_on(&repo, Some(base), &[Write::Put { path: "b.txt", content: b"b" }], "side");
    let main = commit_on(&repo, Some(base), &[Write::Put { path: "c.txt", content: b"c" }], "main");

    // Synthesize a merge commit with two parents directly, bypassing `git
    // merge` machinery — the pipeline only cares about the parent count.
    let merge_tree = repo.read_commit(main).unwrap().tree_oid;
    let merge = repo
        .create_commit(
            merge_tree,
            &[main, side],
            "Test User <test@test.com>",
            "Test User <test@test.com>",
            "merge side into main",
        )
        .unwrap();

    let groups = vec![group("only", GroupKind::Chore, &["a.txt", "b.txt", "c.txt"])];
    let initial_ownership = ownership(&[("a.txt", "only"), ("b.txt", "only"), ("c.txt", "only")]);
    let identity = identity();
    let input = PipelineInput {
        base,
        head: merge,
        initial_ownership,
        groups: &groups,
        coupling_rules: &[],
        identity: &identity,
        pr_number: 4,
        source_slug: "merge-branch".to_owned(),
    };

    let result = pipeline::run(&repo, input, &CancellationToken::new());
    assert!(matches!(result, Err(newpr::EngineError::UnsupportedHistory { .. })));
}

// ===========================================================================
// Declared-dependency cycle without path-order corroboration is tolerated
// ===========================================================================

#[test]
fn pure_declared_cycle_without_path_order_evidence_still_completes() {
    let (_dir, repo) = setup_repo();

    let base = commit_on(&repo, None, &[Write::Put { path: "README.md", content: b"hi" }], "base");
    let head = commit_on(
        &repo,
        Some(base),
        &[
            Write::Put { path: "src/a.rs", content: b"a" },
            Write::Put { path: "src/b.rs", content: b"b" },
        ],
        "touch both in one commit",
    );

    // A declares a dependency on B and B declares one on A — a pure cycle
    // with no path-order evidence from either side, since both paths were
    // touched by the same single commit.
    let mut group_a = group("a", GroupKind::Feature, &["src/a.rs"]);
    group_a.explicit_deps = vec![GroupId::new("b").unwrap()];
    let mut group_b = group("b", GroupKind::Feature, &["src/b.rs"]);
    group_b.explicit_deps = vec![GroupId::new("a").unwrap()];
    let groups = vec![group_a, group_b];

    let initial_ownership = ownership(&[("src/a.rs", "a"), ("src/b.rs", "b")]);
    let identity = identity();
    let input = PipelineInput {
        base,
        head,
        initial_ownership,
        groups: &groups,
        coupling_rules: &[],
        identity: &identity,
        pr_number: 5,
        source_slug: "cycle-branch".to_owned(),
    };

    let outcome = pipeline::run(&repo, input, &CancellationToken::new()).unwrap();
    assert_eq!(outcome.result.group_commits.len(), 2);
    assert!(outcome.result.verified);
}
