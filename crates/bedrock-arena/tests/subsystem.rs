//! Arena traffic as seen by the memory subsystem underneath it.

use std::sync::Arc;

use bedrock_arena::{page_size, ArenaConfig, ArenaError, ArenaMarker, MemoryArena};
use bedrock_test_utils::CountingSubsystem;

#[test]
fn reserve_failure_is_reported() {
    let subsystem = Arc::new(CountingSubsystem::new());
    subsystem.fail_reserves(true);
    let err = MemoryArena::create(subsystem.clone(), 1 << 20).unwrap_err();
    assert_eq!(
        err,
        ArenaError::ReserveFailed {
            size: (1 << 20) + page_size()
        }
    );
    assert_eq!(subsystem.reserves(), 0);
    assert_eq!(subsystem.releases(), 0);
}

#[test]
fn drop_releases_reservation_once() {
    let subsystem = Arc::new(CountingSubsystem::new());
    let arena = MemoryArena::create(subsystem.clone(), 1 << 20).unwrap();
    assert_eq!(subsystem.reserves(), 1);
    assert_eq!(subsystem.commits(), 0);
    drop(arena);
    assert_eq!(subsystem.releases(), 1);
}

#[test]
fn commits_follow_the_push_position() {
    let page = page_size();
    let subsystem = Arc::new(CountingSubsystem::new());
    let mut config = ArenaConfig::new(1 << 20);
    config.commit_step = page;
    let mut arena = MemoryArena::with_config(subsystem.clone(), &config).unwrap();

    arena.push(10, 1).unwrap();
    assert_eq!(subsystem.commits(), 1);
    assert_eq!(subsystem.committed_bytes(), page);

    // Still inside the committed page.
    arena.push(100, 1).unwrap();
    assert_eq!(subsystem.commits(), 1);

    arena.push(2 * page, 1).unwrap();
    assert_eq!(subsystem.commits(), 2);
    assert_eq!(subsystem.committed_bytes(), arena.commit_pos());
    assert!(arena.commit_pos() >= arena.pos());
}

#[test]
fn rewinding_keeps_committed_pages() {
    let subsystem = Arc::new(CountingSubsystem::new());
    let mut arena = MemoryArena::create(subsystem.clone(), 1 << 20).unwrap();
    let marker = arena.create_marker();
    arena.push(3 * page_size(), 1).unwrap();
    let committed = arena.commit_pos();

    arena.reset_to_marker(marker);
    assert_eq!(arena.pos(), 0);
    assert_eq!(arena.commit_pos(), committed);
    assert_eq!(subsystem.decommits(), 0);

    let commits = subsystem.commits();
    arena.push(3 * page_size(), 1).unwrap();
    assert_eq!(subsystem.commits(), commits);
}

#[test]
fn failed_commit_leaves_arena_unchanged() {
    let subsystem = Arc::new(CountingSubsystem::new());
    let mut arena = MemoryArena::create(subsystem.clone(), 1 << 20).unwrap();
    arena.push(10, 1).unwrap();
    subsystem.fail_commits(true);
    let err = arena.push(2 * page_size(), 1).unwrap_err();
    assert!(matches!(err, ArenaError::CommitFailed { .. }));
    assert_eq!(arena.pos(), 10);
    assert_eq!(arena.commit_pos(), page_size());

    subsystem.fail_commits(false);
    arena.push(2 * page_size(), 1).unwrap();
    assert_eq!(arena.pos(), 10 + 2 * page_size());
}

#[test]
fn release_marker_releases_once() {
    let subsystem = Arc::new(CountingSubsystem::new());
    let mut arena = MemoryArena::create(subsystem.clone(), 1 << 20).unwrap();
    arena.push(64, 8).unwrap();
    arena.reset_to_marker(ArenaMarker::release());
    assert!(arena.is_released());
    assert_eq!(arena.push(1, 1).unwrap_err(), ArenaError::Released);
    assert_eq!(arena.pos(), 0);
    assert_eq!(arena.commit_pos(), 0);

    arena.reset_to_marker(ArenaMarker::release());
    drop(arena);
    assert_eq!(subsystem.releases(), 1);
}

#[test]
fn fixed_arena_commits_up_front_and_returns_block() {
    let subsystem = Arc::new(CountingSubsystem::new());
    let mut arena = MemoryArena::fixed(subsystem.clone(), page_size()).unwrap();
    assert_eq!(subsystem.committed_bytes(), page_size());
    arena.push(page_size(), 1).unwrap();
    assert!(matches!(
        arena.push(1, 1).unwrap_err(),
        ArenaError::CapacityExceeded { .. }
    ));
    assert_eq!(subsystem.commits(), 1);
    drop(arena);
    assert_eq!(subsystem.releases(), 1);
}
