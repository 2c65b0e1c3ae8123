//! End-to-end scenarios driven through the `Driver` trait object, the way a
//! protocol front consumes it.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use git2::Repository;
use kiroku_driver::{Driver, GitDriverFactory, SessionInfo, SimplePerm};
use tempfile::TempDir;

fn setup_session() -> (TempDir, Box<dyn Driver>) {
    let dir = TempDir::new().unwrap();
    Repository::init(dir.path()).unwrap();
    let factory = GitDriverFactory::new(dir.path(), Arc::new(SimplePerm::new("user", "group")));
    let mut driver: Box<dyn Driver> = Box::new(factory.new_driver());
    driver.init(&SessionInfo {
        user: Some("admin".to_string()),
    });
    (dir, driver)
}

fn commit_count(root: &Path) -> usize {
    let repo = Repository::open(root).unwrap();
    if repo.head().is_err() {
        return 0;
    }
    let mut walk = repo.revwalk().unwrap();
    walk.push_head().unwrap();
    walk.count()
}

fn get_string(driver: &dyn Driver, path: &str) -> (u64, String) {
    let (size, mut file) = driver.get_file(path, 0).unwrap();
    let mut content = String::new();
    file.read_to_string(&mut content).unwrap();
    (size, content)
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[test]
fn scenario_mkdir_then_put_then_get() {
    let (dir, driver) = setup_session();
    assert_eq!(commit_count(dir.path()), 0);

    driver.make_dir("/a").unwrap();
    driver
        .put_file("/a/f.txt", &mut "hello".as_bytes(), false)
        .unwrap();

    let (size, content) = get_string(driver.as_ref(), "/a/f.txt");
    assert_eq!(size, 5);
    assert_eq!(content, "hello");
    assert_eq!(commit_count(dir.path()), 2);
}

#[test]
fn scenario_overwrite_then_append() {
    let (dir, driver) = setup_session();

    driver.put_file("/x", &mut "ab".as_bytes(), false).unwrap();
    driver.put_file("/x", &mut "cd".as_bytes(), true).unwrap();

    let (size, content) = get_string(driver.as_ref(), "/x");
    assert_eq!(size, 4);
    assert_eq!(content, "abcd");
    assert_eq!(commit_count(dir.path()), 2);
}

#[test]
fn scenario_full_session() {
    let (dir, driver) = setup_session();

    driver.make_dir("/docs/drafts").unwrap();
    driver
        .put_file("/docs/drafts/note.md", &mut "# notes\n".as_bytes(), false)
        .unwrap();
    driver.change_dir("/docs/drafts").unwrap();

    let mut listed = Vec::new();
    driver
        .list_dir("/docs/drafts", &mut |meta| {
            listed.push(meta.name.clone());
            Ok(())
        })
        .unwrap();
    assert_eq!(listed, vec!["note.md".to_string()]);

    driver
        .rename("/docs/drafts/note.md", "/docs/note.md")
        .unwrap();
    driver.delete_dir("/docs/drafts").unwrap();
    driver.delete_file("/docs/note.md").unwrap();

    // mkdir, put, rename, rmdir, delete — five mutations, five commits.
    assert_eq!(commit_count(dir.path()), 5);

    let mut remaining = Vec::new();
    driver
        .list_dir("/docs", &mut |meta| {
            remaining.push(meta.name.clone());
            Ok(())
        })
        .unwrap();
    assert!(remaining.is_empty());
}
