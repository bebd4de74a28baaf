//! Object store and checkout written from a hand-built registry.

use std::fs;
use std::io::Read;

use bytes::Bytes;
use flate2::read::ZlibDecoder;
use packrat_storage::{
    checkout_tree, init, write_object_store, CommitRecord, EntryMode, ObjectId, ObjectRegistry,
    ObjectType, TreeChild,
};

#[test]
fn test_loose_files_use_standard_framing() {
    let tmp = tempfile::tempdir().unwrap();
    let git_dir = init(tmp.path()).unwrap();

    let mut registry = ObjectRegistry::new();
    let id = ObjectId::hash_object(ObjectType::Blob, b"hello world\n");
    assert_eq!(id.to_hex(), "3b18e512dba79e4c8300dd08aeb37f8e728b8dad");
    registry.upsert_blob(id, None, Some(Bytes::from_static(b"hello world\n")));

    let commit = CommitRecord::new("tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\nempty\n");
    assert_eq!(write_object_store(&git_dir, &registry, &[commit.clone()]).unwrap(), 2);

    let raw = fs::read(git_dir.join("objects/3b/18e512dba79e4c8300dd08aeb37f8e728b8dad")).unwrap();
    let mut inflated = Vec::new();
    ZlibDecoder::new(raw.as_slice()).read_to_end(&mut inflated).unwrap();
    assert_eq!(inflated, b"blob 12\0hello world\n");

    let (dir, file) = commit.id.loose_parts();
    assert!(git_dir.join("objects").join(dir).join(file).is_file());
}

#[test]
fn test_checkout_nested_layout() {
    let tmp = tempfile::tempdir().unwrap();
    let mut registry = ObjectRegistry::new();

    let readme = ObjectId::hash_object(ObjectType::Blob, b"# demo\n");
    let main = ObjectId::hash_object(ObjectType::Blob, b"fn main() {}\n");
    let readme_idx = registry.upsert_blob(readme, Some("README.md"), Some(Bytes::from_static(b"# demo\n")));
    let main_idx = registry.upsert_blob(main, Some("main.rs"), Some(Bytes::from_static(b"fn main() {}\n")));

    let src = registry.upsert_tree(ObjectId::from_bytes([2; 20]), Some("src"), None);
    registry.fill_tree(
        src,
        Bytes::from_static(b"src entries"),
        vec![TreeChild {
            name: "main.rs".to_string(),
            mode: EntryMode::Regular,
            index: main_idx,
        }],
        vec![],
    );
    let root = registry.upsert_tree(ObjectId::from_bytes([1; 20]), None, None);
    registry.fill_tree(
        root,
        Bytes::from_static(b"root entries"),
        vec![TreeChild {
            name: "README.md".to_string(),
            mode: EntryMode::Regular,
            index: readme_idx,
        }],
        vec![TreeChild {
            name: "src".to_string(),
            mode: EntryMode::Tree,
            index: src,
        }],
    );

    let stats = checkout_tree(&registry, root, tmp.path()).unwrap();
    assert_eq!(stats.files, 2);
    assert_eq!(stats.directories, 1);
    assert_eq!(fs::read(tmp.path().join("README.md")).unwrap(), b"# demo\n");
    assert_eq!(fs::read(tmp.path().join("src/main.rs")).unwrap(), b"fn main() {}\n");
}
