//! Integration tests for the store-to-filesystem mapping, run against the
//! in-memory gateway.

use std::sync::Arc;
use std::time::Duration;

use streamfs::{
    FsError, KeyType, MemoryGateway, Node, NodeKind, StoreGateway, StreamFs, ROOT_INODE,
};

fn new_fs() -> StreamFs<MemoryGateway> {
    StreamFs::new(MemoryGateway::new(), Duration::from_secs(1))
}

#[tokio::test]
async fn scalar_flush_then_read_returns_writes_in_order() {
    let fs = new_fs();
    let root = fs.root();

    let file = fs.create_file(&root, "greeting");
    fs.open_file(&file, false).await;
    fs.write(&file, b"foo").await;
    fs.write(&file, b"bar").await;
    fs.flush(&file).await.unwrap();

    assert_eq!(fs.read_all(&file).await.unwrap(), b"foobar");
    assert_eq!(fs.gateway().get_string("greeting").await.unwrap(), b"foobar");
}

#[tokio::test]
async fn list_keys_read_as_newline_joined_elements() {
    let fs = new_fs();
    fs.gateway().put_list("l", [b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);

    let root = fs.root();
    let Node::File(file) = fs.lookup(&root, "l").await.unwrap() else {
        panic!("list keys map to files");
    };
    // No trailing separator.
    assert_eq!(fs.read_all(&file).await.unwrap(), b"a\nb\nc");
}

#[tokio::test]
async fn mkdir_establishes_an_empty_stream() {
    let fs = new_fs();
    let root = fs.root();

    fs.create_stream_dir(&root, "events").await.unwrap();

    assert_eq!(fs.gateway().key_type("events").await.unwrap(), KeyType::Stream);
    assert!(fs.gateway().stream_range("events").await.unwrap().is_empty());
}

#[tokio::test]
async fn lookup_of_missing_key_is_not_found() {
    let fs = new_fs();
    let root = fs.root();
    assert_eq!(fs.lookup(&root, "nope").await.unwrap_err(), FsError::NotFound);
}

#[tokio::test]
async fn unsupported_types_fail_at_read_not_lookup() {
    let fs = new_fs();
    fs.gateway().put_other("h", "hash");

    let root = fs.root();
    let Node::File(file) = fs.lookup(&root, "h").await.unwrap() else {
        panic!("non-stream keys map to files");
    };
    assert_eq!(fs.read_all(&file).await.unwrap_err(), FsError::Unsupported);
}

#[tokio::test]
async fn root_listing_maps_types_and_omits_the_rest() {
    let fs = new_fs();
    fs.gateway().put_string("a", "value");
    fs.gateway().put_list("l", [b"x".to_vec()]);
    let root = fs.root();
    fs.create_stream_dir(&root, "s").await.unwrap();

    let entries = fs.read_dir(&root).await.unwrap();
    let mut summary: Vec<(String, NodeKind)> = entries
        .into_iter()
        .map(|entry| (entry.name, entry.kind))
        .collect();
    summary.sort_by(|a, b| a.0.cmp(&b.0));

    assert_eq!(
        summary,
        [
            ("a".to_string(), NodeKind::File),
            ("s".to_string(), NodeKind::Dir),
        ]
    );
}

#[tokio::test]
async fn stream_directories_enumerate_empty() {
    let fs = new_fs();
    let root = fs.root();
    let events = fs.create_stream_dir(&root, "events").await.unwrap();

    let file = fs.create_file(&events, "12");
    fs.open_file(&file, false).await;
    fs.write(&file, b"payload").await;
    fs.flush(&file).await.unwrap();

    // Children are write-only: creatable and flushable, never listed.
    assert!(fs.read_dir(&events).await.unwrap().is_empty());
}

#[tokio::test]
async fn stream_parented_flush_appends_one_entry() {
    let fs = new_fs();
    let root = fs.root();
    let events = fs.create_stream_dir(&root, "events").await.unwrap();

    let file = fs.create_file(&events, "12");
    fs.open_file(&file, false).await;
    fs.write(&file, b"payload").await;
    fs.flush(&file).await.unwrap();

    let entries = fs.gateway().stream_range("events").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, "12-0");
    assert_eq!(entries[0].fields["blob"], "payload");
}

#[tokio::test]
async fn stream_reads_render_entries_as_json_in_id_order() {
    let fs = new_fs();
    fs.gateway()
        .stream_append("events", "1-0", &[("blob", b"first".as_slice())])
        .await
        .unwrap();
    fs.gateway()
        .stream_append("events", "2-0", &[("blob", b"second".as_slice())])
        .await
        .unwrap();

    // Reading a stream through a file node serializes the full range.
    let root = fs.root();
    let file = fs.create_file(&root, "events");
    let bytes = fs.read_all(&file).await.unwrap();

    let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(parsed[0]["id"], "1-0");
    assert_eq!(parsed[0]["fields"]["blob"], "first");
    assert_eq!(parsed[1]["id"], "2-0");
    assert_eq!(parsed[1]["fields"]["blob"], "second");
}

#[tokio::test]
async fn read_only_opens_flush_without_side_effects() {
    let fs = new_fs();
    fs.gateway().put_string("k", "keep");

    let root = fs.root();
    let Node::File(file) = fs.lookup(&root, "k").await.unwrap() else {
        panic!("scalar keys map to files");
    };
    fs.open_file(&file, true).await;
    fs.flush(&file).await.unwrap();

    assert_eq!(fs.gateway().get_string("k").await.unwrap(), b"keep");
}

#[tokio::test]
async fn writable_flush_of_an_empty_buffer_writes_empty_content() {
    let fs = new_fs();
    fs.gateway().put_string("k", "old");

    let root = fs.root();
    let file = fs.create_file(&root, "k");
    fs.open_file(&file, false).await;
    fs.flush(&file).await.unwrap();

    assert_eq!(fs.gateway().get_string("k").await.unwrap(), b"");
}

#[tokio::test]
async fn failed_flush_keeps_the_buffer_for_retry() {
    let fs = new_fs();
    let root = fs.root();
    let events = fs.create_stream_dir(&root, "events").await.unwrap();

    let file = fs.create_file(&events, "12");
    fs.open_file(&file, false).await;
    fs.write(&file, b"payload").await;

    // The stream key changes type behind our back, so the append fails.
    fs.gateway().put_string("events", "oops");
    assert_eq!(fs.flush(&file).await.unwrap_err(), FsError::Io);

    // Once the key is gone the retry commits the bytes buffered before
    // the failure, proving the buffer survived it.
    fs.gateway().remove("events");
    fs.flush(&file).await.unwrap();
    let entries = fs.gateway().stream_range("events").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, "12-0");
    assert_eq!(entries[0].fields["blob"], "payload");
}

#[tokio::test]
async fn concurrent_writers_do_not_interleave() {
    let fs = Arc::new(new_fs());
    let root = fs.root();
    let file = fs.create_file(&root, "k");
    fs.open_file(&file, false).await;

    let first = {
        let fs = fs.clone();
        let file = file.clone();
        tokio::spawn(async move { fs.write(&file, b"foo").await })
    };
    let second = {
        let fs = fs.clone();
        let file = file.clone();
        tokio::spawn(async move { fs.write(&file, b"bar").await })
    };
    assert_eq!(first.await.unwrap(), 3);
    assert_eq!(second.await.unwrap(), 3);

    fs.flush(&file).await.unwrap();
    let stored = fs.gateway().get_string("k").await.unwrap();
    assert!(
        stored == b"foobar" || stored == b"barfoo",
        "unexpected interleaving: {stored:?}"
    );
}

#[tokio::test]
async fn inodes_are_stable_and_root_is_reserved() {
    let fs = new_fs();
    fs.gateway().put_string("a", "x");

    let root = fs.root();
    assert_eq!(root.ino, ROOT_INODE);

    let first = fs.lookup(&root, "a").await.unwrap().ino();
    let second = fs.lookup(&root, "a").await.unwrap().ino();
    assert_eq!(first, second);
    assert_ne!(first, ROOT_INODE);
}

#[tokio::test]
async fn reads_observe_external_mutation() {
    let fs = new_fs();
    fs.gateway().put_string("k", "before");

    let root = fs.root();
    let Node::File(file) = fs.lookup(&root, "k").await.unwrap() else {
        panic!("scalar keys map to files");
    };
    assert_eq!(fs.read_all(&file).await.unwrap(), b"before");

    // The key changes behind the filesystem's back; the next read must
    // see it.
    fs.gateway().put_string("k", "after");
    assert_eq!(fs.read_all(&file).await.unwrap(), b"after");

    // A type change to an unmaterializable kind surfaces unsupported.
    fs.gateway().put_other("k", "hash");
    assert_eq!(fs.read_all(&file).await.unwrap_err(), FsError::Unsupported);
}
