use std::convert::Infallible;
use std::io;
use std::sync::{Arc, Mutex};

use bucket_sync::config::{ManifestPolicy, SyncOptions};
use bucket_sync::contract::{
    FileRecord, ManifestStore, MockManifestStore, MockObjectStore, StoreError,
};
use bucket_sync::fingerprint::Fingerprint;
use bucket_sync::manifest::{JsonManifestStore, Manifest, ManifestError};
use bucket_sync::synchronise::{synchronise, SyncError, Synchroniser};
use futures::stream;
use tempfile::{tempdir, TempDir};

const A: &[u8] = b"contents of a";
const B: &[u8] = b"contents of b";
const C: &[u8] = b"contents of c";

fn options() -> SyncOptions {
    SyncOptions::new("assets", "site").expect("valid options")
}

fn manifest(entries: &[(&str, &[u8])]) -> Manifest {
    entries
        .iter()
        .map(|(path, bytes)| (*path, Fingerprint::of(bytes)))
        .collect()
}

/// A manifest store in a temp dir, pre-seeded with `entries` (if any).
fn seeded_store(entries: &[(&str, &[u8])]) -> (TempDir, JsonManifestStore) {
    let dir = tempdir().unwrap();
    let store = JsonManifestStore::new(dir.path().join(".assets.cache.json"));
    if !entries.is_empty() {
        store.save(&manifest(entries)).unwrap();
    }
    (dir, store)
}

fn files(records: Vec<FileRecord>) -> impl futures::Stream<Item = Result<FileRecord, Infallible>> {
    stream::iter(records.into_iter().map(Ok))
}

/// Object store mock that accepts every upload and records the keys.
fn recording_store() -> (MockObjectStore, Arc<Mutex<Vec<String>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorded = calls.clone();
    let mut store = MockObjectStore::new();
    store.expect_put().returning(move |key, _, _| {
        recorded.lock().unwrap().push(key.to_string());
        Ok(())
    });
    (store, calls)
}

#[tokio::test]
async fn unchanged_file_is_not_uploaded() {
    let (_dir, manifests) = seeded_store(&[("a.png", A)]);
    let mut store = MockObjectStore::new();
    store.expect_put().never();
    store.expect_delete_many().never();

    let report = synchronise(&store, &manifests, options(), files(vec![FileRecord::buffered("a.png", A)]))
        .await
        .unwrap();

    let counts = report.counts();
    assert_eq!((counts.new, counts.ignored, counts.replaced, counts.deleted), (0, 1, 0, 0));
    assert_eq!(manifests.load(), manifest(&[("a.png", A)]));
    assert!(report.is_success());
}

#[tokio::test]
async fn new_files_are_uploaded_under_the_root_dir() {
    let (_dir, manifests) = seeded_store(&[]);
    let (store, calls) = recording_store();

    let report = synchronise(
        &store,
        &manifests,
        options(),
        files(vec![
            FileRecord::buffered("a.png", A),
            FileRecord::buffered("b.png", B),
        ]),
    )
    .await
    .unwrap();

    assert_eq!(*calls.lock().unwrap(), vec!["site/a.png", "site/b.png"]);
    assert_eq!(report.new, vec!["a.png", "b.png"]);
    assert_eq!(report.uploaded, 2);
    assert_eq!(manifests.load(), manifest(&[("a.png", A), ("b.png", B)]));
}

#[tokio::test]
async fn replaced_file_is_uploaded_with_fresh_fingerprint() {
    let (_dir, manifests) = seeded_store(&[("a.png", A)]);
    let mut store = MockObjectStore::new();
    store
        .expect_put()
        .withf(|key, bytes, _| key == "site/a.png" && bytes == C)
        .times(1)
        .returning(|_, _, _| Ok(()));

    let report = synchronise(&store, &manifests, options(), files(vec![FileRecord::buffered("a.png", C)]))
        .await
        .unwrap();

    assert_eq!(report.replaced, vec!["a.png"]);
    assert_eq!(manifests.load(), manifest(&[("a.png", C)]));
}

#[tokio::test]
async fn stale_objects_are_deleted() {
    let (_dir, manifests) = seeded_store(&[("a.png", A), ("b.png", B)]);
    let mut store = MockObjectStore::new();
    store.expect_put().never();
    store
        .expect_delete_many()
        .withf(|keys, opts| keys.to_vec() == vec!["site/b.png".to_string()] && opts.quiet)
        .times(1)
        .returning(|_, _| Ok(()));

    let report = synchronise(&store, &manifests, options(), files(vec![FileRecord::buffered("a.png", A)]))
        .await
        .unwrap();

    assert_eq!(report.ignored, vec!["a.png"]);
    assert_eq!(report.deleted, vec!["b.png"]);
    assert_eq!(manifests.load(), manifest(&[("a.png", A)]));
}

#[tokio::test]
async fn no_clean_never_deletes() {
    let (_dir, manifests) = seeded_store(&[("a.png", A), ("b.png", B)]);
    let mut store = MockObjectStore::new();
    store.expect_put().never();
    store.expect_delete_many().never();

    let mut opts = options();
    opts.no_clean = true;
    let sync = Synchroniser::new(&store, &manifests, opts).unwrap();
    let report = sync.run(files(vec![FileRecord::buffered("a.png", A)])).await;

    assert!(report.deleted.is_empty());
    assert_eq!(report.retained, vec!["b.png"]);
    // The manifest is still replaced by what this run saw.
    assert_eq!(manifests.load(), manifest(&[("a.png", A)]));
}

#[tokio::test]
async fn force_resets_cache_and_uploads_everything() {
    let (_dir, manifests) = seeded_store(&[("a.png", A)]);
    let (store, calls) = recording_store();

    let mut opts = options();
    opts.force = true;
    let sync = Synchroniser::new(&store, &manifests, opts).unwrap();
    assert!(!manifests.path().exists(), "cache file removed before the run");

    let report = sync.run(files(vec![FileRecord::buffered("a.png", A)])).await;
    assert_eq!(*calls.lock().unwrap(), vec!["site/a.png"]);
    assert_eq!(report.new, vec!["a.png"]);
    assert_eq!(manifests.load(), manifest(&[("a.png", A)]));
}

#[tokio::test]
async fn force_uses_force_reset_instead_of_load() {
    let (store, _calls) = recording_store();
    let mut manifests = MockManifestStore::new();
    manifests.expect_load().never();
    manifests.expect_force_reset().times(1).returning(Manifest::new);
    manifests.expect_save().returning(|_| Ok(()));

    let mut opts = options();
    opts.force = true;
    synchronise(&store, &manifests, opts, files(vec![FileRecord::buffered("x.txt", A)]))
        .await
        .unwrap();
}

#[tokio::test]
async fn manifest_is_checkpointed_every_ten_uploads() {
    let (store, calls) = recording_store();
    let saved_sizes = Arc::new(Mutex::new(Vec::new()));
    let sizes = saved_sizes.clone();
    let mut manifests = MockManifestStore::new();
    manifests.expect_load().returning(Manifest::new);
    manifests.expect_save().times(3).returning(move |m: &Manifest| {
        sizes.lock().unwrap().push(m.len());
        Ok(())
    });

    let records = (0..25)
        .map(|i| FileRecord::buffered(format!("f{i:02}.txt"), format!("file {i}")))
        .collect();
    let report = synchronise(&store, &manifests, options(), files(records))
        .await
        .unwrap();

    assert_eq!(calls.lock().unwrap().len(), 25);
    assert_eq!(report.uploaded, 25);
    // Two checkpoints, then the final save.
    assert_eq!(*saved_sizes.lock().unwrap(), vec![10, 20, 25]);
}

#[tokio::test]
async fn failed_upload_does_not_stop_the_run() {
    let (_dir, manifests) = seeded_store(&[("b.png", A)]);
    let mut store = MockObjectStore::new();
    store.expect_put().returning(|key, _, _| {
        if key.ends_with("b.png") || key.ends_with("n.png") {
            Err::<(), StoreError>("503 Service Unavailable".into())
        } else {
            Ok(())
        }
    });
    store.expect_delete_many().never();

    let report = synchronise(
        &store,
        &manifests,
        options(),
        files(vec![
            FileRecord::buffered("b.png", B),
            FileRecord::buffered("n.png", C),
            FileRecord::buffered("c.png", C),
        ]),
    )
    .await
    .unwrap();

    let failed: Vec<&str> = report.failed.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(failed, vec!["b.png", "n.png"]);
    assert!(!report.is_success());
    // The failed replacement keeps its previous fingerprint and is retried next time;
    // the failed new file stays unknown.
    assert_eq!(manifests.load(), manifest(&[("b.png", A), ("c.png", C)]));
    assert!(report.deleted.is_empty());
}

#[tokio::test]
async fn optimistic_policy_records_failed_uploads() {
    let (_dir, manifests) = seeded_store(&[]);
    let mut store = MockObjectStore::new();
    store
        .expect_put()
        .returning(|_, _, _| Err::<(), StoreError>("connection reset".into()));

    let mut opts = options();
    opts.manifest_policy = ManifestPolicy::Optimistic;
    let mut sync = Synchroniser::new(&store, &manifests, opts).unwrap();
    let err = sync
        .process(FileRecord::buffered("a.png", A))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Upload { ref key, .. } if key == "site/a.png"));

    let report = sync.finish().await;
    assert_eq!(report.failed.len(), 1);
    assert_eq!(manifests.load(), manifest(&[("a.png", A)]));
}

#[tokio::test]
async fn upstream_error_still_finishes_with_partial_manifest() {
    let (_dir, manifests) = seeded_store(&[("a.png", A), ("old.png", B)]);
    let mut store = MockObjectStore::new();
    store
        .expect_put()
        .withf(|key, _, _| key == "site/n.png")
        .times(1)
        .returning(|_, _, _| Ok(()));
    store
        .expect_delete_many()
        .withf(|keys, _| keys.to_vec() == vec!["site/old.png".to_string()])
        .times(1)
        .returning(|_, _| Ok(()));

    let items: Vec<Result<FileRecord, String>> = vec![
        Ok(FileRecord::buffered("a.png", A)),
        Ok(FileRecord::buffered("n.png", C)),
        Err("disk went away".to_string()),
        Ok(FileRecord::buffered("never.png", C)),
    ];
    let report = synchronise(&store, &manifests, options(), stream::iter(items))
        .await
        .unwrap();

    assert_eq!(report.interrupted.as_deref(), Some("disk went away"));
    assert_eq!(manifests.load(), manifest(&[("a.png", A), ("n.png", C)]));
}

#[tokio::test]
async fn cleanup_failure_is_reported_after_manifest_save() {
    let (_dir, manifests) = seeded_store(&[("gone.png", A)]);
    let (mut store, _calls) = recording_store();
    store
        .expect_delete_many()
        .times(1)
        .returning(|_, _| Err::<(), StoreError>("access denied".into()));

    let report = synchronise(&store, &manifests, options(), files(vec![FileRecord::buffered("a.png", A)]))
        .await
        .unwrap();

    assert!(report.cleanup_error.as_deref().unwrap().contains("access denied"));
    assert_eq!(manifests.load(), manifest(&[("a.png", A)]));
}

#[tokio::test]
async fn streamed_and_empty_records_do_not_stop_the_run() {
    let (_dir, manifests) = seeded_store(&[]);
    let (store, calls) = recording_store();

    let report = synchronise(
        &store,
        &manifests,
        options(),
        files(vec![
            FileRecord::empty("img"),
            FileRecord::streamed("video.mp4"),
            FileRecord::buffered("img/a.png", A),
        ]),
    )
    .await
    .unwrap();

    assert_eq!(*calls.lock().unwrap(), vec!["site/img/a.png"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].path, "video.mp4");
    assert_eq!(manifests.load(), manifest(&[("img/a.png", A)]));
}

#[tokio::test]
async fn simulate_touches_neither_bucket_nor_cache() {
    let (_dir, manifests) = seeded_store(&[("a.png", A), ("gone.png", B)]);
    let mut store = MockObjectStore::new();
    store.expect_put().never();
    store.expect_delete_many().never();

    let mut opts = options();
    opts.simulate = true;
    let report = synchronise(
        &store,
        &manifests,
        opts,
        files(vec![
            FileRecord::buffered("a.png", C),
            FileRecord::buffered("n.png", A),
        ]),
    )
    .await
    .unwrap();

    assert!(report.simulated);
    assert_eq!(report.replaced, vec!["a.png"]);
    assert_eq!(report.new, vec!["n.png"]);
    assert_eq!(report.deleted, vec!["gone.png"]);
    assert_eq!(manifests.load(), manifest(&[("a.png", A), ("gone.png", B)]));
}

#[tokio::test]
async fn default_and_per_file_headers_reach_the_store() {
    let (_dir, manifests) = seeded_store(&[]);
    let mut store = MockObjectStore::new();
    store
        .expect_put()
        .withf(|_, _, opts| {
            opts.headers.get("Cache-Control").map(String::as_str) == Some("no-cache")
                && opts.headers.get("x-meta-team").map(String::as_str) == Some("web")
                && opts.headers.get("Content-Type").map(String::as_str)
                    == Some("text/html; charset=utf-8")
                && opts.headers.get("Content-Length").map(String::as_str) == Some("7")
        })
        .times(1)
        .returning(|_, _, _| Ok(()));

    let mut opts = options();
    opts.headers.insert("Cache-Control".into(), "max-age=60".into());
    opts.headers.insert("x-meta-team".into(), "web".into());
    let record = FileRecord::buffered("index.html", "<html/>").with_header("Cache-Control", "no-cache");

    synchronise(&store, &manifests, opts, files(vec![record]))
        .await
        .unwrap();
}

#[tokio::test]
async fn missing_bucket_fails_before_any_io() {
    let store = MockObjectStore::new();
    let mut manifests = MockManifestStore::new();
    manifests.expect_load().never();
    manifests.expect_save().never();

    let mut opts = options();
    opts.bucket = String::new();
    let result = synchronise(&store, &manifests, opts, files(vec![])).await;
    assert!(matches!(result, Err(SyncError::Configuration(_))));
}

#[tokio::test]
async fn second_run_skips_everything_the_first_published() {
    let (_dir, manifests) = seeded_store(&[]);
    let (store, calls) = recording_store();
    let records = || {
        files(vec![
            FileRecord::buffered("a.png", A),
            FileRecord::buffered("b/c.css", B),
        ])
    };

    synchronise(&store, &manifests, options(), records()).await.unwrap();
    let second = synchronise(&store, &manifests, options(), records()).await.unwrap();

    assert_eq!(calls.lock().unwrap().len(), 2);
    assert_eq!(second.ignored, vec!["a.png", "b/c.css"]);
    assert_eq!(second.uploaded, 0);
}

#[tokio::test]
async fn reverted_duplicate_path_is_uploaded_again() {
    let (_dir, manifests) = seeded_store(&[("a.png", A)]);
    let uploads = Arc::new(Mutex::new(Vec::new()));
    let recorded = uploads.clone();
    let mut store = MockObjectStore::new();
    store.expect_put().returning(move |key, bytes, _| {
        recorded.lock().unwrap().push((key.to_string(), bytes.to_vec()));
        Ok(())
    });
    store.expect_delete_many().never();

    synchronise(
        &store,
        &manifests,
        options(),
        files(vec![
            FileRecord::buffered("a.png", B),
            FileRecord::buffered("a.png", A),
        ]),
    )
    .await
    .unwrap();

    let uploads = uploads.lock().unwrap();
    assert_eq!(
        *uploads,
        vec![
            ("site/a.png".to_string(), B.to_vec()),
            ("site/a.png".to_string(), A.to_vec()),
        ]
    );
    // The manifest matches the last bytes the bucket received.
    let (_, last) = uploads.last().unwrap();
    assert_eq!(manifests.load().get("a.png"), Some(&Fingerprint::of(last)));
}

#[tokio::test]
async fn force_with_simulate_keeps_the_cache_file() {
    let (_dir, manifests) = seeded_store(&[("a.png", A)]);
    let mut store = MockObjectStore::new();
    store.expect_put().never();
    store.expect_delete_many().never();

    let mut opts = options();
    opts.force = true;
    opts.simulate = true;
    let report = synchronise(&store, &manifests, opts, files(vec![FileRecord::buffered("a.png", A)]))
        .await
        .unwrap();

    assert!(manifests.path().exists());
    assert_eq!(manifests.load(), manifest(&[("a.png", A)]));
    assert!(report.simulated);
    assert_eq!(report.new, vec!["a.png"]);
}

#[tokio::test]
async fn failed_checkpoint_does_not_stop_the_run() {
    let (store, calls) = recording_store();
    let attempts = Arc::new(Mutex::new(0usize));
    let seen = attempts.clone();
    let mut manifests = MockManifestStore::new();
    manifests.expect_load().returning(Manifest::new);
    manifests.expect_save().returning(move |_| {
        let mut n = seen.lock().unwrap();
        *n += 1;
        if *n == 1 {
            Err(ManifestError::Io(io::Error::other("disk full")))
        } else {
            Ok(())
        }
    });

    let records = (0..15)
        .map(|i| FileRecord::buffered(format!("f{i:02}.txt"), format!("file {i}")))
        .collect();
    let report = synchronise(&store, &manifests, options(), files(records))
        .await
        .unwrap();

    assert_eq!(calls.lock().unwrap().len(), 15);
    assert_eq!(report.uploaded, 15);
    // The failed checkpoint at ten uploads, then the final save.
    assert_eq!(*attempts.lock().unwrap(), 2);
    assert!(report.manifest_error.is_none());
}

#[tokio::test]
async fn failed_final_save_is_reported_and_cleanup_still_runs() {
    let (mut store, _calls) = recording_store();
    store
        .expect_delete_many()
        .withf(|keys, _| keys.to_vec() == vec!["site/gone.png".to_string()])
        .times(1)
        .returning(|_, _| Ok(()));
    let mut manifests = MockManifestStore::new();
    manifests
        .expect_load()
        .returning(|| manifest(&[("gone.png", B)]));
    manifests
        .expect_save()
        .times(1)
        .returning(|_| Err(ManifestError::Io(io::Error::other("read-only file system"))));

    let report = synchronise(&store, &manifests, options(), files(vec![FileRecord::buffered("a.png", A)]))
        .await
        .unwrap();

    assert!(report
        .manifest_error
        .as_deref()
        .unwrap()
        .contains("read-only file system"));
    assert_eq!(report.deleted, vec!["gone.png"]);
    assert!(!report.is_success());
}
