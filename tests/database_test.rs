//! Integration tests for the publish record store.

use site_companion::db::{
    completed_records, find_incomplete, get_publish_record, insert_publish_record,
    published_names, update_identifiers, Database, NewPublishRecord, Platform,
};
use tempfile::TempDir;

async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let db = Database::new(&db_path)
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

fn bare_record(platform: Platform, item_name: &str) -> NewPublishRecord {
    NewPublishRecord {
        platform,
        item_name: item_name.to_string(),
        post_url: None,
        version_id: None,
        post_id: None,
    }
}

#[tokio::test]
async fn insert_and_list_published_names() {
    let (db, _temp_dir) = setup_db().await;

    insert_publish_record(db.pool(), &bare_record(Platform::Pixelfed, "sunset"))
        .await
        .unwrap();
    insert_publish_record(db.pool(), &bare_record(Platform::Pixelfed, "harbor"))
        .await
        .unwrap();
    insert_publish_record(db.pool(), &bare_record(Platform::Bluesky, "sunset"))
        .await
        .unwrap();

    let names = published_names(db.pool(), Platform::Pixelfed).await.unwrap();
    assert_eq!(names.len(), 2);
    assert!(names.contains("sunset"));
    assert!(names.contains("harbor"));

    let bluesky = published_names(db.pool(), Platform::Bluesky).await.unwrap();
    assert_eq!(bluesky.len(), 1);
}

#[tokio::test]
async fn duplicate_insert_keeps_one_row_and_fills_gaps() {
    let (db, _temp_dir) = setup_db().await;

    insert_publish_record(db.pool(), &bare_record(Platform::Pixelfed, "sunset"))
        .await
        .unwrap();

    // A racing second publish of the same item must not duplicate the row,
    // and may only add identifiers the row was missing.
    let richer = NewPublishRecord {
        post_url: Some("https://pixelfed.example/p/1".to_string()),
        post_id: Some("1".to_string()),
        ..bare_record(Platform::Pixelfed, "sunset")
    };
    insert_publish_record(db.pool(), &richer).await.unwrap();

    let names = published_names(db.pool(), Platform::Pixelfed).await.unwrap();
    assert_eq!(names.len(), 1);

    let record = get_publish_record(db.pool(), "sunset", Platform::Pixelfed)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.post_url.as_deref(), Some("https://pixelfed.example/p/1"));
    assert_eq!(record.post_id.as_deref(), Some("1"));
}

#[tokio::test]
async fn incomplete_records_are_platform_specific() {
    let (db, _temp_dir) = setup_db().await;

    // Bluesky with post_url but no version_id: still incomplete.
    let partial_bluesky = NewPublishRecord {
        post_url: Some("at://did:plc:abc/app.bsky.feed.post/1".to_string()),
        ..bare_record(Platform::Bluesky, "sunset")
    };
    insert_publish_record(db.pool(), &partial_bluesky).await.unwrap();

    // Instagram with only post_id: complete.
    let complete_instagram = NewPublishRecord {
        post_id: Some("17900".to_string()),
        ..bare_record(Platform::Instagram, "sunset")
    };
    insert_publish_record(db.pool(), &complete_instagram).await.unwrap();

    let bluesky = find_incomplete(db.pool(), Platform::Bluesky).await.unwrap();
    assert_eq!(bluesky.len(), 1);
    assert_eq!(bluesky[0].item_name, "sunset");
    assert!(!bluesky[0].is_complete());

    let instagram = find_incomplete(db.pool(), Platform::Instagram).await.unwrap();
    assert!(instagram.is_empty());
}

#[tokio::test]
async fn update_identifiers_never_erases_with_null() {
    let (db, _temp_dir) = setup_db().await;

    let partial = NewPublishRecord {
        post_url: Some("at://did:plc:abc/app.bsky.feed.post/1".to_string()),
        ..bare_record(Platform::Bluesky, "sunset")
    };
    insert_publish_record(db.pool(), &partial).await.unwrap();

    // Reconciliation run that only learned the version.
    update_identifiers(
        db.pool(),
        "sunset",
        Platform::Bluesky,
        None,
        Some("bafyrei-1"),
        None,
    )
    .await
    .unwrap();

    let record = get_publish_record(db.pool(), "sunset", Platform::Bluesky)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        record.post_url.as_deref(),
        Some("at://did:plc:abc/app.bsky.feed.post/1")
    );
    assert_eq!(record.version_id.as_deref(), Some("bafyrei-1"));
    assert!(record.is_complete());

    // Running the same reconciliation again changes nothing.
    update_identifiers(
        db.pool(),
        "sunset",
        Platform::Bluesky,
        None,
        Some("bafyrei-1"),
        None,
    )
    .await
    .unwrap();

    let again = get_publish_record(db.pool(), "sunset", Platform::Bluesky)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.post_url, record.post_url);
    assert_eq!(again.version_id, record.version_id);
    assert_eq!(again.post_id, None);
}

#[tokio::test]
async fn completed_records_are_the_complement_of_incomplete() {
    let (db, _temp_dir) = setup_db().await;

    let complete = NewPublishRecord {
        post_url: Some("https://pixelfed.example/p/1".to_string()),
        post_id: Some("1".to_string()),
        ..bare_record(Platform::Pixelfed, "sunset")
    };
    insert_publish_record(db.pool(), &complete).await.unwrap();
    insert_publish_record(db.pool(), &bare_record(Platform::Pixelfed, "harbor"))
        .await
        .unwrap();

    let complete = completed_records(db.pool(), Platform::Pixelfed)
        .await
        .unwrap();
    assert_eq!(complete.len(), 1);
    assert_eq!(complete[0].item_name, "sunset");
    assert!(complete[0].is_complete());

    let incomplete = find_incomplete(db.pool(), Platform::Pixelfed).await.unwrap();
    assert_eq!(incomplete.len(), 1);
    assert_eq!(incomplete[0].item_name, "harbor");
}

#[tokio::test]
async fn completed_records_leave_the_backfill_queue() {
    let (db, _temp_dir) = setup_db().await;

    insert_publish_record(db.pool(), &bare_record(Platform::Pixelfed, "sunset"))
        .await
        .unwrap();
    assert_eq!(
        find_incomplete(db.pool(), Platform::Pixelfed)
            .await
            .unwrap()
            .len(),
        1
    );

    update_identifiers(
        db.pool(),
        "sunset",
        Platform::Pixelfed,
        Some("https://pixelfed.example/p/9"),
        None,
        Some("9"),
    )
    .await
    .unwrap();

    assert!(find_incomplete(db.pool(), Platform::Pixelfed)
        .await
        .unwrap()
        .is_empty());
}
