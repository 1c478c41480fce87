//! End-to-end like-count fetching against mock platform servers.

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use site_companion::config::Config;
use site_companion::db::{
    get_interaction, insert_publish_record, Database, NewPublishRecord, Platform,
};
use site_companion::interactions;

async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db = Database::new(&temp_dir.path().join("test.sqlite"))
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

fn pixelfed_config(server_uri: &str) -> Config {
    let raw = format!(
        r#"
        [[sources]]
        name = "gallery"
        feed_url = "{server_uri}/feed.xml"

        [[targets]]
        name = "pixelfed-main"
        platform = "pixelfed"
        instance = "{server_uri}"
        access_token = "pat-123"

        [[connections]]
        name = "gallery-to-pixelfed"
        source = "gallery"
        target = "pixelfed-main"
        caption = "New photo is online!"
    "#
    );
    let config: Config = toml::from_str(&raw).expect("Failed to parse config");
    config.validate().expect("Config invalid");
    config
}

async fn insert_record(db: &Database, name: &str, post_id: Option<&str>) {
    insert_publish_record(
        db.pool(),
        &NewPublishRecord {
            platform: Platform::Pixelfed,
            item_name: name.to_string(),
            post_url: post_id.map(|id| format!("https://pixelfed.example/p/{id}")),
            version_id: None,
            post_id: post_id.map(ToString::to_string),
        },
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn like_counts_are_fetched_and_stored_for_complete_records() {
    let server = MockServer::start().await;
    let (db, _temp_dir) = setup_db().await;

    insert_record(&db, "sunset", Some("7")).await;
    insert_record(&db, "harbor", Some("8")).await;
    // Incomplete record: no identifiers, nothing to ask the platform about.
    insert_record(&db, "dunes", None).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/statuses/7/favourited_by"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "a1", "username": "alice" },
            { "id": "b2", "username": "bob" },
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/statuses/8/favourited_by"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let config = pixelfed_config(&server.uri());
    let client = reqwest::Client::new();

    interactions::run_interactions(&client, &db, &config).await;

    let sunset = get_interaction(db.pool(), "sunset", Platform::Pixelfed)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sunset.like_count, 2);

    let harbor = get_interaction(db.pool(), "harbor", Platform::Pixelfed)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(harbor.like_count, 0);

    assert!(get_interaction(db.pool(), "dunes", Platform::Pixelfed)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn repeated_passes_replace_the_stored_count() {
    let server = MockServer::start().await;
    let (db, _temp_dir) = setup_db().await;

    insert_record(&db, "sunset", Some("7")).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/statuses/7/favourited_by"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "a1" }])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/statuses/7/favourited_by"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "a1" }, { "id": "b2" }, { "id": "c3" },
        ])))
        .mount(&server)
        .await;

    let config = pixelfed_config(&server.uri());
    let client = reqwest::Client::new();

    interactions::run_interactions(&client, &db, &config).await;
    let first = get_interaction(db.pool(), "sunset", Platform::Pixelfed)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.like_count, 1);

    interactions::run_interactions(&client, &db, &config).await;
    let second = get_interaction(db.pool(), "sunset", Platform::Pixelfed)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.like_count, 3);
}

#[tokio::test]
async fn rate_limited_like_fetch_is_retried() {
    let server = MockServer::start().await;
    let (db, _temp_dir) = setup_db().await;

    insert_record(&db, "sunset", Some("7")).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/statuses/7/favourited_by"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/statuses/7/favourited_by"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "a1" }])))
        .mount(&server)
        .await;

    let config = pixelfed_config(&server.uri());
    let client = reqwest::Client::new();

    interactions::run_interactions(&client, &db, &config).await;

    let sunset = get_interaction(db.pool(), "sunset", Platform::Pixelfed)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sunset.like_count, 1);

    let calls = server.received_requests().await.unwrap().len();
    assert_eq!(calls, 2);
}

#[tokio::test]
async fn instagram_like_counts_come_from_the_media_field() {
    let server = MockServer::start().await;
    let (db, _temp_dir) = setup_db().await;

    insert_publish_record(
        db.pool(),
        &NewPublishRecord {
            platform: Platform::Instagram,
            item_name: "sunset".to_string(),
            post_url: None,
            version_id: None,
            post_id: Some("17900".to_string()),
        },
    )
    .await
    .unwrap();

    Mock::given(method("GET"))
        .and(path("/17900"))
        .and(query_param("fields", "like_count"))
        .and(query_param("access_token", "graph-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "17900",
            "like_count": 12,
        })))
        .mount(&server)
        .await;

    let raw = format!(
        r#"
        [[sources]]
        name = "gallery"
        feed_url = "{0}/feed.xml"

        [[targets]]
        name = "insta-main"
        platform = "instagram"
        instance = "{0}"
        access_token = "graph-token"
        account_id = "acc9"

        [[connections]]
        name = "gallery-to-insta"
        source = "gallery"
        target = "insta-main"
        caption = "New photo is online!"
    "#,
        server.uri()
    );
    let config: Config = toml::from_str(&raw).unwrap();
    config.validate().unwrap();

    let client = reqwest::Client::new();
    interactions::run_interactions(&client, &db, &config).await;

    let sunset = get_interaction(db.pool(), "sunset", Platform::Instagram)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sunset.like_count, 12);
}
