use loggit_sync::{HttpRemote, RemoteStore, SyncError};
use loggit_types::{EventDocument, RevisionHistory};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn remote_for(server: &MockServer) -> HttpRemote {
    HttpRemote::new(&format!("{}/loggit", server.uri())).unwrap()
}

#[tokio::test]
async fn ping_creates_a_missing_database() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loggit"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/loggit"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    remote_for(&server).ping().await.unwrap();
}

#[tokio::test]
async fn credentials_travel_as_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loggit"))
        .and(header("authorization", "Basic YWxpY2U6c2VjcmV0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"db_name": "loggit"})))
        .expect(1)
        .mount(&server)
        .await;

    let locator = format!("http://alice:secret@{}/loggit", server.address());
    HttpRemote::new(&locator).unwrap().ping().await.unwrap();
}

#[tokio::test]
async fn server_errors_count_as_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loggit"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = remote_for(&server).ping().await.unwrap_err();
    assert!(matches!(err, SyncError::Unavailable(_)));
}

#[tokio::test]
async fn pull_reads_the_changes_feed_with_histories() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loggit/_changes"))
        .and(query_param("since", "0"))
        .and(query_param("limit", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"seq": "1-abc", "id": "e1", "changes": [{"rev": "2-aa"}]},
                {"seq": "2-abc", "id": "e2", "deleted": true, "changes": [{"rev": "2-bb"}]},
                {"seq": "3-abc", "id": "_design/app", "changes": [{"rev": "1-dd"}]}
            ],
            "last_seq": "3-abc",
            "pending": 3
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/loggit/_bulk_get"))
        .and(query_param("revs", "true"))
        .and(body_partial_json(json!({
            "docs": [{"id": "e1", "rev": "2-aa"}, {"id": "e2", "rev": "2-bb"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"id": "e1", "docs": [{"ok": {
                    "_id": "e1", "_rev": "2-aa", "name": "Run", "date": "2024-03-01",
                    "_revisions": {"start": 2, "ids": ["aa", "11"]}
                }}]},
                {"id": "e2", "docs": [{"ok": {
                    "_id": "e2", "_rev": "2-bb", "_deleted": true,
                    "_revisions": {"start": 2, "ids": ["bb", "22"]}
                }}]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let changes = remote_for(&server).pull("0", 3).await.unwrap();
    assert_eq!(changes.last_seq, "3-abc");
    assert!(changes.pending);
    assert_eq!(changes.docs.len(), 2);
    assert_eq!(changes.docs[0].name, "Run");
    assert!(changes.docs[0]
        .history()
        .unwrap()
        .contains(&"1-11".parse().unwrap()));
    assert!(changes.docs[1].deleted);
    assert_eq!(changes.docs[1].rev, "2-bb");
}

#[tokio::test]
async fn push_replays_revisions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/loggit/_bulk_docs"))
        .and(body_partial_json(json!({
            "new_edits": false,
            "docs": [{
                "_id": "e1", "_rev": "3-cc", "name": "Run", "date": "2024-03-01",
                "_revisions": {"start": 3, "ids": ["cc", "bb", "aa"]}
            }]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let doc = EventDocument {
        id: "e1".to_string(),
        rev: "3-cc".to_string(),
        name: "Run".to_string(),
        date: "2024-03-01".to_string(),
        deleted: false,
        revisions: Some(RevisionHistory {
            start: 3,
            ids: vec!["cc".to_string(), "bb".to_string(), "aa".to_string()],
        }),
    };
    let written = remote_for(&server).push(&[doc]).await.unwrap();
    assert_eq!(written, 1);
}

#[tokio::test]
async fn erase_recreates_the_database() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/loggit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/loggit"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    remote_for(&server).erase().await.unwrap();
}
