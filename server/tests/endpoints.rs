//! Integration tests against the `relPath`-query-parameter wire contract
//! (spec §6). Each test spins up its own server bound to an ephemeral
//! port over a fresh temp directory, matching the teacher's style of
//! driving the router with a real `reqwest::Client` rather than mocking
//! Axum's `Router`.

use std::net::SocketAddr;

use reqwest::{Client, StatusCode};
use remotefs_server::{build_router, state::AppState};

// Each test spawns its own server bound to an ephemeral port over a
// fresh temp directory, driving it with a real `reqwest::Client` the
// same way the teacher's endpoint tests did.
async fn spawn_server() -> (String, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr: SocketAddr = listener.local_addr().expect("local_addr");

    let state = AppState::new(dir.path().to_path_buf());
    let app = build_router(state);

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    (format!("http://{addr}"), dir)
}

#[tokio::test]
async fn health_check() {
    let (base, _dir) = spawn_server().await;
    let resp = reqwest::get(format!("{base}/health")).await.expect("request");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn write_then_read_roundtrip() {
    let (base, _dir) = spawn_server().await;
    let client = Client::new();

    let put_resp = client
        .put(format!("{base}/files?relPath=./hello.txt&offset=0"))
        .body("hello world")
        .send()
        .await
        .expect("put");
    assert_eq!(put_resp.status(), StatusCode::OK);

    let get_resp = client
        .get(format!("{base}/files?relPath=./hello.txt"))
        .send()
        .await
        .expect("get");
    assert_eq!(get_resp.status(), StatusCode::OK);
    let body = get_resp.text().await.expect("body");
    assert_eq!(body, "hello world");
}

#[tokio::test]
async fn range_read_returns_partial_content() {
    let (base, _dir) = spawn_server().await;
    let client = Client::new();

    client
        .put(format!("{base}/files?relPath=./range.bin&offset=0"))
        .body("0123456789")
        .send()
        .await
        .expect("put");

    let resp = client
        .get(format!("{base}/files?relPath=./range.bin"))
        .header("Range", "bytes=2-4")
        .send()
        .await
        .expect("get");
    assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
    let content_range = resp.headers().get("content-range").unwrap().to_str().unwrap().to_string();
    assert_eq!(content_range, "bytes 2-4/10");
    let body = resp.text().await.expect("body");
    assert_eq!(body, "234");
}

#[tokio::test]
async fn out_of_range_start_is_unsatisfiable_not_full_body() {
    let (base, _dir) = spawn_server().await;
    let client = Client::new();

    client
        .put(format!("{base}/files?relPath=./range2.bin&offset=0"))
        .body("0123456789")
        .send()
        .await
        .expect("put");

    let resp = client
        .get(format!("{base}/files?relPath=./range2.bin"))
        .header("Range", "bytes=20-30")
        .send()
        .await
        .expect("get");
    assert_eq!(resp.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    let content_range = resp.headers().get("content-range").unwrap().to_str().unwrap().to_string();
    assert_eq!(content_range, "bytes */10");
}

#[tokio::test]
async fn offset_write_overlays_without_truncating() {
    let (base, _dir) = spawn_server().await;
    let client = Client::new();

    client
        .put(format!("{base}/files?relPath=./overlay.bin&offset=0"))
        .body("aaaaaaaaaa")
        .send()
        .await
        .expect("put");

    client
        .put(format!("{base}/files?relPath=./overlay.bin&offset=2"))
        .body("bb")
        .send()
        .await
        .expect("put");

    let body = client
        .get(format!("{base}/files?relPath=./overlay.bin"))
        .send()
        .await
        .expect("get")
        .text()
        .await
        .expect("body");
    assert_eq!(body, "aabbaaaaaa");
}

#[tokio::test]
async fn mkdir_then_list() {
    let (base, _dir) = spawn_server().await;
    let client = Client::new();

    let resp = client.post(format!("{base}/mkdir?relPath=./sub")).send().await.expect("mkdir");
    assert_eq!(resp.status(), StatusCode::OK);

    let conflict = client.post(format!("{base}/mkdir?relPath=./sub")).send().await.expect("mkdir again");
    assert_eq!(conflict.status(), StatusCode::CONFLICT);

    client
        .put(format!("{base}/files?relPath=./sub/a.txt&offset=0"))
        .body("a")
        .send()
        .await
        .expect("put");

    let list_resp = client.get(format!("{base}/list?relPath=./sub")).send().await.expect("list");
    assert_eq!(list_resp.status(), StatusCode::OK);
    let rows: Vec<serde_json::Value> = list_resp.json().await.expect("json");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "a.txt");
}

#[tokio::test]
async fn delete_file_and_recursive_directory() {
    let (base, _dir) = spawn_server().await;
    let client = Client::new();

    client
        .put(format!("{base}/files?relPath=./gone.txt&offset=0"))
        .body("x")
        .send()
        .await
        .expect("put");
    let del = client.delete(format!("{base}/files?relPath=./gone.txt")).send().await.expect("delete");
    assert_eq!(del.status(), StatusCode::OK);

    client.post(format!("{base}/mkdir?relPath=./tree")).send().await.expect("mkdir");
    client
        .put(format!("{base}/files?relPath=./tree/inner.txt&offset=0"))
        .body("y")
        .send()
        .await
        .expect("put");
    let del_dir = client.delete(format!("{base}/files?relPath=./tree")).send().await.expect("delete dir");
    assert_eq!(del_dir.status(), StatusCode::OK);

    let missing = client.get(format!("{base}/files?relPath=./tree/inner.txt")).send().await.expect("get missing");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chmod_truncate_and_utimes() {
    let (base, _dir) = spawn_server().await;
    let client = Client::new();

    client
        .put(format!("{base}/files?relPath=./attrs.txt&offset=0"))
        .body("0123456789")
        .send()
        .await
        .expect("put");

    let chmod_resp = client
        .patch(format!("{base}/files/chmod?relPath=./attrs.txt&perm=600"))
        .send()
        .await
        .expect("chmod");
    assert_eq!(chmod_resp.status(), StatusCode::OK);

    let truncate_resp = client
        .patch(format!("{base}/files/truncate?relPath=./attrs.txt&size=4"))
        .send()
        .await
        .expect("truncate");
    assert_eq!(truncate_resp.status(), StatusCode::OK);

    let utimes_resp = client
        .patch(format!("{base}/files/utimes?relPath=./attrs.txt&mtime=1000000"))
        .send()
        .await
        .expect("utimes");
    assert_eq!(utimes_resp.status(), StatusCode::OK);

    let meta = client
        .get(format!("{base}/list/updatedMetadata?relPath=./attrs.txt"))
        .send()
        .await
        .expect("metadata")
        .json::<serde_json::Value>()
        .await
        .expect("json");
    assert_eq!(meta["size"], 4);
    assert_eq!(meta["permissions"], "600");
    assert_eq!(meta["mtime"], 1_000_000);
}

#[tokio::test]
async fn rename_overwrites_existing_target() {
    let (base, _dir) = spawn_server().await;
    let client = Client::new();

    client
        .put(format!("{base}/files?relPath=./a.txt&offset=0"))
        .body("from a")
        .send()
        .await
        .expect("put a");
    client
        .put(format!("{base}/files?relPath=./b.txt&offset=0"))
        .body("from b")
        .send()
        .await
        .expect("put b");

    let resp = client
        .patch(format!("{base}/files/rename?oldRelPath=./a.txt&newRelPath=./b.txt"))
        .send()
        .await
        .expect("rename");
    assert_eq!(resp.status(), StatusCode::OK);

    let missing = client.get(format!("{base}/files?relPath=./a.txt")).send().await.expect("get a");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let body = client
        .get(format!("{base}/files?relPath=./b.txt"))
        .send()
        .await
        .expect("get b")
        .text()
        .await
        .expect("body");
    assert_eq!(body, "from a");
}

#[tokio::test]
async fn stats_reports_decimal_strings() {
    let (base, _dir) = spawn_server().await;
    let resp = reqwest::get(format!("{base}/stats")).await.expect("stats");
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.expect("json");
    for field in ["bsize", "blocks", "bfree", "bavail", "files", "ffree"] {
        let value = body[field].as_str().expect("decimal string");
        value.parse::<u64>().expect("parses as u64");
    }
}

#[tokio::test]
async fn not_found_on_missing_file() {
    let (base, _dir) = spawn_server().await;
    let resp = reqwest::get(format!("{base}/files?relPath=./nope.txt")).await.expect("get");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
