use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use camino::Utf8PathBuf;
use tempfile::tempdir;
use wharf_cli::commands;
use wharf_persistence::{target_key, HashCache};

/// In-process release store that remembers which blobs it has received.
#[derive(Default)]
struct StoreState {
    populate_keys: Mutex<Vec<Vec<String>>>,
    stored: Mutex<HashSet<String>>,
    uploads: Mutex<Vec<String>>,
}

async fn start_store() -> (SocketAddr, tokio::task::JoinHandle<()>, Arc<StoreState>) {
    let state = Arc::new(StoreState::default());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let upload_base = format!("http://{addr}/blobs");

    let populate_state = state.clone();
    let upload_state = state.clone();
    let app = Router::new()
        .route(
            "/v1/*rest",
            post(move |body: Bytes| {
                let state = populate_state.clone();
                let upload_base = upload_base.clone();
                async move {
                    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
                    let files = parsed["files"].as_object().unwrap();
                    let mut keys: Vec<String> = files.keys().cloned().collect();
                    keys.sort();
                    state.populate_keys.lock().unwrap().push(keys);

                    let stored = state.stored.lock().unwrap();
                    let mut missing: Vec<String> = files
                        .values()
                        .map(|h| h.as_str().unwrap().to_string())
                        .filter(|h| !stored.contains(h))
                        .collect::<HashSet<_>>()
                        .into_iter()
                        .collect();
                    missing.sort();
                    let response = serde_json::json!({
                        "uploadUrl": upload_base,
                        "uploadRequiredHashes": missing,
                    });
                    Body::from(response.to_string())
                }
            }),
        )
        .route(
            "/blobs/:hash",
            post(move |Path(hash): Path<String>| {
                let state = upload_state.clone();
                async move {
                    state.stored.lock().unwrap().insert(hash.clone());
                    state.uploads.lock().unwrap().push(hash);
                    StatusCode::OK
                }
            }),
        );

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, handle, state)
}

#[tokio::test]
async fn deploy_skips_hidden_files_and_moves_nothing_twice() {
    let (addr, _server, state) = start_store().await;

    let work_dir = tempdir().unwrap();
    let project_root = Utf8PathBuf::from_path_buf(work_dir.path().to_path_buf()).unwrap();
    let public = project_root.join("public");
    fs::create_dir_all(public.join("assets")).unwrap();
    fs::create_dir_all(public.join(".well-known")).unwrap();
    fs::write(public.join("index.html"), "<h1>hello</h1>").unwrap();
    fs::write(public.join("assets/app.js"), "console.log(42)").unwrap();
    fs::write(public.join(".env"), "SECRET=1").unwrap();
    fs::write(public.join(".well-known/probe"), "x").unwrap();

    // Phase 1: fresh deploy uploads every visible file.
    commands::cmd_deploy(
        project_root.clone(),
        "public".into(),
        "sites/demo/versions/e2e".into(),
        format!("http://{addr}/v1"),
        1000,
        9,
        false,
    )
    .await
    .unwrap();

    {
        let calls = state.populate_keys.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], ["/assets/app.js", "/index.html"]);
    }
    assert_eq!(state.uploads.lock().unwrap().len(), 2);

    let key = target_key(&project_root, &public);
    let cache = HashCache::load(&project_root, &key);
    assert_eq!(cache.len(), 2);

    // Phase 2: the store already has every blob, so nothing moves.
    commands::cmd_deploy(
        project_root.clone(),
        "public".into(),
        "sites/demo/versions/next".into(),
        format!("http://{addr}/v1"),
        1000,
        9,
        false,
    )
    .await
    .unwrap();

    assert_eq!(state.populate_keys.lock().unwrap().len(), 2);
    assert_eq!(state.uploads.lock().unwrap().len(), 2);
}
