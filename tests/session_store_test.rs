//! 会话存储的集成测试
//!
//! 验证"每个 broker 只有一份会话文件、保存是整体替换、
//! 损坏文件按无缓存处理"这几条性质

use netchb_duty_runner::session::SessionStore;
use serde_json::json;
use tempfile::TempDir;

#[tokio::test]
async fn save_replaces_instead_of_appending() {
    let tmp = TempDir::new().unwrap();
    let store = SessionStore::new(tmp.path()).await.unwrap();

    store
        .save("HYX", json!([{"name": "sid", "value": "first"}]))
        .await
        .unwrap();
    store
        .save("HYX", json!([{"name": "sid", "value": "second"}]))
        .await
        .unwrap();

    // 磁盘上只有一个会话文件（没有历史版本、没有残留临时文件）
    let files: Vec<String> = std::fs::read_dir(tmp.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(files, vec!["broker_HYX.json".to_string()]);

    // 读回来是第二次的状态
    let session = store.load("HYX").await.unwrap().unwrap();
    assert_eq!(session.state_blob[0]["value"], "second");
}

#[tokio::test]
async fn missing_session_is_none() {
    let tmp = TempDir::new().unwrap();
    let store = SessionStore::new(tmp.path()).await.unwrap();
    assert!(store.load("HYX").await.unwrap().is_none());
    assert!(!store.has_session("HYX"));
}

#[tokio::test]
async fn corrupted_session_is_treated_as_absent() {
    let tmp = TempDir::new().unwrap();
    let store = SessionStore::new(tmp.path()).await.unwrap();

    std::fs::write(store.session_path("HYX"), "not json {{{").unwrap();
    assert!(store.load("HYX").await.unwrap().is_none());

    // 下一次成功保存会覆盖坏文件
    store.save("HYX", json!([])).await.unwrap();
    assert!(store.load("HYX").await.unwrap().is_some());
}

#[tokio::test]
async fn sessions_are_per_broker() {
    let tmp = TempDir::new().unwrap();
    let store = SessionStore::new(tmp.path()).await.unwrap();

    store.save("HYX", json!([{"b": "HYX"}])).await.unwrap();
    store.save("ACB", json!([{"b": "ACB"}])).await.unwrap();

    assert_eq!(
        store.load("HYX").await.unwrap().unwrap().state_blob[0]["b"],
        "HYX"
    );
    assert_eq!(
        store.load("ACB").await.unwrap().unwrap().state_blob[0]["b"],
        "ACB"
    );
}
