//! 오케스트레이터 통합 테스트
//!
//! ## 테스트 시나리오
//! 1. 전체 설치: 마커 없음 → 전체 다운로드 → 마커 기록 → 실행
//! 2. 패치: 사이드카 + 패치 → 적용/검증 → 전체 빌드는 받지 않음
//! 3. 폴백: 사이드카 없음 / 적용 실패 → 전체 다운로드 한 번
//! 4. 실패 경로: 목록 조회 실패, 압축 해제 실패, 실행 실패
//! 5. `check`: 아무것도 바꾸지 않음
//!
//! 로컬 axum 서버를 객체 저장소로 사용하고 파일시스템은 tempdir로 격리합니다.

use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::routing::get;
use axum::Router;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

use crate::events::RecordingSink;
use crate::launcher::RecordingLauncher;
use crate::orchestrator::*;
use crate::{LauncherConfig, UpdaterError, Version, VersionStore};

// ═══════════════════════════════════════════════════════
// 테스트 유틸리티
// ═══════════════════════════════════════════════════════

const PRODUCT: &str = "ProjectX";
const PLATFORM: &str = "Plat";
const EXE: &str = "Game.exe";

fn build_key(v: &str) -> String {
    format!("{}/Versions/Build-{}-{}.zip", PRODUCT, PLATFORM, v)
}

fn patch_key(from: &str, to: &str) -> String {
    format!("{}/Patches/Patch-{}-{}-to-{}.bsdiff", PRODUCT, PLATFORM, from, to)
}

fn create_test_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip_writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, content) in files {
        zip_writer.start_file(*name, options).unwrap();
        zip_writer.write_all(content).unwrap();
    }
    zip_writer.finish().unwrap().into_inner()
}

fn exe_bytes(tag: &str) -> Vec<u8> {
    let mut v: Vec<u8> = (0..4096u32).map(|i| (i % 253) as u8).collect();
    v.extend_from_slice(tag.as_bytes());
    v
}

fn make_patch(old: &[u8], new: &[u8]) -> Vec<u8> {
    let mut patch = Vec::new();
    qbsdiff::Bsdiff::new(old, new).compare(std::io::Cursor::new(&mut patch)).unwrap();
    patch
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

struct MockStore {
    addr: SocketAddr,
    hits: Arc<Mutex<Vec<String>>>,
    _handle: tokio::task::JoinHandle<()>,
}

impl MockStore {
    fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }

    fn was_requested(&self, key: &str) -> bool {
        self.hits().iter().any(|h| h == key)
    }
}

/// 로컬 객체 저장소 시작
/// - `GET /list` → `{"objects":[{"name":..}]}` (`objects`의 키 목록)
/// - `GET /o/<key>` → 객체 바이트 또는 404
async fn start_mock_store(objects: HashMap<String, Vec<u8>>) -> MockStore {
    let objects = Arc::new(objects);
    let hits = Arc::new(Mutex::new(Vec::new()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = Router::new()
        .route("/list", get({
            let objects = objects.clone();
            move || async move {
                let names: Vec<_> = objects
                    .keys()
                    .map(|k| serde_json::json!({ "name": k, "size": objects[k].len() }))
                    .collect();
                axum::Json(serde_json::json!({ "objects": names }))
            }
        }))
        .route("/o/*key", get({
            let objects = objects.clone();
            let hits = hits.clone();
            move |axum::extract::Path(key): axum::extract::Path<String>| {
                let objects = objects.clone();
                let hits = hits.clone();
                async move {
                    hits.lock().unwrap().push(key.clone());
                    match objects.get(&key) {
                        Some(data) => (axum::http::StatusCode::OK, data.clone()),
                        None => (axum::http::StatusCode::NOT_FOUND, b"Not Found".to_vec()),
                    }
                }
            }
        }));

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    MockStore { addr, hits, _handle: handle }
}

fn test_config(addr: SocketAddr, install_dir: &Path) -> LauncherConfig {
    LauncherConfig {
        listing_url: format!("http://{}/list", addr),
        download_base_url: Some(format!("http://{}/o", addr)),
        product: PRODUCT.into(),
        platform: PLATFORM.into(),
        executable_name: EXE.into(),
        install_dir: Some(install_dir.to_string_lossy().into_owned()),
        min_executable_size: 64,
        progress_interval_ms: 0,
        request_timeout_secs: 5,
        ..Default::default()
    }
}

fn orchestrator(
    config: LauncherConfig,
) -> (UpdateOrchestrator, RecordingSink, RecordingLauncher) {
    let sink = RecordingSink::new();
    let launcher = RecordingLauncher::new();
    let orch = UpdateOrchestrator::new(config, Arc::new(sink.clone()), Arc::new(launcher.clone()))
        .unwrap();
    (orch, sink, launcher)
}

fn install_existing(dir: &Path, version: &str, exe: &[u8]) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(EXE), exe).unwrap();
    std::fs::write(dir.join("version.txt"), version).unwrap();
}

fn marker(dir: &Path) -> Option<Version> {
    VersionStore::new(dir.join("version.txt")).read().unwrap()
}

fn leftover_downloads(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|n| n.ends_with(".zip") || n.ends_with(".bsdiff") || n.starts_with('.'))
                .collect()
        })
        .unwrap_or_default()
}

// ═══════════════════════════════════════════════════════
// 테스트 1: 전체 설치
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_fresh_install_full_download() {
    let tmp = TempDir::new().unwrap();
    let install = tmp.path().join("install");
    let new_exe = exe_bytes("v2");

    let mut objects = HashMap::new();
    objects.insert(build_key("1.9.0"), create_test_zip(&[(EXE, b"old")]));
    objects.insert(
        build_key("2.0.0"),
        create_test_zip(&[(EXE, &new_exe), ("Game_Data/level0", b"lvl")]),
    );
    let store = start_mock_store(objects).await;

    let (mut orch, sink, launcher) = orchestrator(test_config(store.addr, &install));
    let outcome = orch.run_cycle().await;

    let summary = match outcome {
        CycleOutcome::Done(summary) => summary,
        CycleOutcome::Error { phase, error } => panic!("cycle failed in {}: {}", phase, error),
    };
    assert_eq!(summary.route, UpdateRoute::FullDownload);
    assert_eq!(summary.previous, None);
    assert_eq!(summary.version, Version::new(2, 0, 0));
    assert_eq!(orch.phase(), CyclePhase::Done);

    assert_eq!(marker(&install), Some(Version::new(2, 0, 0)));
    assert_eq!(std::fs::read(install.join(EXE)).unwrap(), new_exe);
    assert!(install.join("Game_Data/level0").exists());
    assert!(leftover_downloads(&install).is_empty(), "{:?}", leftover_downloads(&install));

    let progress = sink.progress_values();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{:?}", progress);
    assert_eq!(progress.last().copied(), Some(100));
    assert_eq!(sink.complete_count(), 1);
    assert_eq!(launcher.launched(), vec![install.join(EXE)]);

    let statuses = sink.statuses();
    assert_eq!(statuses.first().map(String::as_str), Some(MSG_STARTING_DOWNLOAD));
    assert_eq!(statuses.last().map(String::as_str), Some(MSG_LAUNCHED));
    println!("✓ Fresh install: 2.0.0 downloaded, extracted, committed and launched");
}

// ═══════════════════════════════════════════════════════
// 테스트 2: 패치 성공
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_patch_applied_without_full_download() {
    let tmp = TempDir::new().unwrap();
    let install = tmp.path().join("install");
    let old_exe = exe_bytes("v1.0.0");
    let new_exe = exe_bytes("v1.1.0 with more content");
    install_existing(&install, "1.0.0", &old_exe);

    let mut objects = HashMap::new();
    objects.insert(build_key("1.0.0"), create_test_zip(&[(EXE, &old_exe)]));
    objects.insert(build_key("1.1.0"), create_test_zip(&[(EXE, &new_exe)]));
    objects.insert(patch_key("1.0.0", "1.1.0"), make_patch(&old_exe, &new_exe));
    objects.insert(
        format!("{}.sha256", patch_key("1.0.0", "1.1.0")),
        format!("{}  {}\n", sha256_hex(&new_exe), EXE).into_bytes(),
    );
    let store = start_mock_store(objects).await;

    let (mut orch, sink, launcher) = orchestrator(test_config(store.addr, &install));
    let outcome = orch.run_cycle().await;

    match outcome {
        CycleOutcome::Done(summary) => {
            assert_eq!(summary.route, UpdateRoute::Patched);
            assert_eq!(summary.previous, Some(Version::new(1, 0, 0)));
        }
        CycleOutcome::Error { phase, error } => panic!("cycle failed in {}: {}", phase, error),
    }

    assert_eq!(std::fs::read(install.join(EXE)).unwrap(), new_exe);
    assert_eq!(marker(&install), Some(Version::new(1, 1, 0)));
    assert!(!store.was_requested(&build_key("1.1.0")), "full build must not be fetched");
    assert!(leftover_downloads(&install).is_empty(), "{:?}", leftover_downloads(&install));
    assert_eq!(sink.complete_count(), 1);
    assert!(sink.statuses().contains(&MSG_APPLYING_PATCH.to_string()));
    assert!(!sink.statuses().contains(&MSG_PATCH_FALLBACK.to_string()));
    assert_eq!(launcher.launched().len(), 1);
    println!("✓ Patch 1.0.0 → 1.1.0 applied in place");
}

// ═══════════════════════════════════════════════════════
// 테스트 3: 폴백
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_missing_sidecar_falls_back_once() {
    let tmp = TempDir::new().unwrap();
    let install = tmp.path().join("install");
    let old_exe = exe_bytes("v1");
    let new_exe = exe_bytes("v2");
    install_existing(&install, "1.0.0", &old_exe);

    let mut objects = HashMap::new();
    objects.insert(build_key("1.1.0"), create_test_zip(&[(EXE, &new_exe)]));
    objects.insert(patch_key("1.0.0", "1.1.0"), make_patch(&old_exe, &new_exe));
    let store = start_mock_store(objects).await;

    let (mut orch, sink, _launcher) = orchestrator(test_config(store.addr, &install));
    let outcome = orch.run_cycle().await;

    match outcome {
        CycleOutcome::Done(summary) => assert_eq!(summary.route, UpdateRoute::PatchFallback),
        CycleOutcome::Error { phase, error } => panic!("cycle failed in {}: {}", phase, error),
    }
    // 사이드카가 없으면 패치 자체는 내려받지 않음
    assert!(!store.was_requested(&patch_key("1.0.0", "1.1.0")));
    assert_eq!(
        sink.statuses().iter().filter(|s| s.as_str() == MSG_PATCH_FALLBACK).count(),
        1
    );
    assert_eq!(std::fs::read(install.join(EXE)).unwrap(), new_exe);
    assert_eq!(marker(&install), Some(Version::new(1, 1, 0)));
    assert_eq!(sink.complete_count(), 1);
}

#[tokio::test]
async fn test_too_small_installed_executable_falls_back() {
    let tmp = TempDir::new().unwrap();
    let install = tmp.path().join("install");
    let new_exe = exe_bytes("v2");
    install_existing(&install, "1.0.0", b"tiny");

    let mut objects = HashMap::new();
    objects.insert(build_key("1.1.0"), create_test_zip(&[(EXE, &new_exe)]));
    objects.insert(patch_key("1.0.0", "1.1.0"), make_patch(b"tiny", &new_exe));
    objects.insert(
        format!("{}.sha256", patch_key("1.0.0", "1.1.0")),
        sha256_hex(&new_exe).into_bytes(),
    );
    let store = start_mock_store(objects).await;

    let (mut orch, _sink, _launcher) = orchestrator(test_config(store.addr, &install));
    match orch.run_cycle().await {
        CycleOutcome::Done(summary) => assert_eq!(summary.route, UpdateRoute::PatchFallback),
        CycleOutcome::Error { phase, error } => panic!("cycle failed in {}: {}", phase, error),
    }
    assert_eq!(std::fs::read(install.join(EXE)).unwrap(), new_exe);
    assert!(leftover_downloads(&install).is_empty(), "{:?}", leftover_downloads(&install));
}

// ═══════════════════════════════════════════════════════
// 테스트 4: 실패 경로
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_empty_listing_is_resolution_error() {
    let tmp = TempDir::new().unwrap();
    let install = tmp.path().join("install");
    let mut objects = HashMap::new();
    objects.insert("unrelated/file.txt".to_string(), b"x".to_vec());
    let store = start_mock_store(objects).await;

    let (mut orch, sink, launcher) = orchestrator(test_config(store.addr, &install));
    match orch.run_cycle().await {
        CycleOutcome::Error { phase, error } => {
            assert_eq!(phase, CyclePhase::Resolving);
            assert!(matches!(error, UpdaterError::Resolution(_)));
        }
        CycleOutcome::Done(_) => panic!("cycle should fail"),
    }
    assert_eq!(orch.phase(), CyclePhase::Error);
    assert!(launcher.launched().is_empty());
    assert!(sink.statuses().last().unwrap().starts_with(MSG_ERROR));
    assert!(sink.progress_values().is_empty());
}

#[tokio::test]
async fn test_unreachable_listing_is_resolution_error() {
    let tmp = TempDir::new().unwrap();
    // 바인드 후 바로 닫은 포트
    let addr = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap()
    };
    let (mut orch, _sink, launcher) = orchestrator(test_config(addr, tmp.path()));
    assert!(matches!(
        orch.run_cycle().await,
        CycleOutcome::Error { error: UpdaterError::Resolution(_), .. }
    ));
    assert!(launcher.launched().is_empty());
}

#[tokio::test]
async fn test_check_failure_leaves_error_phase() {
    let tmp = TempDir::new().unwrap();
    let store = start_mock_store(HashMap::new()).await;

    let (mut orch, sink, launcher) = orchestrator(test_config(store.addr, tmp.path()));
    assert!(matches!(orch.check().await, Err(UpdaterError::Resolution(_))));
    assert_eq!(orch.phase(), CyclePhase::Error);
    assert!(sink.events().is_empty());
    assert!(launcher.launched().is_empty());
}

#[tokio::test]
async fn test_archive_without_executable_is_kept() {
    let tmp = TempDir::new().unwrap();
    let install = tmp.path().join("install");
    let mut objects = HashMap::new();
    objects.insert(build_key("2.0.0"), create_test_zip(&[("readme.txt", b"hi")]));
    let store = start_mock_store(objects).await;

    let (mut orch, sink, launcher) = orchestrator(test_config(store.addr, &install));
    match orch.run_cycle().await {
        CycleOutcome::Error { phase, error } => {
            assert_eq!(phase, CyclePhase::FullDownload);
            assert!(matches!(error, UpdaterError::Extraction { .. }));
        }
        CycleOutcome::Done(_) => panic!("cycle should fail"),
    }
    assert!(install.join("Build-Plat-2.0.0.zip").exists(), "archive is retained");
    assert_eq!(marker(&install), None);
    assert_eq!(sink.complete_count(), 0);
    assert!(launcher.launched().is_empty());
}

#[tokio::test]
async fn test_missing_build_object_is_transfer_error() {
    let tmp = TempDir::new().unwrap();
    let install = tmp.path().join("install");
    let mut objects = HashMap::new();
    objects.insert(build_key("2.0.0"), create_test_zip(&[(EXE, b"x")]));
    let store = start_mock_store(objects).await;

    // 목록에는 있지만 다운로드 기준 URL에는 객체가 없음
    let mut config = test_config(store.addr, &install);
    config.download_base_url = Some(format!("http://{}/missing", store.addr));

    let (mut orch, sink, _launcher) = orchestrator(config);
    match orch.run_cycle().await {
        CycleOutcome::Error { error: UpdaterError::Transfer { reason, .. }, .. } => {
            assert_eq!(reason, crate::error::TransferReason::HttpStatus(404));
        }
        other => panic!("expected transfer error, got {:?}", other),
    }
    assert!(leftover_downloads(&install).is_empty());
    assert!(sink
        .statuses()
        .last()
        .unwrap()
        .contains("The requested build was not found"));
}

#[tokio::test]
async fn test_corrupt_marker_is_treated_as_fresh_install() {
    let tmp = TempDir::new().unwrap();
    let install = tmp.path().join("install");
    install_existing(&install, "garbage!", &exe_bytes("old"));
    let new_exe = exe_bytes("v2");

    let mut objects = HashMap::new();
    objects.insert(build_key("2.0.0"), create_test_zip(&[(EXE, &new_exe)]));
    let store = start_mock_store(objects).await;

    let (mut orch, _sink, _launcher) = orchestrator(test_config(store.addr, &install));
    match orch.run_cycle().await {
        CycleOutcome::Done(summary) => {
            assert_eq!(summary.route, UpdateRoute::FullDownload);
            assert_eq!(summary.previous, None);
        }
        CycleOutcome::Error { phase, error } => panic!("cycle failed in {}: {}", phase, error),
    }
    assert_eq!(marker(&install), Some(Version::new(2, 0, 0)));
}

#[tokio::test]
async fn test_launch_failure_is_terminal() {
    let tmp = TempDir::new().unwrap();
    let install = tmp.path().join("install");
    install_existing(&install, "1.0.0", &exe_bytes("v1"));

    let mut objects = HashMap::new();
    objects.insert(build_key("1.0.0"), create_test_zip(&[(EXE, b"x")]));
    let store = start_mock_store(objects).await;

    let sink = RecordingSink::new();
    let mut orch = UpdateOrchestrator::new(
        test_config(store.addr, &install),
        Arc::new(sink.clone()),
        Arc::new(RecordingLauncher::failing()),
    )
    .unwrap();

    match orch.run_cycle().await {
        CycleOutcome::Error { phase, error } => {
            assert_eq!(phase, CyclePhase::Launching);
            assert!(matches!(error, UpdaterError::Launch { .. }));
        }
        CycleOutcome::Done(_) => panic!("launch failure should end the cycle"),
    }
    assert_eq!(
        sink.statuses().last().map(String::as_str),
        Some("Error occurred: Failed to start game.")
    );
}

// ═══════════════════════════════════════════════════════
// 테스트 5: check
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_check_has_no_side_effects() {
    let tmp = TempDir::new().unwrap();
    let install = tmp.path().join("install");
    install_existing(&install, "1.0.0", &exe_bytes("v1"));

    let mut objects = HashMap::new();
    objects.insert(build_key("1.2.0"), create_test_zip(&[(EXE, b"x")]));
    let store = start_mock_store(objects).await;

    let (mut orch, sink, launcher) = orchestrator(test_config(store.addr, &install));
    let report = orch.check().await.unwrap();

    assert_eq!(report.installed, Some(Version::new(1, 0, 0)));
    assert_eq!(report.latest.version, Version::new(1, 2, 0));
    assert!(matches!(report.decision, UpdateDecision::ApplyPatch(_)));
    assert!(store.hits().is_empty(), "check must not download anything");
    assert_eq!(marker(&install), Some(Version::new(1, 0, 0)));
    assert!(sink.events().is_empty());
    assert!(launcher.launched().is_empty());
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = LauncherConfig {
        listing_url: String::new(),
        ..Default::default()
    };
    let result = UpdateOrchestrator::new(
        config,
        Arc::new(RecordingSink::new()),
        Arc::new(RecordingLauncher::new()),
    );
    assert!(matches!(result, Err(UpdaterError::Config(_))));
}
