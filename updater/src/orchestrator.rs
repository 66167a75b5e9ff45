//! 업데이트 사이클 상태 머신
//!
//! ```text
//! Resolving → Deciding → {Patching | FullDownload} → Verifying → Committing → Launching → Done
//!                                     └─ (패치 실패) → FullDownload (한 번만)
//! ```
//! 어느 단계에서든 `Error`로 끝날 수 있으며, 그 경우 게임은 실행하지 않습니다.
//!
//! 버전 마커는 대상 경로의 실행 파일이 확인된 뒤에만 기록합니다.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::archive::ArchiveInstaller;
use crate::config::LauncherConfig;
use crate::error::{ErrorContext, Result, UpdaterError};
use crate::events::StatusSink;
use crate::integrity;
use crate::launcher::{Launch, LaunchHandle};
use crate::patch::{strategy_from_config, PatchApplier};
use crate::resolver::{ArtifactNaming, RemoteResolver, ResolvedBuild};
use crate::store::VersionStore;
use crate::transfer::{build_http_client, file_name_from_url, fraction_to_percent, TransferClient};
use crate::version::Version;

// ═══════════════════════════════════════════════════════
// 상태 피드 메시지
// ═══════════════════════════════════════════════════════

pub const MSG_ALREADY_CURRENT: &str = "Latest version already installed. Launching game...";
pub const MSG_DOWNLOADING_PATCH: &str = "Downloading patch...";
pub const MSG_APPLYING_PATCH: &str = "Applying patch...";
pub const MSG_PATCH_FALLBACK: &str = "Patch not available or failed. Downloading full version...";
pub const MSG_STARTING_DOWNLOAD: &str = "Starting download...";
pub const MSG_EXTRACTING: &str = "Extracting files...";
pub const MSG_LAUNCHING: &str = "Launching game...";
pub const MSG_LAUNCHED: &str = "Game launched...";
pub const MSG_ERROR: &str = "Error occurred";

/// 사이클 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Idle,
    Resolving,
    Deciding,
    Patching,
    FullDownload,
    Verifying,
    Committing,
    Launching,
    Done,
    Error,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CyclePhase::Idle => "Idle",
            CyclePhase::Resolving => "Resolving",
            CyclePhase::Deciding => "Deciding",
            CyclePhase::Patching => "Patching",
            CyclePhase::FullDownload => "FullDownload",
            CyclePhase::Verifying => "Verifying",
            CyclePhase::Committing => "Committing",
            CyclePhase::Launching => "Launching",
            CyclePhase::Done => "Done",
            CyclePhase::Error => "Error",
        };
        f.write_str(name)
    }
}

/// 단일 홉 패치 작업
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchJob {
    pub from: Version,
    pub to: Version,
    pub patch_url: String,
    pub digest_url: String,
    /// 다운로드될 로컬 패치 파일
    pub patch_path: PathBuf,
    /// 패치 후 실행 파일의 SHA-256 (사이드카에서 채워짐)
    pub expected_digest: Option<String>,
}

/// 사이클당 한 번 결정되는 업데이트 경로
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum UpdateDecision {
    AlreadyCurrent,
    ApplyPatch(PatchJob),
    FullDownload { url: String, version: Version },
}

impl UpdateDecision {
    pub fn is_update(&self) -> bool {
        !matches!(self, UpdateDecision::AlreadyCurrent)
    }
}

/// 설치 상태 + 최신 빌드 → 업데이트 경로
///
/// 마커가 있어도 실행 파일이 없으면 마커를 믿지 않고 전체 다운로드.
pub fn decide(
    installed: Option<&Version>,
    executable_present: bool,
    latest: &ResolvedBuild,
    naming: &ArtifactNaming,
    download_dir: &Path,
) -> UpdateDecision {
    let full = || UpdateDecision::FullDownload {
        url: latest.url.clone(),
        version: latest.version,
    };

    match installed {
        Some(_) if !executable_present => full(),
        Some(v) if *v == latest.version => UpdateDecision::AlreadyCurrent,
        Some(v) => {
            let patch_url = naming.patch_url(v, &latest.version);
            let file_name = file_name_from_url(&patch_url)
                .unwrap_or_else(|| format!("Patch-{}-to-{}.bsdiff", v, latest.version));
            UpdateDecision::ApplyPatch(PatchJob {
                from: *v,
                to: latest.version,
                digest_url: naming.patch_digest_url(v, &latest.version),
                patch_url,
                patch_path: download_dir.join(file_name),
                expected_digest: None,
            })
        }
        None => full(),
    }
}

/// 실제로 거친 경로
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateRoute {
    AlreadyCurrent,
    Patched,
    FullDownload,
    /// 패치 실패 후 전체 다운로드로 폴백
    PatchFallback,
}

/// 성공한 사이클 요약
#[derive(Debug)]
pub struct CycleSummary {
    pub previous: Option<Version>,
    pub version: Version,
    pub route: UpdateRoute,
    pub executable: PathBuf,
    pub launch: LaunchHandle,
}

/// 사이클 결과
#[derive(Debug)]
pub enum CycleOutcome {
    Done(CycleSummary),
    Error { phase: CyclePhase, error: UpdaterError },
}

impl CycleOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, CycleOutcome::Done(_))
    }
}

/// `check` 명령 결과 (부수 효과 없음)
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub installed: Option<Version>,
    pub latest: ResolvedBuild,
    pub decision: UpdateDecision,
}

pub struct UpdateOrchestrator {
    config: LauncherConfig,
    resolver: RemoteResolver,
    transfer: TransferClient,
    store: VersionStore,
    installer: ArchiveInstaller,
    patcher: PatchApplier,
    sink: Arc<dyn StatusSink>,
    launcher: Arc<dyn Launch>,
    phase: CyclePhase,
}

impl UpdateOrchestrator {
    pub fn new(
        config: LauncherConfig,
        sink: Arc<dyn StatusSink>,
        launcher: Arc<dyn Launch>,
    ) -> Result<Self> {
        config.validate()?;
        let http = build_http_client(&config)?;

        Ok(Self {
            resolver: RemoteResolver::new(&config, http.clone())?,
            transfer: TransferClient::new(&config, http),
            store: VersionStore::new(config.marker_path()),
            installer: ArchiveInstaller::new(&config.executable_name),
            patcher: PatchApplier::new(strategy_from_config(&config)?, config.min_executable_size),
            config,
            sink,
            launcher,
            phase: CyclePhase::Idle,
        })
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    fn enter(&mut self, phase: CyclePhase) {
        tracing::info!("[Orchestrator] {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    fn fail(&mut self, operation: &str, error: UpdaterError) -> CycleOutcome {
        let phase = self.phase;
        ErrorContext::new(operation, &error).log(false);
        self.enter(CyclePhase::Error);
        self.sink
            .status(&format!("{}: {}", MSG_ERROR, error.user_message()));
        CycleOutcome::Error { phase, error }
    }

    /// 설치된 버전 읽기. 손상된 마커는 "설치 없음"으로 취급
    fn read_installed(&self) -> Option<Version> {
        match self.store.read() {
            Ok(v) => v,
            Err(e) => {
                ErrorContext::new("read version marker", &e).log(false);
                None
            }
        }
    }

    /// 원격 조회 + 결정만 수행 (다운로드/기록/실행 없음)
    pub async fn check(&mut self) -> Result<CheckReport> {
        self.enter(CyclePhase::Resolving);
        let latest = match self.resolver.resolve_latest().await {
            Ok(latest) => latest,
            Err(e) => {
                ErrorContext::new("check for updates", &e).log(false);
                self.enter(CyclePhase::Error);
                return Err(e);
            }
        };
        let installed = self.read_installed();

        self.enter(CyclePhase::Deciding);
        let decision = decide(
            installed.as_ref(),
            self.config.executable_path().is_file(),
            &latest,
            self.resolver.naming(),
            &self.config.install_dir(),
        );
        self.enter(CyclePhase::Idle);

        Ok(CheckReport {
            installed,
            latest,
            decision,
        })
    }

    /// 업데이트 사이클 한 번 실행 후 게임 실행
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.enter(CyclePhase::Resolving);
        let latest = match self.resolver.resolve_latest().await {
            Ok(latest) => latest,
            Err(e) => return self.fail("resolve latest version", e),
        };
        let installed = self.read_installed();
        tracing::info!(
            "[Orchestrator] Installed {}, latest {}",
            installed.map_or_else(|| "none".to_string(), |v| v.to_string()),
            latest.version
        );

        self.enter(CyclePhase::Deciding);
        let executable = self.config.executable_path();
        let decision = decide(
            installed.as_ref(),
            executable.is_file(),
            &latest,
            self.resolver.naming(),
            &self.config.install_dir(),
        );

        let route = match decision {
            UpdateDecision::AlreadyCurrent => {
                self.sink.status(MSG_ALREADY_CURRENT);
                UpdateRoute::AlreadyCurrent
            }
            UpdateDecision::ApplyPatch(job) => {
                self.enter(CyclePhase::Patching);
                let patch_path = job.patch_path.clone();
                let attempt = self.try_patch(job, &executable).await;
                remove_if_exists(&patch_path);

                match attempt {
                    Ok(()) => {
                        self.sink.complete();
                        UpdateRoute::Patched
                    }
                    Err(e) => {
                        ErrorContext::new("apply patch", &e).log(true);
                        self.sink.status(MSG_PATCH_FALLBACK);
                        if let Err(e) = self.full_download(&latest).await {
                            return self.fail("download full build", e);
                        }
                        UpdateRoute::PatchFallback
                    }
                }
            }
            UpdateDecision::FullDownload { .. } => {
                if let Err(e) = self.full_download(&latest).await {
                    return self.fail("download full build", e);
                }
                UpdateRoute::FullDownload
            }
        };

        if route != UpdateRoute::AlreadyCurrent {
            self.enter(CyclePhase::Committing);
            if let Err(e) = self.store.write(&latest.version) {
                return self.fail("write version marker", e);
            }
        }

        self.enter(CyclePhase::Launching);
        self.sink.status(MSG_LAUNCHING);
        let launch = match self.launcher.launch(&executable, self.sink.clone()) {
            Ok(handle) => handle,
            Err(e) => return self.fail("launch game", e),
        };
        self.sink.status(MSG_LAUNCHED);
        self.enter(CyclePhase::Done);

        CycleOutcome::Done(CycleSummary {
            previous: installed,
            version: latest.version,
            route,
            executable,
            launch,
        })
    }

    /// 패치 경로: 사이드카 → 패치 다운로드 → 적용 → 검증.
    /// 여기서 나는 에러는 모두 호출자가 폴백으로 처리
    async fn try_patch(&mut self, mut job: PatchJob, executable: &Path) -> Result<()> {
        tracing::info!("[Orchestrator] Patching {} -> {}", job.from, job.to);

        let sidecar = self.transfer.fetch_text(&job.digest_url).await?;
        let expected = integrity::parse_digest_sidecar(&sidecar).ok_or_else(|| UpdaterError::Patch {
            cause: format!("digest sidecar {} is not a SHA-256 hex digest", job.digest_url),
        })?;
        job.expected_digest = Some(expected.clone());

        self.sink.status(MSG_DOWNLOADING_PATCH);
        let dest_dir = job
            .patch_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.install_dir());
        let file_name = job
            .patch_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        let sink = self.sink.clone();
        let patch_path = self
            .transfer
            .download(&job.patch_url, &dest_dir, file_name.as_deref(), move |fraction| {
                sink.progress(fraction_to_percent(fraction))
            })
            .await?;

        self.sink.status(MSG_APPLYING_PATCH);
        let patcher = self.patcher.clone();
        let source = executable.to_path_buf();
        let output = executable.to_path_buf();
        tokio::task::spawn_blocking(move || patcher.apply(&source, &patch_path, &output))
            .await
            .map_err(|e| UpdaterError::Patch {
                cause: format!("patch task failed: {}", e),
            })??;

        self.enter(CyclePhase::Verifying);
        let target = executable.to_path_buf();
        tokio::task::spawn_blocking(move || integrity::ensure_digest(&target, &expected))
            .await
            .map_err(|e| UpdaterError::Patch {
                cause: format!("verify task failed: {}", e),
            })??;

        tracing::info!("[Orchestrator] Patch {} -> {} verified", job.from, job.to);
        Ok(())
    }

    /// 전체 빌드 다운로드 + 설치
    async fn full_download(&mut self, latest: &ResolvedBuild) -> Result<()> {
        self.enter(CyclePhase::FullDownload);
        self.sink.status(MSG_STARTING_DOWNLOAD);

        let install_dir = self.config.install_dir();
        let sink = self.sink.clone();
        let archive = self
            .transfer
            .download(&latest.url, &install_dir, None, move |fraction| {
                sink.progress(fraction_to_percent(fraction))
            })
            .await?;

        self.sink.status(MSG_EXTRACTING);
        let installer = self.installer.clone();
        let archive_for_task = archive.clone();
        let executable = tokio::task::spawn_blocking(move || {
            installer.install(&archive_for_task, &install_dir)
        })
        .await
        .map_err(|e| UpdaterError::Extraction {
            archive: archive.clone(),
            message: format!("extraction task failed: {}", e),
        })??;

        self.enter(CyclePhase::Verifying);
        if executable != self.config.executable_path() {
            return Err(UpdaterError::Extraction {
                archive,
                message: format!("executable extracted to unexpected path {}", executable.display()),
            });
        }
        self.sink.complete();
        Ok(())
    }
}

fn remove_if_exists(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!("[Orchestrator] Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("[Orchestrator] Could not remove {}: {}", path.display(), e),
    }
}
