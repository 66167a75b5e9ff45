//! # Forge 업데이트 엔진
//!
//! 설치된 게임 빌드가 최신인지 판단하고, 델타 패치 또는 전체 빌드로 갱신한 뒤
//! 실행 파일을 띄웁니다. UI는 `StatusSink`로 상태 이벤트만 받습니다.
//!
//! ## 동작 원리
//! 1. **조회(resolver.rs)**: 객체 저장소 목록에서 `Build-<platform>-<ver>.zip` 최대 버전 결정
//! 2. **결정(orchestrator.rs)**: 설치 마커와 비교해 현재 / 패치 / 전체 다운로드 선택
//! 3. **패치(patch.rs)**: 단일 홉 bsdiff 또는 외부 델타 도구, 실패 시 전체 다운로드로 한 번 폴백
//! 4. **검증(integrity.rs)**: 패치 결과를 사이드카 SHA-256과 비교
//! 5. **기록(store.rs)**: 실행 파일 확인 후에만 `version.txt`를 원자적으로 교체
//! 6. **실행(launcher.rs)**: 분리된 프로세스로 게임 실행
//!
//! ## 원격 저장소 레이아웃
//! ```text
//! <download_base>/<product>/Versions/Build-<platform>-1.1.0.zip
//! <download_base>/<product>/Patches/Patch-<platform>-1.0.0-to-1.1.0.bsdiff
//! <download_base>/<product>/Patches/Patch-<platform>-1.0.0-to-1.1.0.bsdiff.sha256
//! ```

// ═══════════════════════════════════════════════════════
// 모듈
// ═══════════════════════════════════════════════════════

pub mod archive;
pub mod config;
pub mod error;
pub mod events;
pub mod integrity;
pub mod launcher;
pub mod orchestrator;
pub mod patch;
pub mod resolver;
pub mod store;
pub mod transfer;
pub mod version;

#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use archive::ArchiveInstaller;
pub use config::{default_data_dir, LauncherConfig, PatchStrategyKind};
pub use error::{ErrorContext, Result, TransferReason, UpdaterError};
pub use events::{ChannelSink, FanoutSink, NullSink, RecordingSink, StatusEvent, StatusSink};
pub use launcher::{Launch, LaunchHandle, ProcessLauncher, RecordingLauncher};
pub use orchestrator::{
    decide, CheckReport, CycleOutcome, CyclePhase, CycleSummary, PatchJob, UpdateDecision,
    UpdateOrchestrator, UpdateRoute,
};
pub use patch::{BsdiffStrategy, ExternalToolStrategy, PatchApplier, PatchStrategy};
pub use resolver::{ArtifactNaming, RemoteResolver, ResolvedBuild};
pub use store::VersionStore;
pub use transfer::{ProgressThrottle, TransferClient};
pub use version::{ParseVersionError, Version};
