//! 에러 분류 및 전파 정책
//!
//! ## 에러 분류
//! - `Resolution`: 원격 목록 조회/파싱 실패. 사이클 종료
//! - `Transfer`: 네트워크/HTTP/디스크 오류. 패치 경로에서는 폴백, 전체 다운로드 경로에서는 종료
//! - `Extraction`: 손상된 아카이브. 사이클 종료, 아카이브는 진단용으로 남김
//! - `Prereq` / `Patch` / `Verification`: 패치 경로 전용. 항상 전체 다운로드로 폴백
//! - `CorruptState`: 마커 파일 손상. "설치 버전 없음"으로 취급
//! - `Launch`: 실행 실패. 더 시도할 것이 없으므로 종료

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// 전송 실패 원인
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "status", rename_all = "snake_case")]
pub enum TransferReason {
    /// 연결 실패, 타임아웃, 스트림 중단
    Network,
    /// 2xx가 아닌 응답
    HttpStatus(u16),
    /// 로컬 파일 생성/쓰기 실패
    Disk,
}

impl fmt::Display for TransferReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferReason::Network => write!(f, "network"),
            TransferReason::HttpStatus(code) => write!(f, "http status {}", code),
            TransferReason::Disk => write!(f, "disk"),
        }
    }
}

/// 업데이트 엔진 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum UpdaterError {
    #[error("Version resolution failed: {0}")]
    Resolution(String),

    #[error("Transfer of {url} failed ({reason}): {message}")]
    Transfer {
        url: String,
        reason: TransferReason,
        message: String,
    },

    #[error("Extraction of {} failed: {message}", .archive.display())]
    Extraction { archive: PathBuf, message: String },

    #[error("Patch prerequisite not met for {}: {message}", .path.display())]
    Prereq { path: PathBuf, message: String },

    #[error("Patch application failed: {cause}")]
    Patch { cause: String },

    #[error("Digest mismatch for {}: expected {expected}, got {actual}", .path.display())]
    Verification {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Version marker {} is corrupt: {content:?}", .path.display())]
    CorruptState { path: PathBuf, content: String },

    #[error("Failed to launch {}: {message}", .path.display())]
    Launch { path: PathBuf, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error during {operation} on '{}': {source}", .path.display())]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl UpdaterError {
    /// 패치 경로에서 발생했을 때 전체 다운로드로 폴백할 수 있는 에러인지
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(
            self,
            UpdaterError::Transfer { .. }
                | UpdaterError::Prereq { .. }
                | UpdaterError::Patch { .. }
                | UpdaterError::Verification { .. }
                | UpdaterError::Io { .. }
        )
    }

    /// 사이클을 끝내야 하는 에러인지 (패치 경로 밖에서 발생한 경우 기준)
    pub fn is_fatal(&self) -> bool {
        !matches!(self, UpdaterError::CorruptState { .. })
    }

    /// 상태 피드에 표시할 메시지
    pub fn user_message(&self) -> String {
        match self {
            UpdaterError::Resolution(_) => {
                "Could not reach the update server. Please check your connection.".to_string()
            }
            UpdaterError::Transfer { reason: TransferReason::HttpStatus(404), .. } => {
                "The requested build was not found on the server.".to_string()
            }
            UpdaterError::Transfer { reason: TransferReason::HttpStatus(code), .. } if *code >= 500 => {
                "The update server is having trouble. Please try again later.".to_string()
            }
            UpdaterError::Transfer { reason: TransferReason::Disk, .. } => {
                "Could not save the download. Please check free disk space.".to_string()
            }
            UpdaterError::Transfer { .. } => "Download failed.".to_string(),
            UpdaterError::Extraction { .. } => {
                "The downloaded build is damaged and could not be extracted.".to_string()
            }
            UpdaterError::Prereq { .. }
            | UpdaterError::Patch { .. }
            | UpdaterError::Verification { .. } => "Patch not available or failed.".to_string(),
            UpdaterError::CorruptState { .. } => "Installed version information is damaged.".to_string(),
            UpdaterError::Launch { .. } => "Failed to start game.".to_string(),
            UpdaterError::Config(message) => format!("Configuration error: {}", message),
            UpdaterError::Io { .. } => "A file operation failed.".to_string(),
        }
    }

    /// reqwest 에러를 전송 에러로 변환
    pub fn from_reqwest(err: &reqwest::Error, url: &str) -> Self {
        let reason = match err.status() {
            Some(status) => TransferReason::HttpStatus(status.as_u16()),
            None => TransferReason::Network,
        };
        UpdaterError::Transfer {
            url: url.to_string(),
            reason,
            message: err.to_string(),
        }
    }

    /// IO 에러를 UpdaterError로 변환
    pub fn from_io(source: std::io::Error, operation: &str, path: &Path) -> Self {
        UpdaterError::Io {
            operation: operation.to_string(),
            path: path.to_path_buf(),
            source,
        }
    }
}

/// 에러 컨텍스트 (로깅용)
#[derive(Debug)]
pub struct ErrorContext<'a> {
    pub operation: &'a str,
    pub error: &'a UpdaterError,
}

impl<'a> ErrorContext<'a> {
    pub fn new(operation: &'a str, error: &'a UpdaterError) -> Self {
        Self { operation, error }
    }

    /// 패치 경로(폴백 가능)에서는 warn, 그 외에는 error 레벨로 출력
    pub fn log(&self, on_patch_path: bool) {
        if on_patch_path && self.error.is_fallback_eligible() {
            tracing::warn!("[Error] {} (falling back): {}", self.operation, self.error);
        } else if !self.error.is_fatal() {
            tracing::warn!("[Error] {} (recovered): {}", self.operation, self.error);
        } else {
            tracing::error!("[Error] {} (fatal): {}", self.operation, self.error);
        }
    }
}

pub type Result<T, E = UpdaterError> = std::result::Result<T, E>;
