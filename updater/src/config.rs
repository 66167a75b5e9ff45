//! 런처 설정
//!
//! 원격 저장소 주소와 접근 토큰은 항상 설정으로 주입합니다 (소스에 URL 리터럴 없음).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, UpdaterError};

/// 패치 적용 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PatchStrategyKind {
    /// 프로세스 내 bsdiff 라이브러리
    #[default]
    Bsdiff,
    /// 외부 델타 도구 실행
    External,
}

/// 업데이트 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// 객체 목록 조회 엔드포인트 (JSON `{"objects":[{"name":..}]}`)
    pub listing_url: String,
    /// 빌드/패치 다운로드 기준 URL (없으면 listing_url 사용)
    pub download_base_url: Option<String>,
    /// 모든 요청에 `Authorization: Bearer`로 전송
    pub access_token: Option<String>,
    /// 객체 이름의 제품 세그먼트 (예: "ProjectWhy")
    pub product: String,
    /// 객체 이름의 플랫폼 세그먼트 (예: "StandaloneWindows64")
    pub platform: String,
    /// 설치 디렉터리 안의 고정 실행 파일 이름
    pub executable_name: String,
    /// 설치 디렉터리 (없으면 사용자 데이터 디렉터리 기준)
    pub install_dir: Option<String>,
    /// 설치 디렉터리 안의 버전 마커 파일 이름
    pub marker_file: String,
    /// 패치 전 기존 실행 파일의 최소 크기 (바이트)
    pub min_executable_size: u64,
    pub patch_strategy: PatchStrategyKind,
    /// 외부 델타 도구 경로 (patch_strategy = "external"일 때 필수)
    pub patch_tool: Option<String>,
    /// 외부 도구 인자 템플릿. `{source}`, `{patch}`, `{output}` 치환
    pub patch_tool_args: Vec<String>,
    pub request_timeout_secs: u64,
    /// 진행률 이벤트 최소 간격
    pub progress_interval_ms: u64,
    /// 실행 확인 후 런처 종료까지 대기 시간
    pub exit_delay_ms: u64,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            listing_url: String::new(),
            download_base_url: None,
            access_token: None,
            product: "ProjectWhy".to_string(),
            platform: "StandaloneWindows64".to_string(),
            executable_name: "StandaloneWindows64.exe".to_string(),
            install_dir: None,
            marker_file: "version.txt".to_string(),
            min_executable_size: 1024,
            patch_strategy: PatchStrategyKind::Bsdiff,
            patch_tool: None,
            patch_tool_args: default_patch_tool_args(),
            request_timeout_secs: 30,
            progress_interval_ms: 100,
            exit_delay_ms: 1000,
        }
    }
}

pub fn default_patch_tool_args() -> Vec<String> {
    ["-d", "-s", "{source}", "{patch}", "{output}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl LauncherConfig {
    /// TOML 문자열에서 로드 (누락된 키는 기본값)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| UpdaterError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.listing_url.trim().is_empty() {
            return Err(UpdaterError::Config("listing_url is not configured".into()));
        }
        for (key, value) in [
            ("product", &self.product),
            ("platform", &self.platform),
            ("executable_name", &self.executable_name),
            ("marker_file", &self.marker_file),
        ] {
            if value.trim().is_empty() {
                return Err(UpdaterError::Config(format!("{} must not be empty", key)));
            }
        }
        if self.patch_strategy == PatchStrategyKind::External
            && self.patch_tool.as_deref().map_or(true, |t| t.trim().is_empty())
        {
            return Err(UpdaterError::Config(
                "patch_strategy = \"external\" requires patch_tool".into(),
            ));
        }
        Ok(())
    }

    /// 다운로드 기준 URL (끝의 '/' 제거)
    pub fn download_base(&self) -> String {
        self.download_base_url
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.listing_url)
            .trim_end_matches('/')
            .to_string()
    }

    pub fn install_dir(&self) -> PathBuf {
        self.install_dir
            .as_ref()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| default_data_dir().join(&self.product))
    }

    pub fn marker_path(&self) -> PathBuf {
        self.install_dir().join(&self.marker_file)
    }

    pub fn executable_path(&self) -> PathBuf {
        self.install_dir().join(&self.executable_name)
    }
}

/// 사용자별 애플리케이션 데이터 디렉터리
/// (Windows: %LOCALAPPDATA%/Forge Launcher, 그 외: $XDG_DATA_HOME 또는 ~/.local/share/forge-launcher)
pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("LOCALAPPDATA")
            .map(|appdata| PathBuf::from(appdata).join("Forge Launcher"))
            .unwrap_or_else(|_| PathBuf::from("./Forge Launcher"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            if !xdg.is_empty() {
                return PathBuf::from(xdg).join("forge-launcher");
            }
        }
        std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(".local").join("share").join("forge-launcher"))
            .unwrap_or_else(|_| PathBuf::from("./forge-launcher"))
    }
}
