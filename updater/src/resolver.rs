//! 원격 빌드 목록 조회 및 최신 버전 결정
//!
//! 객체 저장소 목록 API(`{"objects":[{"name":..}, ..]}`)에서
//! `<product>/Versions/Build-<platform>-<major>.<minor>.<patch>.zip` 형식만 골라
//! 숫자 비교로 최대 버전을 찾고, 같은 기준 경로로 정규 다운로드 URL을 만듭니다.
//!
//! 사전 서명된 URL은 소스에 두지 않습니다. 기준 URL과 토큰은 `LauncherConfig`로 주입.

use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::LauncherConfig;
use crate::error::{Result, UpdaterError};
use crate::version::Version;

/// 목록 API 응답 (필요한 필드만)
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectListing {
    #[serde(default)]
    pub objects: Vec<ObjectEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectEntry {
    pub name: String,
}

/// 최신 빌드 결정 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedBuild {
    pub version: Version,
    pub url: String,
}

/// 빌드/패치 객체 이름 규칙
#[derive(Debug, Clone)]
pub struct ArtifactNaming {
    product: String,
    platform: String,
    download_base: String,
    build_pattern: Regex,
}

impl ArtifactNaming {
    pub fn new(product: &str, platform: &str, download_base: &str) -> Result<Self> {
        let pattern = format!(
            r"^{}(\d+\.\d+\.\d+)\.zip$",
            regex::escape(&Self::build_prefix_for(product, platform))
        );
        let build_pattern = Regex::new(&pattern)
            .map_err(|e| UpdaterError::Config(format!("invalid build name pattern: {}", e)))?;

        Ok(Self {
            product: product.to_string(),
            platform: platform.to_string(),
            download_base: download_base.trim_end_matches('/').to_string(),
            build_pattern,
        })
    }

    pub fn from_config(config: &LauncherConfig) -> Result<Self> {
        Self::new(&config.product, &config.platform, &config.download_base())
    }

    fn build_prefix_for(product: &str, platform: &str) -> String {
        format!("{}/Versions/Build-{}-", product, platform)
    }

    pub fn build_prefix(&self) -> String {
        Self::build_prefix_for(&self.product, &self.platform)
    }

    /// 객체 이름에서 버전 추출. 패턴에 맞지 않으면 `None`
    ///
    /// 앞자리 0이 붙은 이름(`1.02.0`)은 제외. `build_url`은 항상 목록의 객체 이름과 같아야 함
    pub fn parse_build_name(&self, name: &str) -> Option<Version> {
        if !name.starts_with(&self.build_prefix()) {
            return None;
        }
        let caps = self.build_pattern.captures(name)?;
        let text = caps.get(1)?.as_str();
        let version = Version::parse(text).ok()?;
        if version.to_string() != text {
            tracing::debug!("[Resolver] Skipping non-canonical build name {}", name);
            return None;
        }
        Some(version)
    }

    /// 이름 목록에서 최대 버전
    pub fn latest_version<'a, I>(&self, names: I) -> Option<Version>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .filter_map(|name| self.parse_build_name(name))
            .max()
    }

    pub fn build_object_name(&self, version: &Version) -> String {
        format!("{}{}.zip", self.build_prefix(), version)
    }

    pub fn build_url(&self, version: &Version) -> String {
        format!("{}/{}", self.download_base, self.build_object_name(version))
    }

    /// 단일 홉 패치: `<product>/Patches/Patch-<platform>-<from>-to-<to>.bsdiff`
    pub fn patch_url(&self, from: &Version, to: &Version) -> String {
        format!(
            "{}/{}/Patches/Patch-{}-{}-to-{}.bsdiff",
            self.download_base, self.product, self.platform, from, to
        )
    }

    /// 패치와 함께 게시되는 SHA-256 사이드카
    pub fn patch_digest_url(&self, from: &Version, to: &Version) -> String {
        format!("{}.sha256", self.patch_url(from, to))
    }
}

/// 원격 버전 조회기
pub struct RemoteResolver {
    http: reqwest::Client,
    listing_url: String,
    naming: ArtifactNaming,
    timeout: Duration,
}

impl RemoteResolver {
    pub fn new(config: &LauncherConfig, http: reqwest::Client) -> Result<Self> {
        Ok(Self {
            http,
            listing_url: config.listing_url.clone(),
            naming: ArtifactNaming::from_config(config)?,
            timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
        })
    }

    pub fn naming(&self) -> &ArtifactNaming {
        &self.naming
    }

    /// 전체 객체 목록 가져오기
    pub async fn fetch_listing(&self) -> Result<ObjectListing> {
        let response = self
            .http
            .get(&self.listing_url)
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| UpdaterError::Resolution(format!("listing unreachable: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(UpdaterError::Resolution(format!(
                "listing returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        response
            .json::<ObjectListing>()
            .await
            .map_err(|e| UpdaterError::Resolution(format!("listing unparseable: {}", e)))
    }

    /// 최신 버전과 다운로드 URL 결정
    pub async fn resolve_latest(&self) -> Result<ResolvedBuild> {
        let listing = self.fetch_listing().await?;
        tracing::debug!("[Resolver] Listing returned {} object(s)", listing.objects.len());

        let version = self
            .naming
            .latest_version(listing.objects.iter().map(|o| o.name.as_str()))
            .ok_or_else(|| {
                UpdaterError::Resolution(format!(
                    "no builds matching '{}*.zip' in listing",
                    self.naming.build_prefix()
                ))
            })?;

        let url = self.naming.build_url(&version);
        tracing::info!("[Resolver] Latest build {} at {}", version, url);
        Ok(ResolvedBuild { version, url })
    }
}
