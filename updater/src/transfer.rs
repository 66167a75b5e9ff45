//! 다운로드 클라이언트
//!
//! 원격 리소스를 디스크로 스트리밍하면서 진행률(0.0–1.0)을 일정 간격으로 묶어 보고합니다.
//! 실패한 전송의 부분 파일은 항상 삭제합니다. 이어받기는 지원하지 않습니다.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::config::LauncherConfig;
use crate::error::{Result, TransferReason, UpdaterError};

/// 런처 공용 HTTP 클라이언트 생성 (토큰은 기본 헤더로)
pub fn build_http_client(config: &LauncherConfig) -> Result<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();
    if let Some(token) = config.access_token.as_deref().filter(|t| !t.is_empty()) {
        let mut value = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| UpdaterError::Config("access_token contains invalid characters".into()))?;
        value.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, value);
    }

    reqwest::Client::builder()
        .user_agent(concat!("forge-launcher/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
        .default_headers(headers)
        .build()
        .map_err(|e| UpdaterError::Config(format!("failed to create HTTP client: {}", e)))
}

/// 진행률 이벤트 묶기: 정수 퍼센트가 올라가고 최소 간격이 지났을 때만 통과
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
    last_percent: Option<u8>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            last_percent: None,
        }
    }

    pub fn observe(&mut self, fraction: f64) -> Option<f64> {
        self.observe_at(fraction, Instant::now())
    }

    pub fn observe_at(&mut self, fraction: f64, now: Instant) -> Option<f64> {
        let fraction = fraction.clamp(0.0, 1.0);
        let percent = fraction_to_percent(fraction);

        if self.last_percent.map_or(false, |p| percent <= p) {
            return None;
        }
        if let Some(last) = self.last_emit {
            if now.duration_since(last) < self.interval && percent < 100 {
                return None;
            }
        }

        self.last_emit = Some(now);
        self.last_percent = Some(percent);
        Some(fraction)
    }

    /// 전송 완료 시 100%가 아직 나가지 않았다면 1.0
    pub fn finish(&mut self) -> Option<f64> {
        if self.last_percent == Some(100) {
            return None;
        }
        self.last_percent = Some(100);
        Some(1.0)
    }
}

/// 0.0–1.0 → 0–100 (내림)
pub fn fraction_to_percent(fraction: f64) -> u8 {
    (fraction.clamp(0.0, 1.0) * 100.0).floor() as u8
}

/// URL 경로 마지막 세그먼트를 파일명으로
pub fn file_name_from_url(url: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let name = without_query.trim_end_matches('/').rsplit('/').next()?;
    if name.is_empty() || name == "." || name == ".." || name.contains('\\') || name.contains(':') {
        return None;
    }
    Some(name.to_string())
}

/// 다운로드 클라이언트
#[derive(Clone)]
pub struct TransferClient {
    http: reqwest::Client,
    progress_interval: Duration,
    /// 청크 사이 최대 대기 시간
    idle_timeout: Duration,
}

impl TransferClient {
    pub fn new(config: &LauncherConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            progress_interval: Duration::from_millis(config.progress_interval_ms),
            idle_timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
        }
    }

    /// `dest_dir/dest_file_name`으로 다운로드 (파일명 생략 시 URL에서 추출)
    pub async fn download<F>(
        &self,
        url: &str,
        dest_dir: &Path,
        dest_file_name: Option<&str>,
        mut on_progress: F,
    ) -> Result<PathBuf>
    where
        F: FnMut(f64) + Send,
    {
        let file_name = match dest_file_name {
            Some(name) => name.to_string(),
            None => file_name_from_url(url).ok_or_else(|| {
                UpdaterError::Config(format!("cannot derive a file name from '{}'", url))
            })?,
        };

        tokio::fs::create_dir_all(dest_dir).await.map_err(|e| UpdaterError::Transfer {
            url: url.to_string(),
            reason: TransferReason::Disk,
            message: format!("create {}: {}", dest_dir.display(), e),
        })?;
        let dest = dest_dir.join(&file_name);

        tracing::info!("[Transfer] GET {} -> {}", url, dest.display());
        match self.stream_to_file(url, &dest, &mut on_progress).await {
            Ok(bytes) => {
                tracing::info!("[Transfer] Downloaded {} ({} bytes)", file_name, bytes);
                Ok(dest)
            }
            Err(e) => {
                // 부분 파일 정리
                match tokio::fs::remove_file(&dest).await {
                    Ok(()) => tracing::debug!("[Transfer] Removed partial file {}", dest.display()),
                    Err(rm) if rm.kind() == std::io::ErrorKind::NotFound => {}
                    Err(rm) => tracing::warn!("[Transfer] Could not remove {}: {}", dest.display(), rm),
                }
                Err(e)
            }
        }
    }

    /// 작은 텍스트 리소스(digest 사이드카 등)를 통째로 읽기
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self
            .http
            .get(url)
            .timeout(self.idle_timeout)
            .send()
            .await
            .map_err(|e| UpdaterError::from_reqwest(&e, url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdaterError::Transfer {
                url: url.to_string(),
                reason: TransferReason::HttpStatus(status.as_u16()),
                message: format!("server responded {}", status),
            });
        }
        response.text().await.map_err(|e| UpdaterError::from_reqwest(&e, url))
    }

    async fn stream_to_file<F>(&self, url: &str, dest: &Path, on_progress: &mut F) -> Result<u64>
    where
        F: FnMut(f64) + Send,
    {
        let transfer_err = |reason: TransferReason, message: String| UpdaterError::Transfer {
            url: url.to_string(),
            reason,
            message,
        };

        // 응답 헤더 대기도 청크 대기와 같은 한도
        let response = tokio::time::timeout(self.idle_timeout, self.http.get(url).send())
            .await
            .map_err(|_| {
                transfer_err(
                    TransferReason::Network,
                    format!("no response for {}s", self.idle_timeout.as_secs()),
                )
            })?
            .map_err(|e| UpdaterError::from_reqwest(&e, url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(transfer_err(
                TransferReason::HttpStatus(status.as_u16()),
                format!("server responded {}", status),
            ));
        }

        let total = response.content_length().filter(|t| *t > 0);
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| transfer_err(TransferReason::Disk, format!("create {}: {}", dest.display(), e)))?;

        let mut throttle = ProgressThrottle::new(self.progress_interval);
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::time::timeout(self.idle_timeout, stream.next())
                .await
                .map_err(|_| {
                    transfer_err(
                        TransferReason::Network,
                        format!("no data for {}s", self.idle_timeout.as_secs()),
                    )
                })?;
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| UpdaterError::from_reqwest(&e, url))?;

            file.write_all(&chunk)
                .await
                .map_err(|e| transfer_err(TransferReason::Disk, format!("write {}: {}", dest.display(), e)))?;
            downloaded += chunk.len() as u64;

            if let Some(total) = total {
                if let Some(fraction) = throttle.observe(downloaded as f64 / total as f64) {
                    on_progress(fraction);
                }
            }
        }

        if let Some(total) = total {
            if downloaded < total {
                return Err(transfer_err(
                    TransferReason::Network,
                    format!("connection closed after {}/{} bytes", downloaded, total),
                ));
            }
        }

        file.flush()
            .await
            .and(file.sync_all().await)
            .map_err(|e| transfer_err(TransferReason::Disk, format!("flush {}: {}", dest.display(), e)))?;
        drop(file);

        if let Some(fraction) = throttle.finish() {
            on_progress(fraction);
        }
        Ok(downloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_requires_increase_and_interval() {
        let start = Instant::now();
        let mut t = ProgressThrottle::new(Duration::from_millis(100));

        assert_eq!(t.observe_at(0.001, start), Some(0.001));
        // 같은 퍼센트(0%)는 통과하지 않음
        assert_eq!(t.observe_at(0.005, start + Duration::from_millis(500)), None);
        // 퍼센트는 올랐지만 간격 미달
        assert_eq!(t.observe_at(0.20, start + Duration::from_millis(50)), None);
        assert_eq!(t.observe_at(0.20, start + Duration::from_millis(150)), Some(0.20));
        // 100%는 간격과 무관하게 통과
        assert_eq!(t.observe_at(1.0, start + Duration::from_millis(151)), Some(1.0));
        assert_eq!(t.finish(), None);
    }

    #[test]
    fn throttle_finish_emits_final_once() {
        let mut t = ProgressThrottle::new(Duration::from_secs(10));
        assert!(t.observe(0.5).is_some());
        assert!(t.observe(0.9).is_none());
        assert_eq!(t.finish(), Some(1.0));
        assert_eq!(t.finish(), None);
    }

    #[test]
    fn throttle_coalesces_many_updates() {
        let start = Instant::now();
        let mut t = ProgressThrottle::new(Duration::from_millis(100));
        let emitted: Vec<f64> = (0..=10_000)
            .filter_map(|i| {
                let now = start + Duration::from_micros(i * 100);
                t.observe_at(i as f64 / 10_000.0, now)
            })
            .collect();
        // 1초 동안 10,001번 관찰 → 100ms 간격이면 대략 11개
        assert!(emitted.len() <= 12, "emitted {}", emitted.len());
        assert!(emitted.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(emitted.last().copied(), Some(1.0));
    }

    #[test]
    fn percent_conversion() {
        assert_eq!(fraction_to_percent(0.0), 0);
        assert_eq!(fraction_to_percent(0.999), 99);
        assert_eq!(fraction_to_percent(1.0), 100);
        assert_eq!(fraction_to_percent(3.0), 100);
        assert_eq!(fraction_to_percent(-1.0), 0);
    }

    /// 원시 TCP 서버: 접속마다 `respond`를 실행
    async fn raw_server<F, Fut>(respond: F) -> std::net::SocketAddr
    where
        F: Fn(tokio::net::TcpStream) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(respond(socket));
            }
        });
        addr
    }

    fn client(timeout_secs: u64) -> TransferClient {
        let config = LauncherConfig {
            request_timeout_secs: timeout_secs,
            progress_interval_ms: 0,
            ..Default::default()
        };
        TransferClient::new(&config, build_http_client(&config).unwrap())
    }

    #[tokio::test]
    async fn silent_server_times_out_as_network_error() {
        // 접속은 받지만 아무것도 보내지 않음
        let addr = raw_server(|socket| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        })
        .await;
        let tmp = tempfile::TempDir::new().unwrap();
        let url = format!("http://{}/o/Build-Plat-1.0.0.zip", addr);

        let result = tokio::time::timeout(
            Duration::from_secs(6),
            client(1).download(&url, tmp.path(), None, |_| {}),
        )
        .await
        .expect("download must give up on its own");

        match result {
            Err(UpdaterError::Transfer { reason, .. }) => assert_eq!(reason, TransferReason::Network),
            other => panic!("expected network transfer error, got {:?}", other),
        }
        assert!(!tmp.path().join("Build-Plat-1.0.0.zip").exists());
    }

    #[tokio::test]
    async fn truncated_body_removes_partial_file() {
        // Content-Length보다 적게 보내고 연결 종료
        let addr = raw_server(|mut socket| async move {
            use tokio::io::AsyncReadExt;
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let head = "HTTP/1.1 200 OK\r\nContent-Length: 100000\r\nConnection: close\r\n\r\n";
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&[7u8; 4096]).await;
            let _ = socket.flush().await;
            drop(socket);
        })
        .await;
        let tmp = tempfile::TempDir::new().unwrap();
        let url = format!("http://{}/o/Build-Plat-1.0.0.zip", addr);

        let mut seen = Vec::new();
        let result = client(5)
            .download(&url, tmp.path(), None, |f| seen.push(f))
            .await;

        match result {
            Err(UpdaterError::Transfer { reason, .. }) => assert_eq!(reason, TransferReason::Network),
            other => panic!("expected network transfer error, got {:?}", other),
        }
        assert!(!tmp.path().join("Build-Plat-1.0.0.zip").exists(), "partial file must be removed");
        assert!(!seen.contains(&1.0));
    }

    #[test]
    fn file_names_from_urls() {
        assert_eq!(
            file_name_from_url("https://h/o/ProjectWhy/Versions/Build-W-1.0.0.zip").as_deref(),
            Some("Build-W-1.0.0.zip")
        );
        assert_eq!(
            file_name_from_url("https://h/o/a.bsdiff?sig=abc#frag").as_deref(),
            Some("a.bsdiff")
        );
        assert_eq!(file_name_from_url("https://h/o/dir/").as_deref(), Some("dir"));
        assert_eq!(file_name_from_url("https://h/.."), None);
    }
}
