//! 터미널 상태 표시
//!
//! 엔진의 `StatusSink` 이벤트를 stderr에 출력합니다. 사이클 시작 시 스피너를 돌리다가
//! 첫 진행률/완료 이벤트에서 즉시 멈춥니다 (stdout은 `check --json` 출력용으로 비워 둠).

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use forge_updater_lib::StatusSink;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const SPINNER_FRAMES: [char; 4] = ['/', '-', '\\', '|'];
pub const SPINNER_INTERVAL: Duration = Duration::from_millis(100);

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

pub struct ConsoleFeed {
    out: SharedWriter,
    spinner: CancellationToken,
    last_percent: Mutex<Option<u8>>,
}

impl ConsoleFeed {
    pub fn stderr() -> Self {
        Self::with_writer(Box::new(std::io::stderr()))
    }

    pub fn with_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            out: Arc::new(Mutex::new(writer)),
            spinner: CancellationToken::new(),
            last_percent: Mutex::new(None),
        }
    }

    /// 스피너 시작 (tokio 런타임 안에서 호출)
    pub fn start_spinner(&self, label: &str) -> JoinHandle<()> {
        let token = self.spinner.clone();
        let out = self.out.clone();
        let label = label.to_string();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SPINNER_INTERVAL);
            let mut frame = 0usize;
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if !draw_frame(&out, &token, frame, &label) {
                            break;
                        }
                        frame += 1;
                    }
                }
            }
        })
    }

    pub fn stop_spinner(&self) {
        if !self.spinner.is_cancelled() {
            self.spinner.cancel();
            tracing::debug!("[Console] Spinner stopped");
        }
    }

    pub fn spinner_active(&self) -> bool {
        !self.spinner.is_cancelled()
    }

    fn line(&self, text: &str) {
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "\r{}", text);
            let _ = out.flush();
        }
    }
}

/// 스피너 한 프레임. 취소 확인은 출력 락 안에서 (진행률 줄 뒤에 프레임이 찍히지 않도록)
fn draw_frame(out: &SharedWriter, token: &CancellationToken, frame: usize, label: &str) -> bool {
    let Ok(mut out) = out.lock() else {
        return false;
    };
    if token.is_cancelled() {
        return false;
    }
    let _ = write!(out, "\r{} {}", SPINNER_FRAMES[frame % SPINNER_FRAMES.len()], label);
    let _ = out.flush();
    true
}

impl StatusSink for ConsoleFeed {
    fn status(&self, message: &str) {
        tracing::debug!("[Console] status: {}", message);
        self.line(message);
    }

    fn progress(&self, percent: u8) {
        let percent = percent.min(100);
        if let Ok(mut last) = self.last_percent.lock() {
            if *last == Some(percent) {
                return;
            }
            *last = Some(percent);
        }
        if let Ok(mut out) = self.out.lock() {
            self.stop_spinner();
            let _ = write!(out, "\r  {:>3}%", percent);
            if percent == 100 {
                let _ = writeln!(out);
            }
            let _ = out.flush();
        }
    }

    fn complete(&self) {
        self.stop_spinner();
        if let Ok(mut last) = self.last_percent.lock() {
            *last = None;
        }
        self.line("✓ Update complete");
    }
}
