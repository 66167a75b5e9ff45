//! 게임 실행
//!
//! 설치된 실행 파일을 런처와 분리된 프로세스로 띄웁니다 (표준 입출력은 null).
//! 종료는 백그라운드 태스크가 지켜보다가 비정상 종료 시 경고 상태만 내보냅니다.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::error::{Result, UpdaterError};
use crate::events::StatusSink;

/// 실행된 게임 프로세스 핸들
#[derive(Debug)]
pub struct LaunchHandle {
    pid: Option<u32>,
    exit: Option<JoinHandle<Option<i32>>>,
}

impl LaunchHandle {
    /// 종료를 관찰하지 않는 핸들 (테스트용 런처 등)
    pub fn detached(pid: Option<u32>) -> Self {
        Self { pid, exit: None }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// 프로세스 종료까지 대기. 종료 코드를 알 수 없으면 `None`
    pub async fn wait(self) -> Option<i32> {
        match self.exit {
            Some(task) => task.await.ok().flatten(),
            None => None,
        }
    }
}

/// 실행기 인터페이스 (오케스트레이터에 주입)
pub trait Launch: Send + Sync {
    fn launch(&self, executable: &Path, sink: Arc<dyn StatusSink>) -> Result<LaunchHandle>;
}

/// 실제 프로세스 실행기
#[derive(Debug, Default, Clone)]
pub struct ProcessLauncher {
    args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_args(args: Vec<String>) -> Self {
        Self { args }
    }
}

impl Launch for ProcessLauncher {
    fn launch(&self, executable: &Path, sink: Arc<dyn StatusSink>) -> Result<LaunchHandle> {
        let launch_err = |message: String| UpdaterError::Launch {
            path: executable.to_path_buf(),
            message,
        };

        if !executable.is_file() {
            return Err(launch_err("executable not found".into()));
        }

        let mut cmd = std::process::Command::new(executable);
        cmd.args(&self.args);
        if let Some(dir) = executable.parent() {
            cmd.current_dir(dir);
        }

        // DETACHED_PROCESS | CREATE_BREAKAWAY_FROM_JOB | CREATE_NEW_PROCESS_GROUP
        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            cmd.creation_flags(0x00000008 | 0x01000000 | 0x00000200);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

        let mut child = tokio::process::Command::from(cmd)
            .spawn()
            .map_err(|e| launch_err(e.to_string()))?;
        let pid = child.id();
        tracing::info!("[Launcher] Started {} (pid {:?})", executable.display(), pid);

        let path = executable.to_path_buf();
        let exit = tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    tracing::info!("[Launcher] {} exited normally", path.display());
                    status.code()
                }
                Ok(status) => {
                    tracing::warn!("[Launcher] {} exited with {}", path.display(), status);
                    sink.status("Game exited unexpectedly.");
                    status.code()
                }
                Err(e) => {
                    tracing::warn!("[Launcher] Failed to wait for {}: {}", path.display(), e);
                    None
                }
            }
        });

        Ok(LaunchHandle {
            pid,
            exit: Some(exit),
        })
    }
}

/// 실행 요청만 기록하는 실행기 (테스트/`check` 용)
#[derive(Debug, Default, Clone)]
pub struct RecordingLauncher {
    launched: Arc<Mutex<Vec<PathBuf>>>,
    fail: bool,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 항상 `LaunchError`를 돌려주는 실행기
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn launched(&self) -> Vec<PathBuf> {
        self.launched.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl Launch for RecordingLauncher {
    fn launch(&self, executable: &Path, _sink: Arc<dyn StatusSink>) -> Result<LaunchHandle> {
        if self.fail {
            return Err(UpdaterError::Launch {
                path: executable.to_path_buf(),
                message: "launch refused".into(),
            });
        }
        if let Ok(mut launched) = self.launched.lock() {
            launched.push(executable.to_path_buf());
        }
        Ok(LaunchHandle::detached(None))
    }
}
