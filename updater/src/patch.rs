//! 바이너리 델타 패치 적용
//!
//! ## 적용 방식 (설정으로 선택)
//! - **Bsdiff**: 프로세스 내 `qbsdiff` 라이브러리 (BSDIFF40 형식)
//! - **ExternalTool**: 외부 델타 도구 실행. 인자 템플릿의 `{source}`, `{patch}`, `{output}`을 치환
//!
//! 결과는 대상 파일과 같은 디렉터리의 임시 경로에 먼저 만들고, 성공한 뒤에만
//! 대상 위치로 rename 합니다. 출력 경로가 기존 실행 파일과 같아도 실패 시 원본은 그대로입니다.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use crate::config::{LauncherConfig, PatchStrategyKind};
use crate::error::{Result, UpdaterError};

/// 델타 적용 전략
pub trait PatchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `source` + `patch` → `output` (output은 아직 존재하지 않는 경로)
    fn apply(&self, source: &Path, patch: &Path, output: &Path) -> Result<()>;
}

/// 프로세스 내 bsdiff 적용
#[derive(Debug, Default, Clone, Copy)]
pub struct BsdiffStrategy;

impl PatchStrategy for BsdiffStrategy {
    fn name(&self) -> &'static str {
        "bsdiff"
    }

    fn apply(&self, source: &Path, patch: &Path, output: &Path) -> Result<()> {
        let source_bytes =
            std::fs::read(source).map_err(|e| UpdaterError::from_io(e, "read patch source", source))?;
        let patch_bytes =
            std::fs::read(patch).map_err(|e| UpdaterError::from_io(e, "read patch file", patch))?;

        let patcher = qbsdiff::Bspatch::new(&patch_bytes).map_err(|e| UpdaterError::Patch {
            cause: format!("invalid bsdiff patch {}: {}", patch.display(), e),
        })?;
        let expected_size = patcher.hint_target_size();

        let file = std::fs::File::create(output)
            .map_err(|e| UpdaterError::from_io(e, "create patch output", output))?;
        let mut writer = BufWriter::new(file);
        let written = patcher
            .apply(&source_bytes, &mut writer)
            .map_err(|e| UpdaterError::Patch {
                cause: format!("bspatch failed: {}", e),
            })?;
        writer
            .flush()
            .map_err(|e| UpdaterError::from_io(e, "flush patch output", output))?;

        if written != expected_size {
            return Err(UpdaterError::Patch {
                cause: format!("patched size {} does not match header size {}", written, expected_size),
            });
        }
        Ok(())
    }
}

/// 외부 델타 도구 실행 (예: `xdelta3 -d -s <source> <patch> <output>`)
#[derive(Debug, Clone)]
pub struct ExternalToolStrategy {
    program: String,
    args: Vec<String>,
}

impl ExternalToolStrategy {
    pub fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
        }
    }

    pub fn render_args(&self, source: &Path, patch: &Path, output: &Path) -> Vec<String> {
        let source = source.to_string_lossy();
        let patch = patch.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{source}", &source)
                    .replace("{patch}", &patch)
                    .replace("{output}", &output)
            })
            .collect()
    }
}

impl PatchStrategy for ExternalToolStrategy {
    fn name(&self) -> &'static str {
        "external"
    }

    fn apply(&self, source: &Path, patch: &Path, output: &Path) -> Result<()> {
        let args = self.render_args(source, patch, output);
        tracing::debug!("[Patch] Running {} {:?}", self.program, args);

        let result = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| UpdaterError::Patch {
                cause: format!("failed to run {}: {}", self.program, e),
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(UpdaterError::Patch {
                cause: format!(
                    "{} exited with {}: {}",
                    self.program,
                    result.status,
                    stderr.trim().chars().take(300).collect::<String>()
                ),
            });
        }
        Ok(())
    }
}

/// 설정에 맞는 전략 생성
pub fn strategy_from_config(config: &LauncherConfig) -> Result<Arc<dyn PatchStrategy>> {
    match config.patch_strategy {
        PatchStrategyKind::Bsdiff => Ok(Arc::new(BsdiffStrategy)),
        PatchStrategyKind::External => {
            let program = config
                .patch_tool
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .ok_or_else(|| UpdaterError::Config("patch_tool is not configured".into()))?;
            Ok(Arc::new(ExternalToolStrategy::new(program, config.patch_tool_args.clone())))
        }
    }
}

/// 패치 적용기: 사전 조건 확인, 임시 경로 적용, 원자적 교체
#[derive(Clone)]
pub struct PatchApplier {
    strategy: Arc<dyn PatchStrategy>,
    min_source_size: u64,
}

impl PatchApplier {
    pub fn new(strategy: Arc<dyn PatchStrategy>, min_source_size: u64) -> Self {
        Self {
            strategy,
            min_source_size,
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn apply(&self, old_executable: &Path, patch_path: &Path, out_path: &Path) -> Result<()> {
        self.check_prerequisites(old_executable)?;
        if !patch_path.is_file() {
            return Err(UpdaterError::Patch {
                cause: format!("patch file {} does not exist", patch_path.display()),
            });
        }

        let out_dir = out_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        // 같은 파일 시스템에서 rename 하도록 대상 디렉터리 안에 임시 디렉터리
        let staging = tempfile::Builder::new()
            .prefix(".patch-")
            .tempdir_in(out_dir)
            .map_err(|e| UpdaterError::from_io(e, "create patch staging dir", out_dir))?;
        let staged_out = staging.path().join(
            out_path
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("patched.bin")),
        );

        tracing::info!(
            "[Patch] Applying {} to {} ({})",
            patch_path.display(),
            old_executable.display(),
            self.strategy.name()
        );
        self.strategy.apply(old_executable, patch_path, &staged_out)?;

        match std::fs::metadata(&staged_out) {
            Ok(meta) if meta.len() > 0 => {}
            _ => {
                return Err(UpdaterError::Patch {
                    cause: format!("{} produced no output", self.strategy.name()),
                })
            }
        }
        copy_permissions(old_executable, &staged_out)?;

        replace_with_retry(&staged_out, out_path, 5)?;

        // 적용기가 성공한 뒤에만 패치 파일 삭제
        if let Err(e) = std::fs::remove_file(patch_path) {
            tracing::warn!("[Patch] Could not delete {}: {}", patch_path.display(), e);
        }
        tracing::info!("[Patch] Patched executable written to {}", out_path.display());
        Ok(())
    }

    fn check_prerequisites(&self, old_executable: &Path) -> Result<()> {
        let meta = std::fs::metadata(old_executable).map_err(|e| UpdaterError::Prereq {
            path: old_executable.to_path_buf(),
            message: format!("installed executable not readable: {}", e),
        })?;
        if !meta.is_file() {
            return Err(UpdaterError::Prereq {
                path: old_executable.to_path_buf(),
                message: "installed executable is not a file".into(),
            });
        }
        if meta.len() < self.min_source_size {
            return Err(UpdaterError::Prereq {
                path: old_executable.to_path_buf(),
                message: format!(
                    "installed executable is {} bytes, expected at least {}",
                    meta.len(),
                    self.min_source_size
                ),
            });
        }
        Ok(())
    }
}

#[cfg(unix)]
fn copy_permissions(from: &Path, to: &Path) -> Result<()> {
    let perms = std::fs::metadata(from)
        .map_err(|e| UpdaterError::from_io(e, "stat patch source", from))?
        .permissions();
    std::fs::set_permissions(to, perms).map_err(|e| UpdaterError::from_io(e, "chmod patch output", to))
}

#[cfg(not(unix))]
fn copy_permissions(_from: &Path, _to: &Path) -> Result<()> {
    Ok(())
}

/// Windows에서 실행 파일이 잠깐 잠겨 있을 수 있으므로 지수 백오프로 재시도
fn replace_with_retry(from: &Path, to: &Path, max_retries: u32) -> Result<()> {
    let mut last_err = None;
    for attempt in 0..=max_retries {
        match std::fs::rename(from, to) {
            Ok(()) => return Ok(()),
            Err(e) => {
                if attempt < max_retries {
                    let delay = std::time::Duration::from_millis(200 * 2u64.pow(attempt));
                    tracing::warn!(
                        "[Patch] rename {} -> {} failed (attempt {}/{}): {}, retrying in {:?}",
                        from.display(),
                        to.display(),
                        attempt + 1,
                        max_retries + 1,
                        e,
                        delay
                    );
                    std::thread::sleep(delay);
                }
                last_err = Some(e);
            }
        }
    }
    Err(UpdaterError::from_io(
        last_err.unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "rename failed")),
        "replace executable",
        to,
    ))
}
