//! 전체 빌드 아카이브 설치
//!
//! zip을 설치 디렉터리에 풀고(같은 경로의 기존 파일은 덮어씀), 성공하면 아카이브를 지운 뒤
//! 고정 이름의 실행 파일 경로를 돌려줍니다. 실패 시 아카이브는 진단/재시도를 위해 남깁니다.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Result, UpdaterError};

#[derive(Debug, Clone)]
pub struct ArchiveInstaller {
    executable_name: String,
}

impl ArchiveInstaller {
    pub fn new(executable_name: &str) -> Self {
        Self {
            executable_name: executable_name.to_string(),
        }
    }

    pub fn install(&self, archive_path: &Path, extract_dir: &Path) -> Result<PathBuf> {
        tracing::info!(
            "[Archive] Extracting {} into {}",
            archive_path.display(),
            extract_dir.display()
        );

        let count = extract_zip(archive_path, extract_dir).map_err(|e| UpdaterError::Extraction {
            archive: archive_path.to_path_buf(),
            message: e.to_string(),
        })?;

        let executable = extract_dir.join(&self.executable_name);
        if !executable.is_file() {
            return Err(UpdaterError::Extraction {
                archive: archive_path.to_path_buf(),
                message: format!("archive does not contain {}", self.executable_name),
            });
        }
        ensure_executable(&executable)?;

        if let Err(e) = std::fs::remove_file(archive_path) {
            tracing::warn!("[Archive] Could not delete {}: {}", archive_path.display(), e);
        }

        tracing::info!("[Archive] Extracted {} entries, executable {}", count, executable.display());
        Ok(executable)
    }
}

/// zip을 대상 디렉터리에 해제하고 파일 수를 반환
fn extract_zip(archive_path: &Path, target_dir: &Path) -> zip::result::ZipResult<usize> {
    std::fs::create_dir_all(target_dir)?;

    let file = std::fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut files = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        // 디렉터리 밖으로 나가는 경로("../", 절대 경로)는 손상으로 간주
        let relative = entry.enclosed_name().map(Path::to_path_buf).ok_or_else(|| {
            zip::result::ZipError::InvalidArchive("entry path escapes extraction directory")
        })?;
        let out_path = target_dir.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut outfile = std::fs::File::create(&out_path)?;
        io::copy(&mut entry, &mut outfile)?;
        files += 1;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode & 0o777))?;
        }
    }

    Ok(files)
}

/// 유닉스에서는 실행 권한 보장
#[cfg(unix)]
fn ensure_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let meta = std::fs::metadata(path).map_err(|e| UpdaterError::from_io(e, "stat executable", path))?;
    let mode = meta.permissions().mode();
    if mode & 0o111 == 0 {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode | 0o755))
            .map_err(|e| UpdaterError::from_io(e, "chmod executable", path))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn ensure_executable(_path: &Path) -> Result<()> {
    Ok(())
}
