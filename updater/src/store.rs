//! 설치 버전 마커 저장소
//!
//! 마커는 버전 문자열 한 줄만 담은 텍스트 파일입니다. 파일이 없으면 미설치 상태.
//! 쓰기는 같은 디렉터리의 임시 파일에 쓴 뒤 rename으로 교체하므로
//! 중간에 죽어도 마커가 잘린 상태로 남지 않습니다.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, UpdaterError};
use crate::version::Version;

#[derive(Debug, Clone)]
pub struct VersionStore {
    path: PathBuf,
}

impl VersionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 마커를 읽는다. 없으면 `None`, 내용이 버전 형식이 아니면 `CorruptState`
    pub fn read(&self) -> Result<Option<Version>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                return Err(UpdaterError::CorruptState {
                    path: self.path.clone(),
                    content: String::from("<non-utf8>"),
                });
            }
            Err(e) => return Err(UpdaterError::from_io(e, "read marker", &self.path)),
        };

        Version::parse(&content)
            .map(Some)
            .map_err(|_| UpdaterError::CorruptState {
                path: self.path.clone(),
                content: content.trim().to_string(),
            })
    }

    /// 마커를 원자적으로 교체한다
    pub fn write(&self, version: &Version) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .map_err(|e| UpdaterError::from_io(e, "create marker directory", dir))?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".version-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| UpdaterError::from_io(e, "create temp marker", dir))?;
        tmp.write_all(version.to_string().as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| UpdaterError::from_io(e, "write temp marker", tmp.path()))?;

        // persist 실패 시 임시 파일은 drop에서 삭제된다
        tmp.persist(&self.path)
            .map_err(|e| UpdaterError::from_io(e.error, "replace marker", &self.path))?;

        tracing::info!("[VersionStore] Marker {} -> {}", self.path.display(), version);
        Ok(())
    }
}
