//! SHA-256 무결성 검증

use std::fs::File;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{Result, UpdaterError};

/// 파일의 SHA-256 (소문자 hex). 큰 실행 파일도 메모리에 통째로 올리지 않고 스트리밍
pub fn digest(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| UpdaterError::from_io(e, "open for digest", path))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| UpdaterError::from_io(e, "read for digest", path))?;
    Ok(hex::encode(hasher.finalize()))
}

/// 대소문자와 앞뒤 공백은 무시하고 비교
pub fn verify(path: &Path, expected_hex: &str) -> Result<bool> {
    let actual = digest(path)?;
    Ok(actual.eq_ignore_ascii_case(expected_hex.trim()))
}

/// `verify`와 같지만 불일치를 `Verification` 에러로 돌려준다
pub fn ensure_digest(path: &Path, expected_hex: &str) -> Result<()> {
    let actual = digest(path)?;
    if actual.eq_ignore_ascii_case(expected_hex.trim()) {
        Ok(())
    } else {
        Err(UpdaterError::Verification {
            path: path.to_path_buf(),
            expected: expected_hex.trim().to_ascii_lowercase(),
            actual,
        })
    }
}

/// 사이드카 파일 내용(`<hex>  <filename>` 또는 `<hex>`)에서 digest 추출
pub fn parse_digest_sidecar(content: &str) -> Option<String> {
    let token = content.split_whitespace().next()?;
    if token.len() == 64 && token.bytes().all(|b| b.is_ascii_hexdigit()) {
        Some(token.to_ascii_lowercase())
    } else {
        None
    }
}
