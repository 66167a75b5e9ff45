//! 빌드 버전 (major.minor.patch) 파싱과 비교
//!
//! 원격 빌드 이름과 로컬 마커 파일은 항상 숫자 세 자리만 사용합니다.
//! 비교는 컴포넌트별 정수 비교이며 문자열 정렬이 아닙니다 ("0.10.0" > "0.9.0").

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 빌드 버전: 필드 순서대로 사전식 비교되므로 `Ord` derive가 곧 숫자 비교다
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

/// 버전 문자열이 `<숫자>.<숫자>.<숫자>` 형식이 아닐 때
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version string '{input}'")]
pub struct ParseVersionError {
    pub input: String,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch }
    }

    /// "1.2.3" 형식을 파싱 (앞뒤 공백은 무시)
    pub fn parse(s: &str) -> Result<Self, ParseVersionError> {
        let trimmed = s.trim();
        let err = || ParseVersionError { input: s.to_string() };

        let mut parts = trimmed.split('.');
        let mut next = || -> Result<u64, ParseVersionError> {
            let part = parts.next().ok_or_else(err)?;
            // u64::from_str는 '+' 부호를 허용하므로 숫자만 직접 확인
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(err());
            }
            part.parse().map_err(|_| err())
        };

        let major = next()?;
        let minor = next()?;
        let patch = next()?;
        if parts.next().is_some() {
            return Err(err());
        }

        Ok(Self { major, minor, patch })
    }

    pub fn is_newer_than(&self, other: &Version) -> bool {
        self > other
    }
}

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Version::parse(&s).map_err(serde::de::Error::custom)
    }
}
