//! Forge 런처: 설정 파일, 터미널 상태 표시, 명령줄
//!
//! 업데이트 엔진은 `forge_updater_lib`(`updater/`)에 있습니다.

pub mod cli;
pub mod config;
pub mod console;

pub use forge_updater_lib as updater;
