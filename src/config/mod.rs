//! 런처 설정 파일 관리
//!
//! `launcher.toml`(실행 파일 옆), `config/launcher.toml`(CWD), 또는 `--config <path>`에서
//! 설정을 읽습니다. 파일이 없으면 기본값을 쓰고, 일부 키는 환경 변수로 덮어쓸 수 있습니다.

use std::path::{Path, PathBuf};

use anyhow::Result;
use forge_updater_lib::{LauncherConfig, PatchStrategyKind};

pub const CONFIG_FILE_NAME: &str = "launcher.toml";

/// 환경 변수 → 설정 키
pub const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("FORGE_LISTING_URL", "listing_url"),
    ("FORGE_ACCESS_TOKEN", "access_token"),
    ("FORGE_INSTALL_DIR", "install_dir"),
];

const STRING_KEYS: &[&str] = &[
    "listing_url",
    "download_base_url",
    "access_token",
    "product",
    "platform",
    "executable_name",
    "install_dir",
    "marker_file",
    "patch_tool",
];

const INTEGER_KEYS: &[&str] = &[
    "min_executable_size",
    "request_timeout_secs",
    "progress_interval_ms",
    "exit_delay_ms",
];

/// 설정 파일 경로 결정
pub fn config_file_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    // 1. 실행 파일 옆 launcher.toml
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let cfg = dir.join(CONFIG_FILE_NAME);
            if cfg.exists() {
                return cfg;
            }
        }
    }

    // 2. CWD의 config/launcher.toml (없으면 생성용 기본 경로)
    PathBuf::from("config").join(CONFIG_FILE_NAME)
}

/// 파일 + 환경 변수에서 설정 로드
pub fn load_config(explicit: Option<&Path>) -> Result<LauncherConfig> {
    let path = config_file_path(explicit);
    let mut cfg = load_config_file(&path)?;
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    Ok(cfg)
}

/// 파일만 읽기 (없으면 기본값)
pub fn load_config_file(path: &Path) -> Result<LauncherConfig> {
    if !path.exists() {
        tracing::debug!("[Config] {} not found, using defaults", path.display());
        return Ok(LauncherConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let cfg = LauncherConfig::from_toml_str(&content)?;
    tracing::info!("[Config] Loaded {}", path.display());
    Ok(cfg)
}

/// 환경 변수 덮어쓰기. 빈 값은 무시
pub fn apply_env_overrides<F>(cfg: &mut LauncherConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    for (var, key) in ENV_OVERRIDES {
        let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        tracing::debug!("[Config] {} overridden by {}", key, var);
        match *key {
            "listing_url" => cfg.listing_url = value,
            "access_token" => cfg.access_token = Some(value),
            "install_dir" => cfg.install_dir = Some(value),
            _ => {}
        }
    }
}

/// config set <key> <value>
pub fn set_config_value(path: &Path, key: &str, value: &str) -> Result<()> {
    let mut table: toml::value::Table = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        content
            .parse::<toml::Value>()?
            .as_table()
            .cloned()
            .unwrap_or_default()
    } else {
        toml::value::Table::new()
    };

    let toml_val = if STRING_KEYS.contains(&key) {
        toml::Value::String(value.to_string())
    } else if INTEGER_KEYS.contains(&key) {
        // 필드는 u64지만 TOML 정수는 i64
        let parsed = value
            .parse::<u64>()
            .ok()
            .and_then(|v| i64::try_from(v).ok())
            .ok_or_else(|| anyhow::anyhow!("Invalid integer value: '{}'", value))?;
        toml::Value::Integer(parsed)
    } else if key == "patch_strategy" {
        match value {
            "bsdiff" | "external" => toml::Value::String(value.to_string()),
            _ => anyhow::bail!("Invalid patch_strategy: '{}' (use bsdiff/external)", value),
        }
    } else if key == "patch_tool_args" {
        toml::Value::Array(
            value
                .split_whitespace()
                .map(|a| toml::Value::String(a.to_string()))
                .collect(),
        )
    } else {
        anyhow::bail!(
            "Unknown config key: '{}'\nAvailable: {}, patch_strategy, patch_tool_args",
            key,
            STRING_KEYS.iter().chain(INTEGER_KEYS).copied().collect::<Vec<_>>().join(", ")
        );
    };

    table.insert(key.to_string(), toml_val);
    let content = toml::to_string_pretty(&toml::Value::Table(table))?;
    // 쓰기 전에 결과 파일이 다시 읽히는지 확인
    LauncherConfig::from_toml_str(&content)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    tracing::info!("[Config] {} updated in {}", key, path.display());
    Ok(())
}

/// `config` 출력용 (토큰은 가림)
pub fn describe(cfg: &LauncherConfig) -> Vec<(&'static str, String)> {
    let or_unset = |v: Option<&str>| v.filter(|s| !s.is_empty()).unwrap_or("(not set)").to_string();
    vec![
        ("listing_url", if cfg.listing_url.is_empty() { "(not set)".into() } else { cfg.listing_url.clone() }),
        ("download_base_url", or_unset(cfg.download_base_url.as_deref())),
        (
            "access_token",
            if cfg.access_token.as_deref().map_or(true, str::is_empty) { "(not set)".into() } else { "********".into() },
        ),
        ("product", cfg.product.clone()),
        ("platform", cfg.platform.clone()),
        ("executable_name", cfg.executable_name.clone()),
        ("install_dir", cfg.install_dir().display().to_string()),
        ("marker_file", cfg.marker_file.clone()),
        ("min_executable_size", cfg.min_executable_size.to_string()),
        (
            "patch_strategy",
            match cfg.patch_strategy {
                PatchStrategyKind::Bsdiff => "bsdiff".into(),
                PatchStrategyKind::External => "external".into(),
            },
        ),
        ("patch_tool", or_unset(cfg.patch_tool.as_deref())),
        ("patch_tool_args", cfg.patch_tool_args.join(" ")),
        ("request_timeout_secs", cfg.request_timeout_secs.to_string()),
        ("progress_interval_ms", cfg.progress_interval_ms.to_string()),
        ("exit_delay_ms", cfg.exit_delay_ms.to_string()),
    ]
}
