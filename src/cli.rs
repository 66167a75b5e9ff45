//! 런처 명령줄
//!
//! ## 사용법
//! ```text
//! forge-launcher                              # 업데이트 후 게임 실행 (run)
//! forge-launcher check                        # 업데이트 확인만
//! forge-launcher check --json                 # JSON 출력
//! forge-launcher status                       # 설치 상태
//! forge-launcher config                       # 설정 표시
//! forge-launcher config set <key> <value>     # 설정 변경
//! forge-launcher --config <path> <command>    # 설정 파일 지정
//! ```
//!
//! ## 종료 코드
//! - `run`: `0` 실행됨, `1` 에러
//! - `check`: `0` 업데이트 있음, `1` 에러, `2` 최신 상태

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use forge_updater_lib::{
    CycleOutcome, NullSink, ProcessLauncher, UpdateDecision, UpdateOrchestrator, VersionStore,
};

use crate::config::{config_file_path, describe, load_config, set_config_value};
use crate::console::ConsoleFeed;

pub const EXIT_OK: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_UP_TO_DATE: i32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run,
    Check { json: bool },
    Status,
    ConfigShow,
    ConfigSet { key: String, value: String },
    Help,
    Version,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub command: Command,
}

impl CliArgs {
    /// 프로그램 이름을 뺀 인자 목록 파싱
    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config_path = None;
        let mut rest = Vec::new();
        let mut iter = args.into_iter().map(Into::into);

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    let path = iter
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--config requires a path"))?;
                    config_path = Some(PathBuf::from(path));
                }
                _ => rest.push(arg),
            }
        }

        let words: Vec<&str> = rest.iter().map(String::as_str).collect();
        let command = match words.as_slice() {
            [] | ["run"] => Command::Run,
            ["check", flags @ ..] => {
                if let Some(bad) = flags.iter().find(|f| **f != "--json") {
                    anyhow::bail!("Unknown flag for check: {}", bad);
                }
                Command::Check {
                    json: flags.contains(&"--json"),
                }
            }
            ["status"] => Command::Status,
            ["config"] => Command::ConfigShow,
            ["config", "set", key, value @ ..] if !value.is_empty() => Command::ConfigSet {
                key: key.to_string(),
                value: value.join(" "),
            },
            ["config", "set", ..] => {
                anyhow::bail!("Usage: forge-launcher config set <key> <value>")
            }
            ["help" | "--help" | "-h"] => Command::Help,
            ["--version" | "-V"] => Command::Version,
            [other, ..] => anyhow::bail!(
                "Unknown command: {}\n  Run 'forge-launcher help' for usage.",
                other
            ),
        };

        Ok(Self {
            config_path,
            command,
        })
    }
}

/// 명령 실행 후 종료 코드 반환
pub async fn run(args: CliArgs) -> Result<i32> {
    match args.command {
        Command::Help => {
            print_help();
            Ok(EXIT_OK)
        }
        Command::Version => {
            println!("forge-launcher {}", env!("CARGO_PKG_VERSION"));
            Ok(EXIT_OK)
        }
        Command::ConfigShow => cmd_config_show(args.config_path),
        Command::ConfigSet { key, value } => {
            let path = config_file_path(args.config_path.as_deref());
            set_config_value(&path, &key, &value)?;
            println!("✓ {} = {}", key, value);
            Ok(EXIT_OK)
        }
        Command::Status => cmd_status(args.config_path),
        Command::Check { json } => cmd_check(args.config_path, json).await,
        Command::Run => cmd_run(args.config_path).await,
    }
}

// ═══════════════════════════════════════════════════════
// 명령어 핸들러
// ═══════════════════════════════════════════════════════

async fn cmd_run(config_path: Option<PathBuf>) -> Result<i32> {
    let cfg = load_config(config_path.as_deref())?;
    let exit_delay = Duration::from_millis(cfg.exit_delay_ms);

    let feed = Arc::new(ConsoleFeed::stderr());
    let mut orchestrator =
        UpdateOrchestrator::new(cfg, feed.clone(), Arc::new(ProcessLauncher::new()))?;

    let spinner = feed.start_spinner("Checking for updates...");
    let outcome = orchestrator.run_cycle().await;
    feed.stop_spinner();
    let _ = spinner.await;

    match outcome {
        CycleOutcome::Done(summary) => {
            tracing::info!(
                "[CLI] {} {} via {:?} (pid {:?})",
                summary.executable.display(),
                summary.version,
                summary.route,
                summary.launch.pid()
            );
            // 게임이 떴으면 잠시 후 런처 종료
            tokio::time::sleep(exit_delay).await;
            Ok(EXIT_OK)
        }
        CycleOutcome::Error { phase, error } => {
            tracing::error!("[CLI] Update cycle failed during {}: {}", phase, error);
            Ok(EXIT_ERROR)
        }
    }
}

async fn cmd_check(config_path: Option<PathBuf>, json: bool) -> Result<i32> {
    let cfg = load_config(config_path.as_deref())?;
    let mut orchestrator =
        UpdateOrchestrator::new(cfg, Arc::new(NullSink), Arc::new(ProcessLauncher::new()))?;

    let report = match orchestrator.check().await {
        Ok(report) => report,
        Err(e) => {
            if json {
                println!("{}", serde_json::json!({ "ok": false, "error": e.to_string() }));
            } else {
                eprintln!("✗ Check failed: {}", e.user_message());
            }
            return Ok(EXIT_ERROR);
        }
    };

    let code = if report.decision.is_update() {
        EXIT_OK
    } else {
        EXIT_UP_TO_DATE
    };

    if json {
        let mut value = serde_json::to_value(&report)?;
        if let Some(obj) = value.as_object_mut() {
            obj.insert("ok".into(), serde_json::Value::Bool(true));
            obj.insert("update_available".into(), serde_json::Value::Bool(code == EXIT_OK));
        }
        println!("{}", value);
        return Ok(code);
    }

    let installed = report
        .installed
        .map_or_else(|| "(none)".to_string(), |v| v.to_string());
    match &report.decision {
        UpdateDecision::AlreadyCurrent => {
            println!("✓ Up to date ({})", installed);
        }
        UpdateDecision::ApplyPatch(job) => {
            println!("📦 Update available: {} → {} (patch)", job.from, job.to);
            println!("  Patch: {}", job.patch_url);
        }
        UpdateDecision::FullDownload { url, version } => {
            println!("📦 Update available: {} → {} (full download)", installed, version);
            println!("  Build: {}", url);
        }
    }
    Ok(code)
}

fn cmd_status(config_path: Option<PathBuf>) -> Result<i32> {
    let cfg = load_config(config_path.as_deref())?;
    let store = VersionStore::new(cfg.marker_path());
    let executable = cfg.executable_path();

    let installed = match store.read() {
        Ok(Some(v)) => v.to_string(),
        Ok(None) => "(not installed)".to_string(),
        Err(e) => format!("(unreadable: {})", e),
    };

    println!("📋 Install Status");
    println!("─────────────────────────────────────────────");
    println!("  Installed version: {}", installed);
    println!("  Install dir:       {}", cfg.install_dir().display());
    println!(
        "  Executable:        {} ({})",
        executable.display(),
        if executable.is_file() { "present" } else { "missing" }
    );
    Ok(EXIT_OK)
}

fn cmd_config_show(config_path: Option<PathBuf>) -> Result<i32> {
    let path = config_file_path(config_path.as_deref());
    let cfg = load_config(config_path.as_deref())?;

    println!("📋 Launcher Configuration ({})", path.display());
    println!("─────────────────────────────────────────────");
    for (key, value) in describe(&cfg) {
        println!("  {:<22}{}", format!("{}:", key), value);
    }
    Ok(EXIT_OK)
}

fn print_help() {
    println!("forge-launcher — self-updating game launcher");
    println!();
    println!("USAGE:");
    println!("  forge-launcher [--config <path>] [command]");
    println!();
    println!("COMMANDS:");
    println!("  run                         Update if needed, then launch the game (default)");
    println!("  check                       Check for an update without changing anything");
    println!("  check --json                Check and output JSON");
    println!("  status                      Show installed version and paths");
    println!("  config                      Show launcher configuration");
    println!("  config set <key> <value>    Change a config value");
    println!("  help                        This help message");
    println!("  --version                   Print the launcher version");
    println!();
    println!("ENVIRONMENT:");
    println!("  FORGE_LISTING_URL, FORGE_ACCESS_TOKEN, FORGE_INSTALL_DIR override the config file");
    println!("  RUST_LOG                    Log filter (default: info)");
    println!();
    println!("EXAMPLES:");
    println!("  forge-launcher config set listing_url https://storage.example/o?prefix=ProjectWhy");
    println!("  forge-launcher check --json");
}
