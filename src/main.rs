use forge_launcher::cli::{self, CliArgs, EXIT_ERROR};

#[tokio::main]
async fn main() {
    // 로깅은 stderr로 (stdout은 check --json 출력용)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let code = match CliArgs::parse(std::env::args().skip(1)) {
        Ok(args) => match cli::run(args).await {
            Ok(code) => code,
            Err(e) => {
                eprintln!("✗ Error: {:#}", e);
                EXIT_ERROR
            }
        },
        Err(e) => {
            eprintln!("✗ {}", e);
            EXIT_ERROR
        }
    };
    std::process::exit(code);
}
