use mock_server::{MockConfig, DEFAULT_COMMAND_LIMIT};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port = env_or("PORT", "3000");
    let command_limit = std::env::var("MOCK_COMMAND_LIMIT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(DEFAULT_COMMAND_LIMIT);
    let config = MockConfig::new(env_or("MOCK_REPOSITORY", "qwerty"), env_or("MOCK_TOKEN", "token"))
        .with_command_limit(command_limit);

    let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;
    mock_server::run(listener, config).await
}
