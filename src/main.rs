use media_gateway::Config;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    // A bad or missing signing secret must abort startup, never limp into
    // serving requests.
    let config = match Config::load() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Invalid configuration: {error:#}");
            std::process::exit(1);
        }
    };

    media_gateway::run(config).await
}
