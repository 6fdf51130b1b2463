pub mod delete;
pub mod serve;
pub mod status;

/// Logging for one-shot commands: compact, stderr, warnings and up unless
/// `RUST_LOG` says otherwise.
fn init_cli_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
