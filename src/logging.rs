use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber. `RUST_LOG` wins; otherwise `info`, or
/// `netlens=debug` / `trace` with increasing verbosity.
pub fn init(verbosity: u8) {
    let fallback = match verbosity {
        0 => "info",
        1 => "info,netlens=debug",
        _ => "info,netlens=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    // a subscriber may already be installed when embedded
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
