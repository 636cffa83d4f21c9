use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Structured logging to stdout. Safe to call more than once; only the
/// first subscriber wins.
pub fn init() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}
