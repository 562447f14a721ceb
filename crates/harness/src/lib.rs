pub mod database;
pub mod fixtures;

pub use database::TestDb;
pub use fixtures::{row, Fixtures};

/// Installs a `tracing` subscriber honoring `RUST_LOG`. Safe to call from
/// every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
