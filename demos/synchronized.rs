use std::time::Duration;

use slotrace::{Config, Synchronized};
use tracing_subscriber::EnvFilter;

fn main() -> slotrace::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_thread_names(true)
        .init();

    // One advance per burst, every step under the MCS lock.
    let config = Config::synchronized().with_delay(Duration::ZERO);

    let report = Synchronized::new(config)?.run()?;
    println!("{report}");
    Ok(())
}
