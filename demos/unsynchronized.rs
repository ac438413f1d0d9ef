use std::time::Duration;

use slotrace::{Config, Unsynchronized};
use tracing_subscriber::EnvFilter;

fn main() -> slotrace::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_thread_names(true)
        .init();

    // Two advances per burst and a 50 ms window between reading the tail and
    // writing it back. The drainer usually trips within a few seconds.
    let config = Config::unsynchronized()
        .with_burst(2)
        .with_delay(Duration::from_millis(50))
        .with_deadline(Duration::from_secs(30));

    let report = Unsynchronized::new(config)?.run()?;
    println!("{report}");
    println!("slots: {:?}", report.slots);
    Ok(())
}
