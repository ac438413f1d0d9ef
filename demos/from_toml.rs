use std::{env, fs, process};

use slotrace::{Config, Error, Synchronized, Unsynchronized};
use tracing::error;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: from_toml <config.toml> [--synchronized]";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("{USAGE}");
        process::exit(2);
    };
    let synchronized = args.any(|arg| arg == "--synchronized");

    if let Err(err) = run(&path, synchronized) {
        error!(%err, path = %path, "run failed");
        process::exit(if err.is_config() { 2 } else { 1 });
    }
}

fn run(path: &str, synchronized: bool) -> Result<(), Error> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("cannot read {path}: {err}");
            process::exit(2);
        }
    };
    let config = Config::from_toml_str(&text)?;
    let report = match synchronized {
        true => Synchronized::new(config)?.run()?,
        false => Unsynchronized::new(config)?.run()?,
    };
    println!("{report}");
    Ok(())
}
