//! Bridge child binary. Spawned by the host to run one plugin out of
//! process.
//!
//! ```text
//! consort-bridge <host-osc-url> <type> <filename> <label> [name]
//! ```

use consort_bridge::{engine_config_from_env, BridgeArgs, BridgeChild, BridgeError, USAGE};
use std::io::Read;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // stdout belongs to the host; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = match BridgeArgs::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\n{}", e, USAGE);
            return ExitCode::from(2);
        }
    };

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(label = %args.label, "bridge failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &BridgeArgs) -> Result<(), BridgeError> {
    let child = BridgeChild::start(args, engine_config_from_env())?;

    // The host holds our stdin open; EOF means it is gone.
    let quit = child.quit_handle();
    std::thread::Builder::new()
        .name("consort-bridge-stdin".into())
        .spawn(move || {
            let mut sink = [0u8; 64];
            let mut stdin = std::io::stdin();
            while matches!(stdin.read(&mut sink), Ok(n) if n > 0) {}
            tracing::debug!("host closed stdin");
            quit.quit();
        })?;

    child.run();
    Ok(())
}
