use std::process::ExitCode;

use tracing::error;
use vaccel::{config::read_config, decode, logger};

fn main() -> ExitCode {
    let config = match read_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    logger::init_logger(&config.logger);

    match decode::run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
