use clap::Parser;
use std::process::ExitCode;
use upstream_fixtures::{exit_code, Args};

fn main() -> ExitCode {
    upstream_core::logging::init();

    let args = Args::parse();
    tracing::debug!(?args, "upstream-fixture starting");

    exit_code(args.into_config().and_then(upstream_core::run_until_ctrl_c))
}
