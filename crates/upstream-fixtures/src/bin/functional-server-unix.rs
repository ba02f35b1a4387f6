use std::process::ExitCode;
use upstream_core::Preset;

fn main() -> ExitCode {
    upstream_fixtures::run_preset(Preset::FunctionalServerUnix)
}
