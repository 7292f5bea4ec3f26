use std::process::ExitCode;

fn main() -> ExitCode {
    soof_cli::run()
}
