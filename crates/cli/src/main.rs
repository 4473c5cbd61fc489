use std::process::ExitCode;

fn main() -> ExitCode {
    menuwise_cli::run()
}
