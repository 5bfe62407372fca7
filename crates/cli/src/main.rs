use std::process::ExitCode;

fn main() -> ExitCode {
    libdesk_cli::run()
}
