use std::process::ExitCode;

fn main() -> ExitCode {
    draftpub_cli::run()
}
