use pipeshell::{Repl, ShellConfig, logging};
use std::process::ExitCode;

fn main() -> ExitCode {
    let config = ShellConfig::from_env();
    if let Err(err) = logging::init(&config) {
        eprintln!("pipeshell: {err:#}");
    }

    let mut repl = Repl::new(config);
    match repl.run() {
        Ok(code) => ExitCode::from((code & 0xff) as u8),
        Err(err) => {
            eprintln!("pipeshell: {err:#}");
            ExitCode::FAILURE
        }
    }
}
