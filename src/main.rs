use clap::Parser;
use clap::error::ErrorKind;
use dimuon_selector::cli::{self, Args};
use std::process;

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(error) => {
            let code = match error.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            // Help goes to stdout, usage errors to stderr
            let _ = error.print();
            process::exit(code);
        }
    };

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    match runtime.block_on(cli::run(args)) {
        Ok(_result) => process::exit(0),
        Err(error) => {
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}
