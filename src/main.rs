//! CLI entry point for the bulk downloader.

use std::process::ExitCode;

mod app;
mod cli;

use app::exit_handler::ProcessExit;

#[tokio::main]
async fn main() -> ExitCode {
    match app::runtime::run_downloader().await {
        Ok(exit) => exit.into(),
        Err(error) => {
            eprintln!("Error: {error:#}");
            ProcessExit::Fatal.into()
        }
    }
}
