mod cli;
mod executor;
mod exit_codes;
mod logging;
mod output;
mod run;
mod run_error;
mod web;

use clap::Parser;
use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() {
    let cli = match cli::Cli::try_parse() {
        Ok(v) => v,
        Err(err) => {
            use clap::error::ErrorKind;
            let _ = err.print();
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    exit_codes::ExitCode::Success.as_i32()
                }
                _ => exit_codes::ExitCode::InvalidInput.as_i32(),
            };
            std::process::exit(code);
        }
    };

    logging::init(&cli.log_level);

    let uri = cli.uri.as_str();
    let res = match cli.command {
        cli::Command::Flood(args) => run::flood(args, uri, cli.output).await,
        cli::Command::Seed(args) => run::seed(args, uri, cli.output).await,
        cli::Command::Mixed(args) => run::mixed(args, uri, cli.output).await,
        cli::Command::Lookup(args) => run::lookup(args, uri, cli.output).await,
        cli::Command::Dashboard(args) => run::dashboard(args, uri).await,
    };

    let code = match res {
        Ok(()) => exit_codes::ExitCode::Success.as_i32(),
        Err(err) => {
            eprintln!("{err}");
            err.exit_code().as_i32()
        }
    };

    std::process::exit(code);
}
