mod cli;
mod exit_codes;
mod logging;
mod run;

use clap::Parser;
use tradebench_core::Registry;

use crate::exit_codes::ExitCode;

#[tokio::main]
async fn main() {
    let cli = match cli::Cli::try_parse() {
        Ok(v) => v,
        Err(err) => {
            use clap::error::ErrorKind;
            let _ = err.print();
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::Success,
                _ => ExitCode::InvalidInput,
            };
            std::process::exit(code.as_i32());
        }
    };

    let code = match cli.command {
        cli::Command::Run(args) => {
            logging::init(args.verbose);
            match run::run(args).await {
                Ok(code) => code,
                Err(err) => {
                    tracing::error!("{err}");
                    err.exit_code()
                }
            }
        }
        cli::Command::List => {
            run::list(&Registry::builtin());
            ExitCode::Success
        }
    };

    std::process::exit(code.as_i32());
}
