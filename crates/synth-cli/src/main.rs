mod cli;
mod error;
mod pipeline;

use clap::Parser;

fn main() {
    let cli = cli::Cli::parse();
    cli.init_logging();
    if let Err(e) = cli.run() {
        eprintln!("[spps] {e}");
        std::process::exit(e.exit_code());
    }
}
