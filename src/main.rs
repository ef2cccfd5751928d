use clap::Parser;
use dbdialect_rs::cli::args::Cli;
use dbdialect_rs::cli::dispatch::handle;

fn main() {
    let cli = Cli::parse();
    handle(cli);
}
