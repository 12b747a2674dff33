use clap::Parser;

mod cli;

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    cli::logger::init(args.verbose);
    cli::run(args)
}
