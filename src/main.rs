use clap::Parser;
use pmp_prompt_lab::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli::bootstrap();

    match cli.command {
        Command::Render(args) => cli::render::run(args, &config).await,
        Command::Lint(args) => cli::lint::run(args).await,
        Command::Create(args) => cli::create::run(args, &config).await,
        Command::Assign(args) => cli::assign::run(args),
        Command::Analyze(args) => cli::analyze::run(args),
    }
}
