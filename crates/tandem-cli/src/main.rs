use clap::Parser;
use tandem_cli::{CliArgs, TandemCli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let cli = TandemCli::from_args(&args)?;
    cli.run(args).await?;
    Ok(())
}
