//! Background removal CLI tool

use bgremoval::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}
