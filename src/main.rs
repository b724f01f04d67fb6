//! Feedguard CLI entry point.

use feedguard_lib::cli::{self, Cli};
use feedguard_lib::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli::execute(cli).await
}
