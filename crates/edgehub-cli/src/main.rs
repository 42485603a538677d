//! edgehub - edge-node enrollment gateway.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    edgehub_cli::run().await
}
