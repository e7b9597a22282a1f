use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    control_panel::run().await
}
