#[tokio::main]
async fn main() -> anyhow::Result<()> {
    visual_search_server::run().await
}
