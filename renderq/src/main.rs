#[tokio::main]
async fn main() -> anyhow::Result<()> {
    renderq_lib::run().await
}
