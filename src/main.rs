#[tokio::main]
async fn main() -> std::io::Result<()> {
    talename_extension::run_with_config().await
}
