use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    random_tables_cli::main_entry().await
}
