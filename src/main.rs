#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = lms_exam::run().await {
        eprintln!("lms-exam fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
