use processor::runtime::{boot, invoke};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    boot::init_logging();
    let invocation = boot::boot().await?;
    invoke::invoke_logged(invocation).await?;
    Ok(())
}
