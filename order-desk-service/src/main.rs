use order_desk_service::{Settings, create_app, telemetry::init_tracing};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let settings = Settings::from_env()?;
    let app = create_app(&settings).await;

    let listener = TcpListener::bind(&settings.bind_addr).await?;
    let addr = listener.local_addr()?;
    info!("Order desk service starting on {}", addr);
    info!("Telegram webhook: POST http://{}/telegram/webhook", addr);
    info!("Admin API: http://{}/api/orders", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
