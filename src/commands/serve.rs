use crate::config::AppConfig;
use crate::polygon::PolygonClient;
use crate::server::{self, AppState};
use anyhow::Result;
use log::info;

pub async fn run(config: &AppConfig, host: &str, port: u16) -> Result<()> {
    info!("Received serve command for {}:{}", host, port);

    let client = PolygonClient::new(config)?;
    let state = AppState {
        client,
        config: config.clone(),
    };
    server::serve(state, host, port).await
}
