//! API server command.

use anyhow::Result;
use tracing::info;

use super::open_state;
use crate::web::WebServer;

pub async fn run(host: Option<String>, port: Option<u16>) -> Result<()> {
    let (state, _root) = open_state().await?;

    let count = state.catalog.count().await?;
    if count == 0 {
        println!("Warning: the catalog is empty. Run 'examsearch import <file>' to load questions.");
    }

    let host = host.unwrap_or_else(|| state.config.server.host.clone());
    let port = port.unwrap_or(state.config.server.port);
    info!(questions = count, "Starting examsearch API");

    WebServer::new(state).start(&host, port).await
}
