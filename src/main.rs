use docgraph::pipeline::{PipelineService, RetryPolicy, SummaryGraph};
use docgraph::{api, cache, config, embedding, llm, loader, logging, vectordb, websearch};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    config::init_config();
    logging::init_tracing();

    let graph = build_graph().await.expect("Failed to wire pipeline ports");
    let service = Arc::new(PipelineService::new(graph));
    let app = api::create_router(service);

    let (listener, port) = bind_listener().await.expect("Failed to bind listener");
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.unwrap();
}

async fn build_graph() -> Result<SummaryGraph, Box<dyn std::error::Error>> {
    let config = config::get_config();

    let loader = Arc::new(loader::PdfLoader::new());
    let store = Arc::new(vectordb::QdrantStore::new(embedding::get_embedding_client())?);
    let model = llm::get_language_model();
    let summaries = Arc::new(cache::RedisSummaryCache::connect().await?);
    let web = Arc::new(websearch::TavilyClient::new());

    let mut retry = RetryPolicy::default();
    if let Some(max_attempts) = config.retry_max_attempts {
        retry.max_attempts = max_attempts;
    }
    if let Some(backoff_ms) = config.retry_backoff_ms {
        retry.backoff = Duration::from_millis(backoff_ms);
    }

    Ok(SummaryGraph::new(loader, store, model, summaries, web, retry))
}

async fn bind_listener() -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    let config = config::get_config();
    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4200..=4299;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4200-4299",
    ))
}
