//! VTS voice gateway entry point

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use vts_gateway_asr::{AsrSessionPool, AudioDumpSink, FileAudioDumpSink, NullAudioDumpSink, SimulatedAsrBackend};
use vts_gateway_config::{load_settings, PersistenceBackend, Settings};
use vts_gateway_llm::{AnalyzerBackend, AnalyzerBackendConfig, ClaudeAnalyzerBackend};
use vts_gateway_server::{
    connection_manager::ConnectionManager,
    init_metrics,
    router::MessageRouter,
    sink::{RouterTranscriptSink, WsSinkRegistry},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("VTS_GATEWAY_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => {
            eprintln!("loaded configuration (env: {})", env.as_deref().unwrap_or("default"));
            settings
        }
        Err(err) => {
            eprintln!("fatal: failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    init_tracing(&config);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting VTS voice gateway");
    tracing::info!(environment = ?config.runtime.environment, "configuration loaded");

    init_metrics();
    tracing::info!("Prometheus metrics initialized at /metrics");

    let persistence = init_persistence(&config).await?;

    let connections = Arc::new(ConnectionManager::with_config(
        persistence.connections.clone(),
        config.connection.ttl_seconds,
        config.connection.inactivity_health_seconds,
    ));
    let _health_sweep_shutdown = connections.start_health_sweep();

    let analyzer_backend = init_analyzer_backend(&config);
    let analyzer = Arc::new(vts_gateway_llm::Analyzer::new(analyzer_backend, config.llm.max_concurrent));

    let transcript_sink = Arc::new(RouterTranscriptSink::new());
    let audio_dump: Arc<dyn AudioDumpSink> = if config.save_audio_to_storage {
        tracing::warn!("saveAudioToStorage enabled: raw PCM chunks will be dumped to ./audio-dumps");
        Arc::new(FileAudioDumpSink::new("./audio-dumps"))
    } else {
        Arc::new(NullAudioDumpSink)
    };
    let asr = Arc::new(AsrSessionPool::with_audio_dump(
        Arc::new(SimulatedAsrBackend::new()),
        transcript_sink.clone(),
        config.asr.max_concurrent_sessions,
        audio_dump,
    ));

    let sinks = Arc::new(WsSinkRegistry::new());
    let router = Arc::new(MessageRouter::new(
        connections.clone(),
        asr.clone(),
        analyzer,
        persistence.conversations.clone(),
        sinks.clone(),
    ));
    transcript_sink.bind(router.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let host = config.server.host.clone();
    let state = AppState::new(config, connections, asr.clone(), router, sinks);

    let app = vts_gateway_server::create_router(state);

    tracing::info!(%addr, %host, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    asr.stop_all().await;
    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => tracing::info!("received SIGTERM, initiating graceful shutdown"),
    }
}

#[cfg(feature = "telemetry")]
fn init_tracing(config: &Settings) {
    use opentelemetry_otlp::WithExportConfig;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("vts_gateway={},tower_http=debug", config.observability.log_level).into());

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let json = config.observability.resolved_log_format(config.runtime.environment) == "json";
    let fmt_layer = if json { tracing_subscriber::fmt::layer().json().boxed() } else { tracing_subscriber::fmt::layer().boxed() };

    if let Ok(otlp_endpoint) = std::env::var("VTS_GATEWAY_OTLP_ENDPOINT") {
        match opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(&otlp_endpoint))
            .with_trace_config(opentelemetry_sdk::trace::Config::default().with_resource(opentelemetry_sdk::Resource::new(vec![
                opentelemetry::KeyValue::new("service.name", "vts-gateway"),
                opentelemetry::KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
        {
            Ok(tracer) => {
                let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
                subscriber.with(fmt_layer).with(otel_layer).init();
                tracing::info!(endpoint = %otlp_endpoint, "OpenTelemetry tracing enabled");
                return;
            }
            Err(err) => eprintln!("failed to initialize OpenTelemetry: {err}. falling back to console logging."),
        }
    }
    subscriber.with(fmt_layer).init();
}

#[cfg(not(feature = "telemetry"))]
fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("vts_gateway={},tower_http=debug", config.observability.log_level).into());

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let json = config.observability.resolved_log_format(config.runtime.environment) == "json";
    let fmt_layer = if json { tracing_subscriber::fmt::layer().json().boxed() } else { tracing_subscriber::fmt::layer().boxed() };
    subscriber.with(fmt_layer).init();
}

async fn init_persistence(config: &Settings) -> anyhow::Result<vts_gateway_persistence::PersistenceLayer> {
    if config.persistence.backend != PersistenceBackend::Scylla {
        tracing::info!("persistence backend: in-memory");
        return Ok(vts_gateway_persistence::init_in_memory());
    }

    let scylla_config = vts_gateway_persistence::ScyllaConfig {
        hosts: config.persistence.hosts.clone(),
        keyspace: config.persistence.keyspace.clone().unwrap_or_else(|| "vts_gateway".to_string()),
        replication_factor: config.persistence.replication_factor,
        connection_ttl_seconds: config.connection.ttl_seconds,
        conversation_item_ttl_days: config.conversation.item_ttl_days,
    };

    // A configured Scylla backend that fails to initialize is an
    // initialization failure, not a reason to silently downgrade
    // durability by falling back to an ephemeral in-memory store.
    vts_gateway_persistence::init(scylla_config).await.map_err(|err| {
        tracing::error!(error = %err, "failed to initialize ScyllaDB persistence");
        anyhow::anyhow!("failed to initialize configured ScyllaDB persistence backend: {err}")
    })
}

fn init_analyzer_backend(config: &Settings) -> Arc<dyn AnalyzerBackend> {
    let backend_config = AnalyzerBackendConfig {
        api_key: config.llm.api_key.clone().unwrap_or_default(),
        model: config.llm.model_id.clone().unwrap_or_else(|| "default".to_string()),
        max_tokens: config.llm.max_tokens,
        temperature: config.llm.temperature,
        timeout: std::time::Duration::from_millis(config.llm.timeout_ms),
        ..AnalyzerBackendConfig::default()
    };

    match ClaudeAnalyzerBackend::new(backend_config) {
        Ok(backend) => Arc::new(backend),
        Err(err) => {
            tracing::warn!(error = %err, "LLM backend unavailable, analyzer will run on fallback keyword classification only");
            Arc::new(UnconfiguredBackend)
        }
    }
}

/// Stand-in backend for a missing API key: every call fails, so
/// `Analyzer::analyze` always falls through to `fallback()` (§4.3 ADDED
/// Failure semantics) instead of panicking at startup.
struct UnconfiguredBackend;

#[async_trait::async_trait]
impl AnalyzerBackend for UnconfiguredBackend {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, vts_gateway_llm::AnalyzerError> {
        Err(vts_gateway_llm::AnalyzerError::Configuration("LLM backend not configured".to_string()))
    }
}
