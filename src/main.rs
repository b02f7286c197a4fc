use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use haemolink_backend::{
    config::Config,
    location::FixRegistry,
    payment::upi::PrefsStore,
    payment::PaymentClient,
    routes,
    routing::RouteClient,
    tracking::transport::{RpcTransport, SessionRestRpc, SupabaseRpc},
    tracking::TrackingClient,
    AppState,
};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "haemolink_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();
    tracing::info!("Starting server at {}", config.server_addr());

    // Shared HTTP client for the routing service and the Supabase RPC endpoints
    let http = reqwest::Client::builder()
        .user_agent("haemolink-backend")
        .build()
        .expect("Failed to build HTTP client");

    // Transports in fallback order: service credential first, then the
    // caller's session over raw REST
    let primary: Arc<dyn RpcTransport> = Arc::new(SupabaseRpc::new(
        http.clone(),
        config.rpc_base(),
        config.supabase_anon_key.clone(),
    ));
    let fallback: Arc<dyn RpcTransport> = Arc::new(SessionRestRpc::new(
        http.clone(),
        config.rpc_base(),
        config.supabase_anon_key.clone(),
    ));

    let state = AppState {
        tracking: Arc::new(TrackingClient::new(vec![primary.clone(), fallback.clone()])),
        payments: Arc::new(PaymentClient::new(vec![primary, fallback])),
        router: Arc::new(RouteClient::new(http, config.osrm_url.clone())),
        fixes: Arc::new(FixRegistry::new()),
        prefs: Arc::new(PrefsStore::open(&config.prefs_path)),
        config: config.clone(),
    };

    // Configure rate limiting: 100 requests per 60 seconds per IP
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(60)
            .burst_size(100)
            .finish()
            .unwrap(),
    );

    // Create router with middleware
    let app = routes::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(GovernorLayer::new(governor_config));

    // Start server with socket address for rate limiting
    let addr: SocketAddr = config.server_addr().parse().expect("Invalid address");
    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
