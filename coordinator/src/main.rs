use anyhow::anyhow;
use coordinator::actors::session::{SessionActor, SessionArguments};
use coordinator::api;
use coordinator::algorithm;
use coordinator::config::{load_experiment_config, AppConfig};
use coordinator::session::Session;
use ractor::Actor;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coordinator=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app_config = AppConfig::from_env()?;
    info!(port = app_config.port, "coordinator starting");

    // Missing or invalid experiment config is fatal: no partial session.
    let experiment = load_experiment_config(&app_config.experiment_config)?;
    let algorithm = algorithm::build(&experiment.algorithm).ok_or_else(|| {
        anyhow!(
            "unknown scoring algorithm '{}' in {}",
            experiment.algorithm,
            app_config.experiment_config.display()
        )
    })?;
    info!(
        participants = experiment.total_participants(),
        main_rounds = experiment.main_rounds.len(),
        algorithm = %experiment.algorithm,
        "experiment configured"
    );

    let session = Session::new(
        Arc::new(experiment),
        algorithm,
        app_config.public_base_url.clone(),
    );
    let (session_actor, _actor_handle) = Actor::spawn(
        Some("session.coordinator".to_string()),
        SessionActor,
        SessionArguments { session },
    )
    .await
    .map_err(|e| anyhow!("failed to spawn session actor: {e}"))?;

    let state = api::ApiState {
        session: session_actor,
    };
    let app = api::router(&app_config.assets_dir)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", app_config.port);
    info!(public_base_url = %app_config.public_base_url, "listening on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
