use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpResponse, HttpServer};
use anyhow::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use hostel_issues::openapi::ApiDoc;
use hostel_issues::store::inmem::InMemStore;
use hostel_issues::{config, AppState, HostelConfig, HostelService};

async fn render_metrics(handle: web::Data<PrometheusHandle>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(handle.render())
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds to reduce manual setup overhead.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    validate_env_vars()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping hostel issue desk");

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("installing Prometheus recorder")?;

    let hostel_cfg = HostelConfig::from_env();
    info!(
        app_id = %hostel_cfg.app_id,
        blocks = hostel_cfg.blocks.len(),
        categories = hostel_cfg.categories.len(),
        "Loaded hostel configuration"
    );

    let store = InMemStore::new();
    info!("Using in-memory document store");
    let service = HostelService::new(Arc::new(store), hostel_cfg);

    let openapi = ApiDoc::openapi();
    let frontend = std::env::var("FRONTEND_URL").ok();
    let bind = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                // during local dev allow React/Vite default ports
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PUT", "PATCH", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            if let Some(front) = frontend.as_deref() {
                c = c.allowed_origin(front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(cors)
            .app_data(web::Data::new(AppState { service: service.clone() }))
            .app_data(web::Data::new(metrics.clone()))
            .configure(config)
            .route("/metrics", web::get().to(render_metrics))
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(&bind)
    .with_context(|| format!("binding {bind}"))?;

    info!("Listening on http://{bind}");

    server.run().await?;
    Ok(())
}

/// Fail fast when the token secret is missing or too short to be safe.
fn validate_env_vars() -> anyhow::Result<()> {
    let secret = std::env::var("JWT_SECRET")
        .context("JWT_SECRET must be set (copy .env.example to .env and configure it)")?;
    if secret.len() < 32 {
        anyhow::bail!("JWT_SECRET must be at least 32 characters long for security");
    }
    Ok(())
}
