//! Backlinkoo HTTP server: campaign, processing and blog endpoints over one
//! actix-web service.

mod error;
mod routes;

use actix_web::web::Data;
use actix_web::{App, HttpServer};
use backlinkoo_core::pipeline::PipelineContext;
use backlinkoo_shared::{load_config, load_config_from};
use color_eyre::eyre::Result;
use tracing::info;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{EnvFilter, fmt};

#[actix_web::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("backlinkoo=info,backlinkoo_server=info,actix_web=info"));
    let json_logs = std::env::var("BACKLINKOO_LOG_FORMAT").is_ok_and(|f| f == "json");
    if json_logs {
        fmt().json().with_env_filter(env_filter).init();
    } else {
        fmt().with_env_filter(env_filter).with_target(false).init();
    }

    let config = match std::env::var_os("BACKLINKOO_CONFIG") {
        Some(path) => load_config_from(std::path::Path::new(&path))?,
        None => load_config()?,
    };
    let ctx = PipelineContext::from_config(&config).await?;
    let addr = (config.server.host.clone(), config.server.port);
    info!(host = %addr.0, port = addr.1, platforms = ?ctx.publishers.platforms(), "starting server");

    let ctx = Data::new(ctx);
    HttpServer::new(move || {
        App::new()
            .app_data(ctx.clone())
            .wrap(routes::cors_headers())
            .wrap(TracingLogger::default())
            .configure(routes::init)
    })
    .bind(addr)?
    .run()
    .await?;

    Ok(())
}
