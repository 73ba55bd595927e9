use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use yatube::openapi::ApiDoc;
use yatube::repo::Repo;
use yatube::storage::FsImageStore;
use yatube::{config, AppState, SecurityHeaders, Settings};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds; production sets the environment itself.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("configuration error: {e}");
            eprintln!("Please copy .env.example to .env and configure it");
            std::process::exit(1);
        }
    };

    info!("Bootstrapping yatube");
    info!(media_root = %settings.media_root.display(), cache_seconds = settings.index_cache_ttl.as_secs(), "settings loaded");

    let repo = build_repo(&settings).await?;
    let image_store = Arc::new(FsImageStore::new(settings.media_root.clone()));
    let state = web::Data::new(AppState::new(repo, image_store, settings.clone())?);

    let openapi = ApiDoc::openapi();
    info!("OpenAPI spec generated");

    let bind_addr = (settings.host.clone(), settings.port);
    let server = HttpServer::new(move || {
        let mut cors = Cors::default()
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
            .max_age(3600);
        for origin in &settings.allowed_origins {
            cors = cors.allowed_origin(origin);
        }

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::from_settings(&settings))
            .wrap(cors)
            .app_data(state.clone())
            // before `config`: its `/{username}/` pages would catch `/docs/`
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
            .configure(config)
    })
    .bind(bind_addr.clone())?;

    info!("Listening on http://{}:{}", bind_addr.0, bind_addr.1);

    server.run().await?;
    Ok(())
}

/// Postgres when it is compiled in and `DATABASE_URL` is set, memory otherwise.
#[allow(unreachable_code)]
async fn build_repo(settings: &Settings) -> anyhow::Result<Arc<dyn Repo>> {
    #[cfg(feature = "postgres-store")]
    {
        if let Some(url) = &settings.database_url {
            use sqlx::postgres::PgPoolOptions;
            let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
            let repo = yatube::repo::pg::PgRepo::new(pool);
            repo.migrate().await?;
            info!("Using Postgres repository backend");
            return Ok(Arc::new(repo));
        }
    }

    #[cfg(feature = "inmem-store")]
    {
        if settings.database_url.is_some() {
            warn!("DATABASE_URL is set but this build has no Postgres backend; data lives in memory");
        }
        info!("Using in-memory repository backend");
        return Ok(Arc::new(yatube::repo::inmem::InMemRepo::new()));
    }

    anyhow::bail!("no repository backend compiled in; enable `inmem-store` or `postgres-store`")
}
