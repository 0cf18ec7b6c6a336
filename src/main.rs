use actix_cors::Cors;
use actix_web::{middleware::Compress, App, HttpServer};
use utoipa_swagger_ui::SwaggerUi;

use ambient_frames::content::{JsonArrayStore, JsonFileConfigStore};
use ambient_frames::gateway::HttpUploadGateway;
use ambient_frames::matching::ReturnRecent;
use ambient_frames::openapi::ApiDoc;
use ambient_frames::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use ambient_frames::repo::{AdminRepo, Repo};
use ambient_frames::routes::{config, AppState};
use ambient_frames::security::SecurityHeaders;
use ambient_frames::storage::build_photo_store;

use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Environment comes from the deployment (shell, systemd, Docker, ...).
    // Load .env automatically only in debug builds.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    validate_env_vars();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping Ambient Frames backend");

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo: Arc<dyn Repo> = {
        info!("Using in-memory repository backend");
        Arc::new(ambient_frames::repo::inmem::InMemRepo::new())
    };

    #[cfg(feature = "postgres-store")]
    let repo: Arc<dyn Repo> = {
        use sqlx::postgres::PgPoolOptions;
        let db_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres-store");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .expect("Failed to create Pg pool");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");
        info!("Using Postgres repository backend");
        Arc::new(ambient_frames::repo::pg::PgRepo::new(pool))
    };

    bootstrap_admin(repo.as_ref()).await;

    let image_config: Arc<dyn ambient_frames::content::ImageConfigStore> =
        Arc::new(JsonFileConfigStore::from_env());
    let gallery = Arc::new(JsonArrayStore::new(
        std::env::var("GALLERY_PATH").unwrap_or_else(|_| "data/gallery.json".into()),
    ));
    let projects = Arc::new(JsonArrayStore::new(
        std::env::var("PROJECTS_PATH").unwrap_or_else(|_| "data/projects.json".into()),
    ));
    let gateway: Arc<dyn ambient_frames::gateway::UploadGateway> =
        Arc::new(HttpUploadGateway::from_env().expect("upload gateway misconfigured"));
    let photo_store = build_photo_store().await;
    let match_engine: Arc<dyn ambient_frames::matching::MatchEngine> =
        Arc::new(ReturnRecent::new(repo.clone()));
    let rate_limiter = RateLimiterFacade::new(InMemoryRateLimiter::new(true), RateLimitConfig::from_env());

    let openapi = ApiDoc::openapi();
    info!("OpenAPI spec generated");

    let state = AppState {
        repo,
        image_config,
        gallery,
        projects,
        gateway,
        photo_store,
        match_engine,
        rate_limiter: Some(rate_limiter),
    };

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                // local dev frontend ports
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            if let Ok(front) = std::env::var("FRONTEND_URL") {
                c = c.allowed_origin(&front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::from_env())
            .wrap(cors)
            .configure(config)
            .service(SwaggerUi::new("/docs").url("/docs/openapi.json", openapi.clone()))
            .app_data(actix_web::web::Data::new(state.clone()))
    })
    .bind(("0.0.0.0", 8080))?;

    info!("Listening on http://0.0.0.0:8080");

    server.run().await
}

/// Hash and upsert the bootstrap admin account when the deployment provides
/// one. Password updates happen by restarting with new values.
async fn bootstrap_admin(repo: &dyn Repo) {
    let (Ok(username), Ok(password)) = (std::env::var("ADMIN_USERNAME"), std::env::var("ADMIN_PASSWORD")) else {
        tracing::warn!("ADMIN_USERNAME/ADMIN_PASSWORD not set; no admin account bootstrapped");
        return;
    };
    let hash = ambient_frames::password::hash_password(&password).expect("hash bootstrap password");
    match repo.upsert_admin(&username, &hash).await {
        Ok(admin) => info!("bootstrapped admin '{}'", admin.username),
        Err(e) => tracing::error!("failed to bootstrap admin: {e}"),
    }
}

/// Validate that required environment variables are set
fn validate_env_vars() {
    use std::env;

    let mut missing = Vec::new();
    for var in ["SESSION_SECRET", "CDN_CLOUD_NAME", "CDN_API_KEY", "CDN_API_SECRET", "S3_ENDPOINT"] {
        if env::var(var).is_err() {
            missing.push(var);
        }
    }

    if !missing.is_empty() {
        eprintln!("Missing required environment variables: {missing:?}");
        eprintln!("Please copy .env.example to .env and configure it");
        std::process::exit(1);
    }

    if let Ok(secret) = env::var("SESSION_SECRET") {
        if secret.len() < 32 {
            eprintln!("SESSION_SECRET must be at least 32 characters long");
            std::process::exit(1);
        }
    }
}
