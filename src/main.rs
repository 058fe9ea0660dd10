use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use dotenvy::dotenv;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod model;
mod models;
mod routes;
mod service;
mod utils;

use config::Config;
use db::{AppDatabases, init_db};

use crate::docs::ApiDoc;
use crate::utils::attendance_filter;
use crate::utils::location_cache;
use tracing::info;
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "HRIS Attendance API"
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    let config = Config::from_env();

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let databases = AppDatabases {
        local: init_db(&config.database_url).await,
        c3ais: init_db(&config.c3ais_database_url).await,
    };

    let pool_for_filter_warmup = databases.local.clone();
    let pool_for_cache_warmup = databases.local.clone();
    let server_addr = config.server_addr.clone();
    let config_data = config.clone();

    actix_web::rt::spawn(async move {
        // Only today's rows matter for duplicate detection, but a small
        // window keeps restarts around midnight safe
        if let Err(e) =
            attendance_filter::warmup_attendance_filter(&pool_for_filter_warmup, 2, 500).await
        {
            eprintln!("Failed to warmup attendance filter: {:?}", e);
        }
    });

    actix_web::rt::spawn(async move {
        if let Err(e) = location_cache::warmup_location_cache(&pool_for_cache_warmup).await {
            eprintln!("Failed to warmup location cache: {:?}", e);
        }
    });

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(databases.clone()))
            .app_data(Data::new(config.clone()))
            .service(index)
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(server_addr)?
    .run()
    .await
}
