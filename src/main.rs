// src/main.rs
use actix_files::Files; // Static front-end pages
use actix_web::{web, App, HttpServer}; // HTTP server and app builder
use compound_pendulum_sim::{config, ui, Simulation};
use std::sync::Mutex;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // A missing .env is fine; everything has a default.
    let _ = dotenvy::dotenv();
    init_tracing();

    let links = config::default_links();
    let simulation = Simulation::new(links).map_err(std::io::Error::other)?;
    let shared = web::Data::new(Mutex::new(simulation));

    let addr = (config::bind_addr(), config::http_port());
    let static_dir = config::static_dir();
    tracing::info!(host = %addr.0, port = addr.1, links, %static_dir, "listening");

    HttpServer::new(move || {
        App::new()
            .app_data(shared.clone())
            .configure(ui::configure)
            .service(Files::new("/", static_dir.clone()).index_file("index.html"))
    })
    .bind(addr)?
    .run()
    .await
}
