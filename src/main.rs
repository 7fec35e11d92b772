use axum::Router;
use axum::routing::get;
use log::info;
use tower_http::cors::CorsLayer;

use crate::integration::Config;
use crate::state::AppState;

mod auth;
mod error;
mod event;
mod integration;
mod message;
mod presence;
mod product;
mod state;
mod user;

pub(crate) use error::Result;

#[tokio::main]
async fn main() {
    let config = Config::default();

    let state = AppState::init(&config)
        .await
        .expect("failed to initialize app state");

    event::reaper::spawn(
        state.hub.clone(),
        state.presence_service.clone(),
        config.sweep_interval,
    );

    let router = app(state, &config);

    let addr = config.env.addr();
    info!("listening on {addr}");

    match config.env.ssl_config() {
        Some(ssl_config) => axum_server::bind_openssl(addr, ssl_config)
            .serve(router.into_make_service())
            .await
            .expect("failed to start https server"),
        None => axum_server::bind(addr)
            .serve(router.into_make_service())
            .await
            .expect("failed to start http server"),
    }
}

fn app(state: AppState, config: &Config) -> Router {
    let protected = message::api(state.clone())
        .merge(presence::api(state.clone()))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::authenticate,
        ));

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .merge(event::endpoints(state))
        .merge(protected)
        .layer(
            CorsLayer::new()
                .allow_origin(config.env.allow_origin())
                .allow_methods(config.env.allow_methods())
                .allow_headers(config.env.allow_headers()),
        )
}
