use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use tower_http::services::ServeDir;

use crate::api_handlers::{
    delete_review, get_meal, get_meal_comments, get_meals, get_reviews, health, like_comment,
    like_meal, like_review, post_comment, post_evaluation, post_meal, post_review,
};
use crate::constants::{upload_dir, MAX_UPLOAD_BYTES, UPLOAD_ROUTE};

pub fn logger_init(module_path: &str) {
    let mut logger = pretty_env_logger::formatted_timed_builder();
    logger.filter(Some(module_path), log::LevelFilter::Info);

    if let Ok(filters) = std::env::var("RUST_LOG") {
        logger.parse_filters(&filters);
    }

    logger.init();
}

pub fn build_router() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/meals", get(get_meals).post(post_meal))
        .route("/meals/:id", get(get_meal))
        .route("/meals/:id/like", post(like_meal))
        .route("/meals/:id/comments", get(get_meal_comments).post(post_comment))
        .route("/meals/:id/comments/:cid/like", post(like_comment))
        .route("/reviews", get(get_reviews).post(post_review))
        .route("/reviews/:id", delete(delete_review))
        .route("/reviews/:id/like", post(like_review))
        .route("/evaluations", post(post_evaluation))
        .nest_service(UPLOAD_ROUTE, ServeDir::new(upload_dir()))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

pub async fn run_server(port: u16) {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .unwrap();
    log::info!("Listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, build_router()).await.unwrap();
}
