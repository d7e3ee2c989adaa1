use mensa_feedback_rs::constants::{DB_FILENAME, UPLOAD_DIR, VERIFY_URL};
use mensa_feedback_rs::db_operations::check_or_create_db_tables;
use mensa_feedback_rs::shared_main::{logger_init, run_server};
use mensa_feedback_rs::task_scheduler_funcs::run_task_scheduler;

use clap::Parser;

/// HTTP backend for the dormitory cafeteria feedback app: meals, comments,
/// reviews, evaluations, likes.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Port the HTTP API listens on
    #[arg(short, long, env = "API_PORT", default_value_t = 3000)]
    port: u16,
    /// SQLite database file
    #[arg(short, long, env = "DB_FILE", default_value = "mensa-feedback.sqlite")]
    db_file: String,
    /// Directory for uploaded meal images
    #[arg(short, long, env = "UPLOAD_DIR", default_value = "uploads")]
    upload_dir: String,
    /// Identity provider endpoint used to verify bearer tokens
    #[arg(short = 'a', long, env = "AUTH_VERIFY_URL")]
    auth_verify_url: String,
    /// Enable verbose logging{n}[SETS env: RUST_LOG=debug]
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    //// Args setup
    let args = Args::parse();

    if args.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }

    logger_init(module_path!());
    log::info!("Starting server...");

    DB_FILENAME.get_or_init(|| args.db_file);
    UPLOAD_DIR.get_or_init(|| args.upload_dir);
    VERIFY_URL.get_or_init(|| args.auth_verify_url);

    //// DB and upload dir setup
    check_or_create_db_tables(DB_FILENAME.get().unwrap()).unwrap();
    std::fs::create_dir_all(UPLOAD_DIR.get().unwrap()).unwrap();

    log::info!("Starting task scheduler...");
    let _sched = run_task_scheduler().await;

    run_server(args.port).await;
}
