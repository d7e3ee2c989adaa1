use std::sync::OnceLock;

use reqwest::Client;

pub static DB_FILENAME: OnceLock<String> = OnceLock::new();
pub static UPLOAD_DIR: OnceLock<String> = OnceLock::new();
pub static VERIFY_URL: OnceLock<String> = OnceLock::new();

static HTTP_CLIENT: OnceLock<Client> = OnceLock::new();

// 03:00 Asia/Tokyo, cron string is UTC
pub const ARCHIVE_CRON: &str = "0 0 18 * * *";
pub const ARCHIVE_AFTER_DAYS: i64 = 30;

pub const UPLOAD_ROUTE: &str = "/uploads";
pub const MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;

pub const ALLOWED_IMAGE_TYPES: [&str; 4] =
    ["image/jpeg", "image/png", "image/gif", "image/webp"];

pub fn db_file() -> &'static str {
    DB_FILENAME.get().unwrap()
}

pub fn upload_dir() -> &'static str {
    UPLOAD_DIR.get().unwrap()
}

pub fn verify_url() -> &'static str {
    VERIFY_URL.get().unwrap()
}

pub fn http_client() -> &'static Client {
    HTTP_CLIENT.get_or_init(Client::new)
}
