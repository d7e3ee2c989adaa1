//! HTTP backend for a dormitory cafeteria feedback app: daily meals with
//! image uploads, per-meal comments, free-text reviews, self-assessment
//! evaluations, and a like toggle on all of it. Old meals are archived by a
//! nightly job.

pub mod api_handlers;
pub mod auth;
pub mod constants;
pub mod data_types;
pub mod db_operations;
pub mod errors;
pub mod shared_main;
pub mod task_scheduler_funcs;
