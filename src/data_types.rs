use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One record of the like-toggle protocol: which collection was hit and the
/// resulting state after the toggle.
#[derive(Debug, Clone, Copy)]
pub struct LikeOutcome {
    pub liked: bool,
    pub like_count: i64,
}

/// Target of a like toggle, addressed the way the store addresses documents:
/// a collection path plus a record id. Comments are nested under their meal.
#[derive(Debug, Clone)]
pub enum LikeTarget {
    Meal(String),
    Review(String),
    Comment { meal_id: String, comment_id: String },
}

impl LikeTarget {
    pub fn collection(&self) -> String {
        match self {
            LikeTarget::Meal(_) => "meals".to_string(),
            LikeTarget::Review(_) => "reviews".to_string(),
            LikeTarget::Comment { meal_id, .. } => format!("meals/{meal_id}/comments"),
        }
    }

    pub fn record_id(&self) -> &str {
        match self {
            LikeTarget::Meal(id) => id,
            LikeTarget::Review(id) => id,
            LikeTarget::Comment { comment_id, .. } => comment_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MealRecord {
    pub id: String,
    /// Schemaless meal description as submitted by the client.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    pub image_url: String,
    pub created_by: String,
    pub like_count: i64,
    pub liked_by: Vec<String>,
    pub is_archived: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRecord {
    pub id: String,
    pub user_id: String,
    pub text: String,
    pub like_count: i64,
    pub liked_by: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    pub id: String,
    pub user_id: String,
    pub comment: String,
    pub like_count: i64,
    pub liked_by: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewComment {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewReview {
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvaluation {
    /// Dish name -> percentage eaten (0-200).
    #[serde(default)]
    pub food_amounts: Option<BTreeMap<String, i64>>,
    #[serde(default)]
    pub meal_id: Option<String>,
}
