use std::collections::BTreeMap;
use std::path::Path as FsPath;

use axum::{
    extract::{Host, Multipart, Path},
    http::{HeaderMap, StatusCode},
    Json,
};
use rand::Rng;
use serde_json::{json, Map, Value};

use crate::auth::VerifiedUser;
use crate::constants::{db_file, upload_dir, ALLOWED_IMAGE_TYPES, UPLOAD_ROUTE};
use crate::data_types::{
    CommentRecord, LikeOutcome, LikeTarget, MealRecord, NewComment, NewEvaluation, NewReview,
    ReviewRecord,
};
use crate::db_operations;
use crate::errors::ApiError;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

//// meals

pub async fn get_meals() -> Result<Json<Vec<MealRecord>>, ApiError> {
    let meals = db_operations::get_meals(db_file()).map_err(|e| e.into_api("Meal"))?;
    Ok(Json(meals))
}

pub async fn get_meal(Path(meal_id): Path<String>) -> Result<Json<MealRecord>, ApiError> {
    let meal = db_operations::get_meal(db_file(), &meal_id).map_err(|e| e.into_api("Meal"))?;
    Ok(Json(meal))
}

fn random_image_name() -> String {
    let mut rng = rand::thread_rng();
    (0..16).map(|_| format!("{:02x}", rng.gen::<u8>())).collect()
}

pub async fn post_meal(
    user: VerifiedUser,
    Host(host): Host,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut image: Option<(String, axum::body::Bytes)> = None;
    let mut meal_fields: Option<Map<String, Value>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::Validation("Malformed multipart body".to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let content_type = field.content_type().unwrap_or_default();
                if !ALLOWED_IMAGE_TYPES.contains(&content_type) {
                    return Err(ApiError::Validation(
                        "Unsupported image type (jpeg, png, gif, webp only)".to_string(),
                    ));
                }
                let extension = field
                    .file_name()
                    .and_then(|n| FsPath::new(n).extension())
                    .and_then(|e| e.to_str())
                    .map(|e| format!(".{e}"))
                    .unwrap_or_default();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| ApiError::Validation("Malformed multipart body".to_string()))?;
                image = Some((extension, bytes));
            }
            "mealData" => {
                let text = field
                    .text()
                    .await
                    .map_err(|_| ApiError::Validation("Malformed multipart body".to_string()))?;
                match serde_json::from_str(&text) {
                    Ok(Value::Object(fields)) => meal_fields = Some(fields),
                    _ => {
                        return Err(ApiError::Validation(
                            "mealData is not a JSON object".to_string(),
                        ))
                    }
                }
            }
            _ => {}
        }
    }

    let (extension, bytes) =
        image.ok_or_else(|| ApiError::Validation("No image file provided".to_string()))?;
    let fields =
        meal_fields.ok_or_else(|| ApiError::Validation("mealData is required".to_string()))?;

    let filename = format!("{}{}", random_image_name(), extension);
    tokio::fs::write(FsPath::new(upload_dir()).join(&filename), &bytes)
        .await
        .map_err(|e| {
            log::error!("Failed to store upload: {e}");
            ApiError::Internal
        })?;

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("http");
    let image_url = format!("{scheme}://{host}{UPLOAD_ROUTE}/{filename}");

    let meal_id = db_operations::insert_meal(db_file(), &fields, &image_url, &user.user_id)
        .map_err(|e| e.into_api("Meal"))?;
    log::info!("Meal {} registered by {}", meal_id, user.user_id);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Meal registered.", "mealId": meal_id })),
    ))
}

fn like_response(outcome: LikeOutcome) -> Json<Value> {
    Json(json!({ "liked": outcome.liked, "likeCount": outcome.like_count }))
}

pub async fn like_meal(
    user: VerifiedUser,
    Path(meal_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let outcome = db_operations::toggle_like(db_file(), &LikeTarget::Meal(meal_id), &user.user_id)
        .map_err(|e| e.into_api("Meal"))?;
    Ok(like_response(outcome))
}

//// comments

pub async fn get_meal_comments(
    Path(meal_id): Path<String>,
) -> Result<Json<Vec<CommentRecord>>, ApiError> {
    let comments =
        db_operations::get_comments(db_file(), &meal_id).map_err(|e| e.into_api("Meal"))?;
    Ok(Json(comments))
}

pub async fn post_comment(
    user: VerifiedUser,
    Path(meal_id): Path<String>,
    Json(payload): Json<NewComment>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let text = payload
        .text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| ApiError::Validation("text is required".to_string()))?;

    let comment_id = db_operations::insert_comment(db_file(), &meal_id, &user.user_id, text)
        .map_err(|e| e.into_api("Meal"))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Comment posted.", "commentId": comment_id })),
    ))
}

pub async fn like_comment(
    user: VerifiedUser,
    Path((meal_id, comment_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let target = LikeTarget::Comment {
        meal_id,
        comment_id,
    };
    let outcome = db_operations::toggle_like(db_file(), &target, &user.user_id)
        .map_err(|e| e.into_api("Comment"))?;
    Ok(like_response(outcome))
}

//// reviews

pub async fn get_reviews() -> Result<Json<Vec<ReviewRecord>>, ApiError> {
    let reviews = db_operations::get_reviews(db_file()).map_err(|e| e.into_api("Review"))?;
    Ok(Json(reviews))
}

pub async fn post_review(
    user: VerifiedUser,
    Json(payload): Json<NewReview>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let comment = payload
        .comment
        .as_deref()
        .map(str::trim)
        .filter(|comment| !comment.is_empty())
        .ok_or_else(|| ApiError::Validation("comment is required".to_string()))?;

    let review_id = db_operations::insert_review(db_file(), &user.user_id, comment)
        .map_err(|e| e.into_api("Review"))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Review registered.", "reviewId": review_id })),
    ))
}

pub async fn like_review(
    user: VerifiedUser,
    Path(review_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let outcome =
        db_operations::toggle_like(db_file(), &LikeTarget::Review(review_id), &user.user_id)
            .map_err(|e| e.into_api("Review"))?;
    Ok(like_response(outcome))
}

pub async fn delete_review(
    user: VerifiedUser,
    Path(review_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !user.is_admin {
        return Err(ApiError::AdminRequired);
    }

    db_operations::delete_review(db_file(), &review_id).map_err(|e| e.into_api("Review"))?;
    log::info!("Review {} deleted by {}", review_id, user.user_id);

    Ok(Json(json!({ "message": "Review deleted." })))
}

//// evaluations

fn validate_evaluation(payload: &NewEvaluation) -> Result<(&BTreeMap<String, i64>, &str), ApiError> {
    let meal_id = payload
        .meal_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::Validation("foodAmounts and mealId are required".to_string()))?;

    let food_amounts = payload
        .food_amounts
        .as_ref()
        .filter(|amounts| !amounts.is_empty())
        .ok_or_else(|| ApiError::Validation("foodAmounts and mealId are required".to_string()))?;

    if food_amounts.values().any(|amount| !(0..=200).contains(amount)) {
        return Err(ApiError::Validation(
            "foodAmounts values must be between 0 and 200".to_string(),
        ));
    }

    Ok((food_amounts, meal_id))
}

pub async fn post_evaluation(
    user: VerifiedUser,
    Json(payload): Json<NewEvaluation>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let (food_amounts, meal_id) = validate_evaluation(&payload)?;

    let evaluation_id =
        db_operations::insert_evaluation(db_file(), &user.user_id, meal_id, food_amounts)
            .map_err(|e| e.into_api("Evaluation"))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Evaluation registered.", "evaluationId": evaluation_id })),
    ))
}
