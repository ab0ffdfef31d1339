// src/annotation.rs
//
// Public annotation store keyed by image access keys. Readers tolerate a
// missing key (empty payload, not 404) so annotator frontends can poll before
// the first save; writers upsert by key.

use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use mongodb::bson::{doc, to_bson};
use serde::Deserialize;
use serde_json::json;
use log::{error, info};

use crate::app_state::AppState;
use crate::keys;
use crate::models::AnnotationSet;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationQuery {
    pub access_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveAnnotationsRequest {
    pub access_key: String,
    pub image_name: String,
    pub image_url: String,
    #[serde(default)]
    pub annotations: Vec<serde_json::Value>,
}

fn invalid_key() -> HttpResponse {
    HttpResponse::BadRequest().json(json!({
        "success": false,
        "message": "Invalid access key format"
    }))
}

/// GET /api/annotations/image?accessKey=...
pub async fn get_annotations(
    data: web::Data<AppState>,
    query: web::Query<AnnotationQuery>,
) -> impl Responder {
    let access_key = query.into_inner().access_key;
    if !keys::is_valid_access_key(&access_key) {
        return invalid_key();
    }

    let annotations = data.mongodb.db.collection::<AnnotationSet>("annotations");
    let result = annotations
        .find_one(doc! { "accessKey": &access_key })
        .sort(doc! { "updatedAt": -1 })
        .await;
    match result {
        Ok(Some(set)) => HttpResponse::Ok().json(json!({
            "success": true,
            "annotations": set.annotations,
            "imageName": set.image_name,
            "imageUrl": set.image_url
        })),
        Ok(None) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "No annotations found for this access key",
            "annotations": [],
            "imageName": null,
            "imageUrl": null
        })),
        Err(e) => {
            error!("Error fetching annotations for {}: {}", access_key, e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error fetching annotations"
            }))
        }
    }
}

/// POST /api/annotations/image
pub async fn save_annotations(
    data: web::Data<AppState>,
    payload: web::Json<SaveAnnotationsRequest>,
) -> impl Responder {
    let payload = payload.into_inner();
    if !keys::is_valid_access_key(&payload.access_key) {
        return invalid_key();
    }
    if payload.image_name.trim().is_empty() || payload.image_url.trim().is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": "Image name and URL are required"
        }));
    }

    let annotations_bson = match to_bson(&payload.annotations) {
        Ok(bson) => bson,
        Err(e) => {
            error!("Error serializing annotations: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error saving annotations"
            }));
        }
    };

    let collection = data.mongodb.db.collection::<AnnotationSet>("annotations");
    let existing = match collection.find_one(doc! { "accessKey": &payload.access_key }).await {
        Ok(existing) => existing,
        Err(e) => {
            error!("Annotation lookup error: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error saving annotations"
            }));
        }
    };

    let now = Utc::now();
    if existing.is_some() {
        let update = doc! { "$set": {
            "annotations": annotations_bson,
            "imageName": &payload.image_name,
            "imageUrl": &payload.image_url,
            "updatedAt": now.to_rfc3339(),
        }};
        match collection
            .update_one(doc! { "accessKey": &payload.access_key }, update)
            .await
        {
            Ok(_) => {
                info!("Annotations updated for {}", payload.access_key);
                HttpResponse::Ok().json(json!({
                    "success": true,
                    "message": "Annotations updated successfully"
                }))
            }
            Err(e) => {
                error!("Error updating annotations: {}", e);
                HttpResponse::InternalServerError().json(json!({
                    "success": false,
                    "message": "Error saving annotations"
                }))
            }
        }
    } else {
        let annotations = payload
            .annotations
            .iter()
            .filter_map(|value| to_bson(value).ok())
            .collect();
        let set = AnnotationSet {
            access_key: payload.access_key.clone(),
            image_name: payload.image_name,
            image_url: payload.image_url,
            annotations,
            created_at: now,
            updated_at: now,
        };
        match collection.insert_one(&set).await {
            Ok(_) => {
                info!("Annotations saved for {}", set.access_key);
                HttpResponse::Created().json(json!({
                    "success": true,
                    "message": "Annotations saved successfully"
                }))
            }
            Err(e) => {
                error!("Error saving annotations: {}", e);
                HttpResponse::InternalServerError().json(json!({
                    "success": false,
                    "message": "Error saving annotations"
                }))
            }
        }
    }
}

/// DELETE /api/annotations/image/{access_key}
pub async fn delete_annotations(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let access_key = path.into_inner();
    if !keys::is_valid_access_key(&access_key) {
        return invalid_key();
    }

    let collection = data.mongodb.db.collection::<AnnotationSet>("annotations");
    match collection.delete_one(doc! { "accessKey": &access_key }).await {
        Ok(res) if res.deleted_count == 1 => {
            info!("Annotations deleted for {}", access_key);
            HttpResponse::Ok().json(json!({
                "success": true,
                "message": "Annotations deleted successfully"
            }))
        }
        Ok(_) => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "No annotations found for this access key"
        })),
        Err(e) => {
            error!("Error deleting annotations: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error deleting annotations"
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_request_defaults_to_empty_annotations() {
        let parsed: SaveAnnotationsRequest = serde_json::from_str(
            r#"{"accessKey":"Abc123Xyz789","imageName":"scan.png","imageUrl":"http://x/scan.png"}"#,
        )
        .unwrap();
        assert!(parsed.annotations.is_empty());
    }

    #[test]
    fn save_request_keeps_free_form_annotation_shapes() {
        let parsed: SaveAnnotationsRequest = serde_json::from_str(
            r#"{
                "accessKey":"Abc123Xyz789",
                "imageName":"scan.png",
                "imageUrl":"http://x/scan.png",
                "annotations":[{"label":"lesion","points":[[1,2],[3,4]]}]
            }"#,
        )
        .unwrap();
        assert_eq!(parsed.annotations.len(), 1);
        assert_eq!(parsed.annotations[0]["label"], "lesion");
    }
}
