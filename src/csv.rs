// src/csv.rs
//
// Raw CSV datasets stored whole under a caller-chosen key. Headers are parsed
// once at upload time so listings can describe a dataset without shipping its
// body.

use actix_web::{http::header, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use futures::stream::TryStreamExt;
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use log::{error, info};

use crate::app_state::AppState;
use crate::models::CsvDataset;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCsvRequest {
    pub key: String,
    pub filename: String,
    pub csv_data: String,
}

/// Listing row; the dataset body is deliberately excluded.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvDatasetMeta {
    pub key: String,
    pub filename: String,
    #[serde(default)]
    pub headers: Vec<String>,
    pub upload_date: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

/// Column names from the first line: comma-split, trimmed, outer quotes and a
/// trailing carriage return stripped.
pub fn parse_headers(csv_data: &str) -> Vec<String> {
    let Some(first_line) = csv_data.lines().next() else {
        return Vec::new();
    };
    first_line
        .split(',')
        .map(|field| {
            field
                .trim()
                .trim_end_matches('\r')
                .trim_matches('"')
                .to_string()
        })
        .filter(|field| !field.is_empty())
        .collect()
}

fn internal_error(message: &str) -> HttpResponse {
    HttpResponse::InternalServerError().json(json!({ "success": false, "message": message }))
}

/// POST /api/csv/upload. Upserts by key; a re-upload replaces the dataset.
pub async fn upload_csv(
    data: web::Data<AppState>,
    payload: web::Json<UploadCsvRequest>,
) -> impl Responder {
    let payload = payload.into_inner();
    if payload.key.trim().is_empty()
        || payload.filename.trim().is_empty()
        || payload.csv_data.trim().is_empty()
    {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": "Key, filename and CSV data are required"
        }));
    }

    let datasets = data.mongodb.db.collection::<CsvDataset>("csv_datasets");
    let existing = match datasets.find_one(doc! { "key": &payload.key }).await {
        Ok(existing) => existing,
        Err(e) => {
            error!("CSV lookup error: {}", e);
            return internal_error("Error uploading CSV data");
        }
    };

    let now = Utc::now();
    let headers = parse_headers(&payload.csv_data);
    if existing.is_some() {
        let update = doc! { "$set": {
            "filename": &payload.filename,
            "csvData": &payload.csv_data,
            "headers": &headers,
            "lastModified": now.to_rfc3339(),
        }};
        match datasets.update_one(doc! { "key": &payload.key }, update).await {
            Ok(_) => {
                info!("CSV dataset {} replaced", payload.key);
                HttpResponse::Ok().json(json!({
                    "success": true,
                    "message": "CSV data updated successfully",
                    "key": payload.key
                }))
            }
            Err(e) => {
                error!("Error updating CSV data: {}", e);
                internal_error("Error uploading CSV data")
            }
        }
    } else {
        let dataset = CsvDataset {
            key: payload.key,
            filename: payload.filename,
            csv_data: payload.csv_data,
            headers,
            upload_date: now,
            last_modified: now,
        };
        match datasets.insert_one(&dataset).await {
            Ok(_) => {
                info!("CSV dataset {} stored", dataset.key);
                HttpResponse::Created().json(json!({
                    "success": true,
                    "message": "CSV data uploaded successfully",
                    "key": dataset.key
                }))
            }
            Err(e) => {
                error!("Error storing CSV data: {}", e);
                internal_error("Error uploading CSV data")
            }
        }
    }
}

/// GET /api/csv/fetch/{key}
pub async fn fetch_csv(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let key = path.into_inner();
    let datasets = data.mongodb.db.collection::<CsvDataset>("csv_datasets");
    match datasets.find_one(doc! { "key": &key }).await {
        Ok(Some(dataset)) => HttpResponse::Ok().json(json!({ "success": true, "data": dataset })),
        Ok(None) => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "CSV data not found"
        })),
        Err(e) => {
            error!("Error fetching CSV {}: {}", key, e);
            internal_error("Error fetching CSV data")
        }
    }
}

/// GET /api/csv/download/{key}. Raw body as a file attachment.
pub async fn download_csv(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let key = path.into_inner();
    let datasets = data.mongodb.db.collection::<CsvDataset>("csv_datasets");
    match datasets.find_one(doc! { "key": &key }).await {
        Ok(Some(dataset)) => HttpResponse::Ok()
            .content_type("text/csv")
            .insert_header((
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", dataset.filename),
            ))
            .body(dataset.csv_data),
        Ok(None) => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "CSV data not found"
        })),
        Err(e) => {
            error!("Error downloading CSV {}: {}", key, e);
            internal_error("Error downloading CSV data")
        }
    }
}

/// GET /api/csv/list. Metadata only, the body is projected away server-side.
pub async fn list_csv(data: web::Data<AppState>) -> impl Responder {
    let datasets = data.mongodb.db.collection::<CsvDatasetMeta>("csv_datasets");
    let result = datasets
        .find(doc! {})
        .projection(doc! { "csvData": 0 })
        .await;
    let list: Vec<CsvDatasetMeta> = match result {
        Ok(cursor) => match cursor.try_collect().await {
            Ok(list) => list,
            Err(e) => {
                error!("Error reading CSV listing: {}", e);
                return internal_error("Error listing CSV data");
            }
        },
        Err(e) => {
            error!("Error listing CSV data: {}", e);
            return internal_error("Error listing CSV data");
        }
    };
    HttpResponse::Ok().json(json!({
        "success": true,
        "count": list.len(),
        "data": list
    }))
}

/// DELETE /api/csv/delete/{key}
pub async fn delete_csv(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let key = path.into_inner();
    let datasets = data.mongodb.db.collection::<CsvDataset>("csv_datasets");
    match datasets.delete_one(doc! { "key": &key }).await {
        Ok(res) if res.deleted_count == 1 => {
            info!("CSV dataset {} deleted", key);
            HttpResponse::Ok().json(json!({
                "success": true,
                "message": "CSV data deleted successfully"
            }))
        }
        Ok(_) => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "CSV data not found"
        })),
        Err(e) => {
            error!("Error deleting CSV {}: {}", key, e);
            internal_error("Error deleting CSV data")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_split_and_trim() {
        assert_eq!(
            parse_headers("name, age ,city\n1,2,3"),
            vec!["name", "age", "city"]
        );
    }

    #[test]
    fn headers_strip_quotes_and_carriage_return() {
        assert_eq!(
            parse_headers("\"patient id\",\"score\"\r\n1,2"),
            vec!["patient id", "score"]
        );
    }

    #[test]
    fn empty_body_yields_no_headers() {
        assert!(parse_headers("").is_empty());
        assert!(parse_headers(" , ,").is_empty());
    }
}
