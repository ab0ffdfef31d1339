// src/doctor.rs

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use futures_util::StreamExt;
use mongodb::bson::{doc, to_bson, Document};
use serde::Deserialize;
use serde_json::json;
use log::{error, info};

use crate::app_state::AppState;
use crate::auth;
use crate::db::is_duplicate_key_error;
use crate::models::{DoctorInfo, DoctorProfile, ProfileStatus};
use crate::profiles::{self, ProfileError};

#[derive(Debug, Deserialize)]
pub struct CreateDoctorRequest {
    pub info: DoctorInfo,
}

#[derive(Debug, Deserialize)]
pub struct EditDoctorRequest {
    pub info: DoctorInfo,
}

/// POST /api/doctor/profile
pub async fn create_profile(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateDoctorRequest>,
) -> impl Responder {
    let user = match auth::current_user(&req) {
        Some(user) => user,
        None => return auth::unauthorized(),
    };

    let doctors = data.mongodb.db.collection::<DoctorProfile>("doctors");
    if let Some(license) = &payload.info.license_number {
        match doctors.find_one(doc! { "info.licenseNumber": license }).await {
            Ok(Some(_)) => {
                return HttpResponse::BadRequest().json(json!({
                    "success": false,
                    "message": "License number already registered"
                }))
            }
            Ok(None) => {}
            Err(e) => {
                error!("License lookup error: {}", e);
                return HttpResponse::InternalServerError().json(json!({
                    "success": false,
                    "message": "Error creating doctor profile"
                }));
            }
        }
    }

    let now = Utc::now();
    let doctor = DoctorProfile {
        user_id: user.id.clone(),
        info: payload.into_inner().info,
        status: ProfileStatus::Pending,
        created_at: now,
        updated_at: now,
    };

    match profiles::create_profile(&data.mongodb.db, &user.id, &doctor).await {
        Ok(()) => {
            info!("Doctor profile created for {}", user.id);
            HttpResponse::Created().json(json!({ "doctor": doctor, "success": true }))
        }
        Err(ProfileError::Conflict) => HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": "Doctor profile already exists"
        })),
        Err(ProfileError::Database(e)) if is_duplicate_key_error(&e) => {
            // Racing create with the same license number.
            HttpResponse::BadRequest().json(json!({
                "success": false,
                "message": "License number already registered"
            }))
        }
        Err(ProfileError::Database(e)) => {
            error!("Error creating doctor profile: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error creating doctor profile"
            }))
        }
    }
}

/// GET /api/doctor/profile
pub async fn get_profile(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let user = match auth::current_user(&req) {
        Some(user) => user,
        None => return auth::unauthorized(),
    };

    match profiles::get_profile::<DoctorProfile>(&data.mongodb.db, &user.id).await {
        Ok(Some(doctor)) => HttpResponse::Ok().json(json!({ "doctor": doctor, "success": true })),
        Ok(None) => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "Doctor profile not found"
        })),
        Err(e) => {
            error!("Error fetching doctor profile: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error fetching doctor profile"
            }))
        }
    }
}

/// PUT /api/doctor/profile. Replaces the structured `info` block.
pub async fn edit_profile(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<EditDoctorRequest>,
) -> impl Responder {
    let user = match auth::current_user(&req) {
        Some(user) => user,
        None => return auth::unauthorized(),
    };

    let info_bson = match to_bson(&payload.info) {
        Ok(bson) => bson,
        Err(e) => {
            error!("Error serializing doctor info: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error updating doctor profile"
            }));
        }
    };

    let doctors = data.mongodb.db.collection::<DoctorProfile>("doctors");
    let update = doc! { "$set": {
        "info": info_bson,
        "updatedAt": Utc::now().to_rfc3339(),
    }};
    match doctors.update_one(doc! { "userId": &user.id }, update).await {
        Ok(res) if res.matched_count == 0 => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "Doctor profile not found"
        })),
        Ok(_) => match profiles::get_profile::<DoctorProfile>(&data.mongodb.db, &user.id).await {
            Ok(Some(doctor)) => {
                HttpResponse::Ok().json(json!({ "doctor": doctor, "success": true }))
            }
            _ => HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error updating doctor profile"
            })),
        },
        Err(e) if is_duplicate_key_error(&e) => HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": "License number already registered"
        })),
        Err(e) => {
            error!("Error updating doctor profile: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error updating doctor profile"
            }))
        }
    }
}

/// DELETE /api/doctor/profile. Assignments referencing this doctor are left
/// in place (no cascade).
pub async fn delete_profile(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let user = match auth::current_user(&req) {
        Some(user) => user,
        None => return auth::unauthorized(),
    };

    match profiles::delete_profile::<DoctorProfile>(&data.mongodb.db, &user.id).await {
        Ok(true) => {
            info!("Doctor profile deleted for {}", user.id);
            HttpResponse::Ok().json(json!({
                "success": true,
                "message": "Doctor profile deleted successfully"
            }))
        }
        Ok(false) => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "Doctor profile not found"
        })),
        Err(e) => {
            error!("Error deleting doctor profile: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error deleting doctor profile"
            }))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DoctorListQuery {
    pub specialization: Option<String>,
    pub experience: Option<i32>,
    /// Comma-separated list; matches doctors speaking any of them.
    pub languages: Option<String>,
}

pub fn doctor_list_filter(query: &DoctorListQuery) -> Document {
    let mut filter = doc! {};
    if let Some(specialization) = &query.specialization {
        filter.insert(
            "info.specialization",
            doc! { "$regex": specialization, "$options": "i" },
        );
    }
    if let Some(experience) = query.experience {
        filter.insert("info.experience", doc! { "$gte": experience });
    }
    if let Some(languages) = &query.languages {
        let wanted: Vec<&str> = languages
            .split(',')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if !wanted.is_empty() {
            filter.insert("info.languages", doc! { "$in": wanted });
        }
    }
    filter
}

/// GET /api/doctor/list. Public directory with optional filters.
pub async fn get_doctor_list(
    data: web::Data<AppState>,
    query: web::Query<DoctorListQuery>,
) -> impl Responder {
    let doctors = data.mongodb.db.collection::<DoctorProfile>("doctors");
    let mut cursor = match doctors.find(doctor_list_filter(&query)).await {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("Error fetching doctor list: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error fetching doctor list"
            }));
        }
    };

    let mut list = Vec::new();
    while let Some(result) = cursor.next().await {
        match result {
            Ok(doctor) => list.push(doctor),
            Err(e) => {
                error!("Error reading doctor list: {}", e);
                return HttpResponse::InternalServerError().json(json!({
                    "success": false,
                    "message": "Error fetching doctor list"
                }));
            }
        }
    }
    HttpResponse::Ok().json(json!({ "doctors": list, "success": true }))
}

/// GET /api/doctor/profile/{id}. Public doctor detail by user id.
pub async fn get_doctor_by_id(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let user_id = path.into_inner();
    match profiles::get_profile::<DoctorProfile>(&data.mongodb.db, &user_id).await {
        Ok(Some(doctor)) => HttpResponse::Ok().json(json!({ "doctor": doctor, "success": true })),
        Ok(None) => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "Doctor profile not found"
        })),
        Err(e) => {
            error!("Error fetching doctor {}: {}", user_id, e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error fetching doctor details"
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_builds_empty_filter() {
        let filter = doctor_list_filter(&DoctorListQuery {
            specialization: None,
            experience: None,
            languages: None,
        });
        assert!(filter.is_empty());
    }

    #[test]
    fn filters_combine_all_supplied_fields() {
        let filter = doctor_list_filter(&DoctorListQuery {
            specialization: Some("radiology".to_string()),
            experience: Some(5),
            languages: Some("English, German".to_string()),
        });
        assert_eq!(
            filter.get_document("info.specialization").unwrap().get_str("$regex"),
            Ok("radiology")
        );
        assert_eq!(
            filter.get_document("info.experience").unwrap().get_i32("$gte"),
            Ok(5)
        );
        let langs = filter
            .get_document("info.languages")
            .unwrap()
            .get_array("$in")
            .unwrap();
        assert_eq!(langs.len(), 2);
    }

    #[test]
    fn blank_language_entries_are_dropped() {
        let filter = doctor_list_filter(&DoctorListQuery {
            specialization: None,
            experience: None,
            languages: Some(" , ,".to_string()),
        });
        assert!(filter.get_document("info.languages").is_err());
    }
}
