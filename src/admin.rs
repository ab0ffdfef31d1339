// src/admin.rs
//
// Read and moderation surface over doctor and organization profiles. Every
// handler here is gated on the admin role; listings join the owning user's
// account fields onto each profile.

use std::collections::HashMap;

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use futures::stream::TryStreamExt;
use mongodb::bson::doc;
use mongodb::Database;
use serde::{Deserialize, Serialize};
use serde_json::json;
use log::{error, info};

use crate::app_state::AppState;
use crate::auth;
use crate::models::{DoctorProfile, OrganizationProfile, ProfileStatus, User};
use crate::profiles::{self, ProfileKind};

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: ProfileStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_photo: Option<String>,
}

/// Loads account summaries for the given user ids, keyed by id.
async fn user_summaries(
    db: &Database,
    user_ids: &[String],
) -> mongodb::error::Result<HashMap<String, UserSummary>> {
    if user_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let users: Vec<User> = db
        .collection::<User>("users")
        .find(doc! { "userId": { "$in": user_ids.to_vec() } })
        .await?
        .try_collect()
        .await?;
    Ok(users
        .into_iter()
        .map(|u| {
            (
                u.user_id,
                UserSummary {
                    email: u.email,
                    display_name: u.display_name,
                    profile_photo: u.profile_photo,
                },
            )
        })
        .collect())
}

/// Serializes each profile and attaches a `user` field with account details.
fn join_users<P: ProfileKind>(
    profiles: Vec<P>,
    user_ids: Vec<String>,
    summaries: HashMap<String, UserSummary>,
) -> Result<Vec<serde_json::Value>, serde_json::Error> {
    profiles
        .into_iter()
        .zip(user_ids)
        .map(|(profile, user_id)| {
            let mut value = serde_json::to_value(&profile)?;
            if let Some(obj) = value.as_object_mut() {
                let user = summaries
                    .get(&user_id)
                    .map(|s| serde_json::to_value(s))
                    .transpose()?
                    .unwrap_or(serde_json::Value::Null);
                obj.insert("user".to_string(), user);
            }
            Ok(value)
        })
        .collect()
}

async fn list_with_users<P, F>(
    db: &Database,
    user_id_of: F,
    key: &str,
    error_message: &str,
) -> HttpResponse
where
    P: ProfileKind,
    F: Fn(&P) -> String,
{
    let profiles: Vec<P> = match db.collection::<P>(P::COLLECTION).find(doc! {}).await {
        Ok(cursor) => match cursor.try_collect().await {
            Ok(profiles) => profiles,
            Err(e) => {
                error!("{}: {}", error_message, e);
                return HttpResponse::InternalServerError()
                    .json(json!({ "success": false, "message": error_message }));
            }
        },
        Err(e) => {
            error!("{}: {}", error_message, e);
            return HttpResponse::InternalServerError()
                .json(json!({ "success": false, "message": error_message }));
        }
    };

    let user_ids: Vec<String> = profiles.iter().map(&user_id_of).collect();
    let summaries = match user_summaries(db, &user_ids).await {
        Ok(summaries) => summaries,
        Err(e) => {
            error!("Error joining user accounts: {}", e);
            return HttpResponse::InternalServerError()
                .json(json!({ "success": false, "message": error_message }));
        }
    };

    match join_users(profiles, user_ids, summaries) {
        Ok(joined) => HttpResponse::Ok().json(json!({ "success": true, key: joined })),
        Err(e) => {
            error!("Error serializing profiles: {}", e);
            HttpResponse::InternalServerError()
                .json(json!({ "success": false, "message": error_message }))
        }
    }
}

/// GET /api/admin/doctors
pub async fn get_all_doctors(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    if let Err(resp) = auth::require_admin(&req) {
        return resp;
    }
    list_with_users(
        &data.mongodb.db,
        |d: &DoctorProfile| d.user_id.clone(),
        "doctors",
        "Error fetching doctors",
    )
    .await
}

/// GET /api/admin/organizations
pub async fn get_all_organizations(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    if let Err(resp) = auth::require_admin(&req) {
        return resp;
    }
    list_with_users(
        &data.mongodb.db,
        |o: &OrganizationProfile| o.user_id.clone(),
        "organizations",
        "Error fetching organizations",
    )
    .await
}

/// GET /api/admin/doctors/{id}
pub async fn get_doctor_by_id(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    if let Err(resp) = auth::require_admin(&req) {
        return resp;
    }
    let user_id = path.into_inner();
    match profiles::get_profile::<DoctorProfile>(&data.mongodb.db, &user_id).await {
        Ok(Some(doctor)) => HttpResponse::Ok().json(json!({ "success": true, "doctor": doctor })),
        Ok(None) => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "Doctor not found"
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

/// GET /api/admin/organizations/{id}
pub async fn get_organization_by_id(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    if let Err(resp) = auth::require_admin(&req) {
        return resp;
    }
    let user_id = path.into_inner();
    match profiles::get_profile::<OrganizationProfile>(&data.mongodb.db, &user_id).await {
        Ok(Some(org)) => HttpResponse::Ok().json(json!({ "success": true, "organization": org })),
        Ok(None) => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "Organization not found"
        })),
        Err(e) => {
            error!("Error fetching organization {}: {}", user_id, e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error fetching organization details"
            }))
        }
    }
}

/// GET /api/admin/organizations/{id}/projects
pub async fn get_organization_projects(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    if let Err(resp) = auth::require_admin(&req) {
        return resp;
    }
    let user_id = path.into_inner();
    match profiles::get_profile::<OrganizationProfile>(&data.mongodb.db, &user_id).await {
        Ok(Some(org)) => HttpResponse::Ok().json(json!({
            "success": true,
            "projects": org.projects
        })),
        Ok(None) => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "Organization not found"
        })),
        Err(e) => {
            error!("Error fetching projects for {}: {}", user_id, e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error fetching organization projects"
            }))
        }
    }
}

/// PUT /api/admin/doctors/{id}/status
pub async fn update_doctor_status(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateStatusRequest>,
) -> impl Responder {
    let admin = match auth::require_admin(&req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let user_id = path.into_inner();
    let status = payload.into_inner().status;
    let status_bson = match mongodb::bson::to_bson(&status) {
        Ok(bson) => bson,
        Err(e) => {
            error!("Error serializing status: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error updating doctor status"
            }));
        }
    };

    let doctors = data.mongodb.db.collection::<DoctorProfile>("doctors");
    let update = doc! { "$set": {
        "status": status_bson,
        "updatedAt": Utc::now().to_rfc3339(),
    }};
    match doctors.update_one(doc! { "userId": &user_id }, update).await {
        Ok(res) if res.matched_count == 0 => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "Doctor not found"
        })),
        Ok(_) => {
            info!("Doctor {} status set to {:?} by {}", user_id, status, admin.email);
            match profiles::get_profile::<DoctorProfile>(&data.mongodb.db, &user_id).await {
                Ok(Some(doctor)) => {
                    HttpResponse::Ok().json(json!({ "success": true, "doctor": doctor }))
                }
                _ => HttpResponse::InternalServerError().json(json!({
                    "success": false,
                    "message": "Error updating doctor status"
                })),
            }
        }
        Err(e) => {
            error!("Error updating doctor status: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error updating doctor status"
            }))
        }
    }
}

/// PUT /api/admin/organizations/{id}/status
pub async fn update_organization_status(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateStatusRequest>,
) -> impl Responder {
    let admin = match auth::require_admin(&req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    let user_id = path.into_inner();
    let status = payload.into_inner().status;
    let status_bson = match mongodb::bson::to_bson(&status) {
        Ok(bson) => bson,
        Err(e) => {
            error!("Error serializing status: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error updating organization status"
            }));
        }
    };

    let organizations = data
        .mongodb
        .db
        .collection::<OrganizationProfile>("organizations");
    match organizations
        .update_one(doc! { "userId": &user_id }, doc! { "$set": { "status": status_bson } })
        .await
    {
        Ok(res) if res.matched_count == 0 => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "Organization not found"
        })),
        Ok(_) => {
            info!(
                "Organization {} status set to {:?} by {}",
                user_id, status, admin.email
            );
            match profiles::get_profile::<OrganizationProfile>(&data.mongodb.db, &user_id).await {
                Ok(Some(org)) => {
                    HttpResponse::Ok().json(json!({ "success": true, "organization": org }))
                }
                _ => HttpResponse::InternalServerError().json(json!({
                    "success": false,
                    "message": "Error updating organization status"
                })),
            }
        }
        Err(e) => {
            error!("Error updating organization status: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error updating organization status"
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProfileStatus;
    use chrono::Utc;

    fn profile(user_id: &str) -> OrganizationProfile {
        OrganizationProfile {
            user_id: user_id.to_string(),
            name: "Clinic".to_string(),
            contact_number: "1".to_string(),
            number_of_employees: 3,
            status: ProfileStatus::Active,
            projects: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn join_attaches_matching_user() {
        let mut summaries = HashMap::new();
        summaries.insert(
            "u1".to_string(),
            UserSummary {
                email: "a@x.com".to_string(),
                display_name: Some("A".to_string()),
                profile_photo: None,
            },
        );
        let joined = join_users(vec![profile("u1")], vec!["u1".to_string()], summaries).unwrap();
        assert_eq!(joined[0]["user"]["email"], "a@x.com");
        assert_eq!(joined[0]["user"]["displayName"], "A");
    }

    #[test]
    fn join_without_account_yields_null_user() {
        let joined = join_users(
            vec![profile("u2")],
            vec!["u2".to_string()],
            HashMap::new(),
        )
        .unwrap();
        assert!(joined[0]["user"].is_null());
    }

    #[test]
    fn status_payload_rejects_unknown_values() {
        let ok: Result<UpdateStatusRequest, _> = serde_json::from_str(r#"{"status":"active"}"#);
        assert!(ok.is_ok());
        let bad: Result<UpdateStatusRequest, _> = serde_json::from_str(r#"{"status":"banished"}"#);
        assert!(bad.is_err());
    }
}
