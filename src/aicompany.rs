// src/aicompany.rs
//
// AI-company tenants: profile, server-minted API key, integration slots and
// the image-address catalog whose access keys feed the annotation surface.
// Key minting always retries on a duplicate-key rejection with a fresh key.

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use mongodb::bson::{doc, to_bson, Document};
use serde::Deserialize;
use serde_json::json;
use log::{error, info};

use crate::app_state::AppState;
use crate::auth;
use crate::db::is_duplicate_key_error;
use crate::keys;
use crate::models::{
    AICompanyProfile, ImageAddress, Integration, IntegrationStatus, IntegrationType,
    ProfileStatus, User,
};
use crate::profiles;

#[derive(Debug, Deserialize)]
pub struct CreateAICompanyRequest {
    pub name: String,
    pub website: String,
}

#[derive(Debug, Deserialize)]
pub struct EditAICompanyRequest {
    pub name: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IntegrationRequest {
    #[serde(rename = "type")]
    pub integration_type: IntegrationType,
    #[serde(default)]
    pub config: Document,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddImageAddressRequest {
    pub image_url: String,
    pub title: String,
}

fn internal_error(message: &str) -> HttpResponse {
    HttpResponse::InternalServerError().json(json!({ "success": false, "message": message }))
}

/// Filter for pushing a new image address: matches the owner only while no
/// existing entry carries the minted key. The unique index rejects
/// cross-document duplicates but not duplicates inside one document's array,
/// so the `$ne` guard covers that case and a miss retries with a fresh key.
fn push_image_filter(user_id: &str, access_key: &str) -> Document {
    doc! {
        "userId": user_id,
        "imageAddresses.accessKey": { "$ne": access_key },
    }
}

/// POST /api/aicompany/profile. Creates the profile and switches the user's
/// role, returning a re-signed token carrying it.
pub async fn create_profile(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateAICompanyRequest>,
) -> impl Responder {
    let user = match auth::current_user(&req) {
        Some(user) => user,
        None => return auth::unauthorized(),
    };
    let payload = payload.into_inner();
    if payload.name.trim().is_empty() || payload.website.trim().is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": "Company name and website are required"
        }));
    }

    let db = &data.mongodb.db;
    let companies = db.collection::<AICompanyProfile>("ai_companies");
    match companies.find_one(doc! { "userId": &user.id }).await {
        Ok(Some(_)) => {
            return HttpResponse::BadRequest().json(json!({
                "success": false,
                "message": "AI company profile already exists"
            }))
        }
        Ok(None) => {}
        Err(e) => {
            error!("AI company lookup error: {}", e);
            return internal_error("Error creating AI company profile");
        }
    }

    let company = loop {
        let now = Utc::now();
        let company = AICompanyProfile {
            user_id: user.id.clone(),
            name: payload.name.clone(),
            website: payload.website.clone(),
            api_key: keys::generate_api_key(),
            status: ProfileStatus::Pending,
            image_addresses: vec![],
            integrations: vec![],
            created_at: now,
            updated_at: now,
        };
        match companies.insert_one(&company).await {
            Ok(_) => break company,
            Err(e) if is_duplicate_key_error(&e) => {
                // Either a racing create for the same user or an api key
                // collision; re-check which before retrying with a fresh key.
                match companies.find_one(doc! { "userId": &user.id }).await {
                    Ok(Some(_)) => {
                        return HttpResponse::BadRequest().json(json!({
                            "success": false,
                            "message": "AI company profile already exists"
                        }))
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        error!("AI company lookup error: {}", e);
                        return internal_error("Error creating AI company profile");
                    }
                }
            }
            Err(e) => {
                error!("Error creating AI company profile: {}", e);
                return internal_error("Error creating AI company profile");
            }
        }
    };

    let users = db.collection::<User>("users");
    if let Err(e) = users
        .update_one(doc! { "userId": &user.id }, doc! { "$set": { "role": "aicompany" } })
        .await
    {
        error!("Error updating role for {}: {}", user.id, e);
        return internal_error("Error creating AI company profile");
    }
    let updated_user = match users.find_one(doc! { "userId": &user.id }).await {
        Ok(Some(user)) => user,
        _ => return internal_error("Error creating AI company profile"),
    };
    let token = match auth::create_jwt(&updated_user, &data.config.jwt_secret) {
        Ok(token) => token,
        Err(e) => {
            error!("Error signing token: {}", e);
            return internal_error("Error creating AI company profile");
        }
    };

    info!("AI company profile created for {}", user.id);
    HttpResponse::Created().json(json!({
        "success": true,
        "company": company,
        "token": token
    }))
}

/// GET /api/aicompany/profile
pub async fn get_profile(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let user = match auth::current_user(&req) {
        Some(user) => user,
        None => return auth::unauthorized(),
    };
    match profiles::get_profile::<AICompanyProfile>(&data.mongodb.db, &user.id).await {
        Ok(Some(company)) => {
            HttpResponse::Ok().json(json!({ "success": true, "company": company }))
        }
        Ok(None) => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "AI company profile not found"
        })),
        Err(e) => {
            error!("Error fetching AI company profile: {}", e);
            internal_error("Error fetching AI company profile")
        }
    }
}

/// PUT /api/aicompany/profile
pub async fn edit_profile(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<EditAICompanyRequest>,
) -> impl Responder {
    let user = match auth::current_user(&req) {
        Some(user) => user,
        None => return auth::unauthorized(),
    };
    let payload = payload.into_inner();

    let mut set_doc = doc! { "updatedAt": Utc::now().to_rfc3339() };
    if let Some(name) = &payload.name {
        set_doc.insert("name", name);
    }
    if let Some(website) = &payload.website {
        set_doc.insert("website", website);
    }
    if payload.name.is_none() && payload.website.is_none() {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": "At least one field to update is required"
        }));
    }

    let companies = data.mongodb.db.collection::<AICompanyProfile>("ai_companies");
    match companies
        .update_one(doc! { "userId": &user.id }, doc! { "$set": set_doc })
        .await
    {
        Ok(res) if res.matched_count == 0 => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "AI company profile not found"
        })),
        Ok(_) => {
            match profiles::get_profile::<AICompanyProfile>(&data.mongodb.db, &user.id).await {
                Ok(Some(company)) => {
                    HttpResponse::Ok().json(json!({ "success": true, "company": company }))
                }
                _ => internal_error("Error updating AI company profile"),
            }
        }
        Err(e) => {
            error!("Error updating AI company profile: {}", e);
            internal_error("Error updating AI company profile")
        }
    }
}

/// DELETE /api/aicompany/profile
pub async fn delete_profile(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let user = match auth::current_user(&req) {
        Some(user) => user,
        None => return auth::unauthorized(),
    };
    match profiles::delete_profile::<AICompanyProfile>(&data.mongodb.db, &user.id).await {
        Ok(true) => {
            info!("AI company profile deleted for {}", user.id);
            HttpResponse::Ok().json(json!({
                "success": true,
                "message": "AI company profile deleted successfully"
            }))
        }
        Ok(false) => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "AI company profile not found"
        })),
        Err(e) => {
            error!("Error deleting AI company profile: {}", e);
            internal_error("Error deleting AI company profile")
        }
    }
}

/// GET /api/aicompany/api-key
pub async fn get_api_key(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let user = match auth::current_user(&req) {
        Some(user) => user,
        None => return auth::unauthorized(),
    };
    match profiles::get_profile::<AICompanyProfile>(&data.mongodb.db, &user.id).await {
        Ok(Some(company)) => {
            HttpResponse::Ok().json(json!({ "success": true, "apiKey": company.api_key }))
        }
        Ok(None) => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "AI company profile not found"
        })),
        Err(e) => {
            error!("Error fetching API key: {}", e);
            internal_error("Error fetching API key")
        }
    }
}

/// POST /api/aicompany/api-key/regenerate. The old key stops working as soon
/// as the update lands.
pub async fn regenerate_api_key(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let user = match auth::current_user(&req) {
        Some(user) => user,
        None => return auth::unauthorized(),
    };
    let companies = data.mongodb.db.collection::<AICompanyProfile>("ai_companies");

    loop {
        let api_key = keys::generate_api_key();
        let update = doc! { "$set": {
            "apiKey": &api_key,
            "updatedAt": Utc::now().to_rfc3339(),
        }};
        match companies.update_one(doc! { "userId": &user.id }, update).await {
            Ok(res) if res.matched_count == 0 => {
                return HttpResponse::NotFound().json(json!({
                    "success": false,
                    "message": "AI company profile not found"
                }))
            }
            Ok(_) => {
                info!("API key regenerated for {}", user.id);
                return HttpResponse::Ok().json(json!({
                    "success": true,
                    "message": "API key regenerated successfully",
                    "apiKey": api_key
                }));
            }
            Err(e) if is_duplicate_key_error(&e) => continue,
            Err(e) => {
                error!("Error regenerating API key: {}", e);
                return internal_error("Error regenerating API key");
            }
        }
    }
}

/// POST /api/aicompany/integration. One slot per integration type; a repeat
/// configure replaces the slot's config and flips it back to configured.
pub async fn configure_integration(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<IntegrationRequest>,
) -> impl Responder {
    let user = match auth::current_user(&req) {
        Some(user) => user,
        None => return auth::unauthorized(),
    };
    let payload = payload.into_inner();

    let type_bson = match to_bson(&payload.integration_type) {
        Ok(bson) => bson,
        Err(e) => {
            error!("Error serializing integration type: {}", e);
            return internal_error("Error configuring integration");
        }
    };

    let companies = data.mongodb.db.collection::<AICompanyProfile>("ai_companies");
    let now = Utc::now();
    let positional = companies
        .update_one(
            doc! { "userId": &user.id, "integrations.type": &type_bson },
            doc! { "$set": {
                "integrations.$.status": "configured",
                "integrations.$.config": &payload.config,
                "updatedAt": now.to_rfc3339(),
            }},
        )
        .await;
    match positional {
        Ok(res) if res.matched_count == 1 => {}
        Ok(_) => {
            let integration = Integration {
                integration_type: payload.integration_type,
                status: IntegrationStatus::Configured,
                config: payload.config.clone(),
                created_at: now,
            };
            let integration_bson = match to_bson(&integration) {
                Ok(bson) => bson,
                Err(e) => {
                    error!("Error serializing integration: {}", e);
                    return internal_error("Error configuring integration");
                }
            };
            let pushed = companies
                .update_one(
                    doc! { "userId": &user.id },
                    doc! {
                        "$push": { "integrations": integration_bson },
                        "$set": { "updatedAt": now.to_rfc3339() },
                    },
                )
                .await;
            match pushed {
                Ok(res) if res.matched_count == 0 => {
                    return HttpResponse::NotFound().json(json!({
                        "success": false,
                        "message": "AI company profile not found"
                    }))
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Error configuring integration: {}", e);
                    return internal_error("Error configuring integration");
                }
            }
        }
        Err(e) => {
            error!("Error configuring integration: {}", e);
            return internal_error("Error configuring integration");
        }
    }

    match profiles::get_profile::<AICompanyProfile>(&data.mongodb.db, &user.id).await {
        Ok(Some(company)) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Integration configured successfully",
            "integrations": company.integrations
        })),
        _ => internal_error("Error configuring integration"),
    }
}

/// POST /api/aicompany/image-address
pub async fn add_image_address(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<AddImageAddressRequest>,
) -> impl Responder {
    let user = match auth::current_user(&req) {
        Some(user) => user,
        None => return auth::unauthorized(),
    };
    let payload = payload.into_inner();
    if payload.image_url.trim().is_empty() || payload.title.trim().is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": "Image URL and title are required"
        }));
    }

    let companies = data.mongodb.db.collection::<AICompanyProfile>("ai_companies");
    loop {
        let image = ImageAddress {
            image_url: payload.image_url.clone(),
            title: payload.title.clone(),
            access_key: keys::generate_access_key(),
            created_at: Utc::now(),
        };
        let image_bson = match to_bson(&image) {
            Ok(bson) => bson,
            Err(e) => {
                error!("Error serializing image address: {}", e);
                return internal_error("Error adding image address");
            }
        };
        let result = companies
            .update_one(
                push_image_filter(&user.id, &image.access_key),
                doc! {
                    "$push": { "imageAddresses": image_bson },
                    "$set": { "updatedAt": Utc::now().to_rfc3339() },
                },
            )
            .await;
        match result {
            Ok(res) if res.matched_count == 0 => {
                // Missing profile and an in-document key collision both land
                // here; tell them apart before answering.
                match companies.find_one(doc! { "userId": &user.id }).await {
                    Ok(Some(_)) => continue,
                    Ok(None) => {
                        return HttpResponse::NotFound().json(json!({
                            "success": false,
                            "message": "AI company profile not found"
                        }))
                    }
                    Err(e) => {
                        error!("AI company lookup error: {}", e);
                        return internal_error("Error adding image address");
                    }
                }
            }
            Ok(_) => {
                info!("Image address {} added for {}", image.access_key, user.id);
                return HttpResponse::Created().json(json!({
                    "success": true,
                    "message": "Image address added successfully",
                    "imageAddress": image
                }));
            }
            Err(e) if is_duplicate_key_error(&e) => continue,
            Err(e) => {
                error!("Error adding image address: {}", e);
                return internal_error("Error adding image address");
            }
        }
    }
}

/// GET /api/aicompany/image-addresses
pub async fn get_image_addresses(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let user = match auth::current_user(&req) {
        Some(user) => user,
        None => return auth::unauthorized(),
    };
    match profiles::get_profile::<AICompanyProfile>(&data.mongodb.db, &user.id).await {
        Ok(Some(company)) => HttpResponse::Ok().json(json!({
            "success": true,
            "imageAddresses": company.image_addresses
        })),
        Ok(None) => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "AI company profile not found"
        })),
        Err(e) => {
            error!("Error fetching image addresses: {}", e);
            internal_error("Error fetching image addresses")
        }
    }
}

/// DELETE /api/aicompany/image-address/{access_key}
pub async fn delete_image_address(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let user = match auth::current_user(&req) {
        Some(user) => user,
        None => return auth::unauthorized(),
    };
    let access_key = path.into_inner();

    let companies = data.mongodb.db.collection::<AICompanyProfile>("ai_companies");
    let result = companies
        .update_one(
            doc! { "userId": &user.id },
            doc! {
                "$pull": { "imageAddresses": { "accessKey": &access_key } },
                "$set": { "updatedAt": Utc::now().to_rfc3339() },
            },
        )
        .await;
    match result {
        Ok(res) if res.matched_count == 0 => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "AI company profile not found"
        })),
        Ok(res) if res.modified_count == 0 => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "Image address not found"
        })),
        Ok(_) => {
            info!("Image address {} removed for {}", access_key, user.id);
            HttpResponse::Ok().json(json!({
                "success": true,
                "message": "Image address deleted successfully"
            }))
        }
        Err(e) => {
            error!("Error deleting image address: {}", e);
            internal_error("Error deleting image address")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integration_request_parses_type_tag() {
        let parsed: IntegrationRequest =
            serde_json::from_str(r#"{"type":"data_access","config":{"bucket":"scans"}}"#).unwrap();
        assert_eq!(parsed.integration_type, IntegrationType::DataAccess);
        assert_eq!(parsed.config.get_str("bucket"), Ok("scans"));
    }

    #[test]
    fn integration_config_defaults_to_empty() {
        let parsed: IntegrationRequest = serde_json::from_str(r#"{"type":"api"}"#).unwrap();
        assert!(parsed.config.is_empty());
    }

    #[test]
    fn image_push_filter_excludes_documents_holding_the_key() {
        let filter = push_image_filter("u-1", "Abc123Xyz789");
        assert_eq!(filter.get_str("userId"), Ok("u-1"));
        assert_eq!(
            filter
                .get_document("imageAddresses.accessKey")
                .unwrap()
                .get_str("$ne"),
            Ok("Abc123Xyz789")
        );
    }

    #[test]
    fn image_request_uses_camel_case() {
        let parsed: AddImageAddressRequest =
            serde_json::from_str(r#"{"imageUrl":"http://x/i.png","title":"Scan"}"#).unwrap();
        assert_eq!(parsed.image_url, "http://x/i.png");
    }
}
