// src/organization.rs

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use mongodb::bson::{doc, to_bson};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use log::{error, info};

use crate::app_state::AppState;
use crate::auth;
use crate::db::is_duplicate_key_error;
use crate::keys;
use crate::models::{Link, OrganizationProfile, ProfileStatus, Project};
use crate::profiles::{self, ProfileError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrganizationRequest {
    pub name: String,
    pub contact_number: String,
    pub number_of_employees: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditOrganizationRequest {
    pub name: Option<String>,
    pub contact_number: Option<String>,
    pub number_of_employees: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkInput {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct AddProjectRequest {
    pub name: String,
    pub description: String,
    pub links: Option<Vec<LinkInput>>,
}

#[derive(Debug, Deserialize)]
pub struct EditProjectRequest {
    pub action: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub links: Option<Vec<LinkInput>>,
}

/// Every link needs a non-empty title and url.
pub fn validate_links(links: &[LinkInput]) -> bool {
    links
        .iter()
        .all(|l| !l.title.trim().is_empty() && !l.url.trim().is_empty())
}

/// Filter for pushing a new project: matches the owner only while no sibling
/// project carries the minted key. The unique index rejects cross-document
/// duplicates but not duplicates inside one document's array, so the `$ne`
/// guard covers that case and a miss retries with a fresh key.
fn push_project_filter(user_id: &str, project_key: &str) -> mongodb::bson::Document {
    doc! {
        "userId": user_id,
        "projects.projectKey": { "$ne": project_key },
    }
}

fn build_links(inputs: Vec<LinkInput>) -> Vec<Link> {
    inputs
        .into_iter()
        .map(|input| Link {
            link_id: Uuid::new_v4().to_string(),
            title: input.title,
            url: input.url,
            assigned_doctor: None,
        })
        .collect()
}

/// POST /api/organization/profile
pub async fn create_profile(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateOrganizationRequest>,
) -> impl Responder {
    let user = match auth::current_user(&req) {
        Some(user) => user,
        None => return auth::unauthorized(),
    };

    let payload = payload.into_inner();
    if payload.name.trim().is_empty() || payload.contact_number.trim().is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": "Name and contact number are required"
        }));
    }

    let organization = OrganizationProfile {
        user_id: user.id.clone(),
        name: payload.name,
        contact_number: payload.contact_number,
        number_of_employees: payload.number_of_employees,
        status: ProfileStatus::Pending,
        projects: Vec::new(),
        created_at: Utc::now(),
    };

    match profiles::create_profile(&data.mongodb.db, &user.id, &organization).await {
        Ok(()) => {
            info!("Organization profile created for {}", user.id);
            HttpResponse::Created().json(json!({ "organization": organization, "success": true }))
        }
        Err(ProfileError::Conflict) => HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": "Organization profile already exists"
        })),
        Err(ProfileError::Database(e)) => {
            error!("Error creating organization profile: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error creating profile"
            }))
        }
    }
}

/// GET /api/organization/profile
pub async fn get_profile(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let user = match auth::current_user(&req) {
        Some(user) => user,
        None => return auth::unauthorized(),
    };

    match profiles::get_profile::<OrganizationProfile>(&data.mongodb.db, &user.id).await {
        Ok(Some(organization)) => {
            HttpResponse::Ok().json(json!({ "organization": organization, "success": true }))
        }
        Ok(None) => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "Organization not found"
        })),
        Err(e) => {
            error!("Get profile error: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error fetching profile"
            }))
        }
    }
}

/// PUT /api/organization/profile. Patches only the supplied fields.
pub async fn edit_profile(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<EditOrganizationRequest>,
) -> impl Responder {
    let user = match auth::current_user(&req) {
        Some(user) => user,
        None => return auth::unauthorized(),
    };

    let mut set_doc = doc! {};
    if let Some(name) = &payload.name {
        set_doc.insert("name", name);
    }
    if let Some(contact) = &payload.contact_number {
        set_doc.insert("contactNumber", contact);
    }
    if let Some(employees) = payload.number_of_employees {
        set_doc.insert("numberOfEmployees", employees);
    }
    if set_doc.is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": "No fields to update"
        }));
    }

    let organizations = data.mongodb.db.collection::<OrganizationProfile>("organizations");
    match organizations
        .update_one(doc! { "userId": &user.id }, doc! { "$set": set_doc })
        .await
    {
        Ok(res) if res.matched_count == 0 => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "Organization not found"
        })),
        Ok(_) => {
            match profiles::get_profile::<OrganizationProfile>(&data.mongodb.db, &user.id).await {
                Ok(Some(organization)) => {
                    HttpResponse::Ok().json(json!({ "organization": organization, "success": true }))
                }
                _ => HttpResponse::InternalServerError().json(json!({
                    "success": false,
                    "message": "Error updating profile"
                })),
            }
        }
        Err(e) => {
            error!("Error updating organization profile: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error updating profile"
            }))
        }
    }
}

/// DELETE /api/organization/profile. Embedded projects are cleared first.
pub async fn delete_profile(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let user = match auth::current_user(&req) {
        Some(user) => user,
        None => return auth::unauthorized(),
    };

    match profiles::delete_profile::<OrganizationProfile>(&data.mongodb.db, &user.id).await {
        Ok(true) => {
            info!("Organization profile deleted for {}", user.id);
            HttpResponse::Ok().json(json!({
                "success": true,
                "message": "Organization profile deleted successfully"
            }))
        }
        Ok(false) => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "Organization not found"
        })),
        Err(e) => {
            error!("Error deleting organization: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error deleting organization profile"
            }))
        }
    }
}

/// POST /api/organization/project
pub async fn add_project(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<AddProjectRequest>,
) -> impl Responder {
    let user = match auth::current_user(&req) {
        Some(user) => user,
        None => return auth::unauthorized(),
    };

    let payload = payload.into_inner();
    if payload.name.trim().is_empty() || payload.description.trim().is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": "Name and description are required"
        }));
    }
    let link_inputs = payload.links.unwrap_or_default();
    if !validate_links(&link_inputs) {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": "Invalid links format. Each link must have title and url"
        }));
    }

    let organizations = data.mongodb.db.collection::<OrganizationProfile>("organizations");
    match organizations.find_one(doc! { "userId": &user.id }).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return HttpResponse::NotFound().json(json!({
                "success": false,
                "message": "Organization not found"
            }))
        }
        Err(e) => {
            error!("Error loading organization: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error adding project"
            }));
        }
    }

    let links = build_links(link_inputs);
    // The unique index on projects.projectKey rejects a colliding key; mint a
    // fresh one and push again.
    loop {
        let project = Project {
            project_id: Uuid::new_v4().to_string(),
            name: payload.name.clone(),
            description: payload.description.clone(),
            project_key: keys::generate_access_key(),
            links: links.clone(),
            assigned_doctor: None,
            created_at: Utc::now(),
        };
        let project_bson = match to_bson(&project) {
            Ok(bson) => bson,
            Err(e) => {
                error!("Error serializing project: {}", e);
                return HttpResponse::InternalServerError().json(json!({
                    "success": false,
                    "message": "Error adding project"
                }));
            }
        };
        match organizations
            .update_one(
                push_project_filter(&user.id, &project.project_key),
                doc! { "$push": { "projects": project_bson } },
            )
            .await
        {
            Ok(res) if res.matched_count == 1 => {
                info!("Project {} added for {}", project.project_id, user.id);
                return HttpResponse::Created().json(json!({ "project": project, "success": true }));
            }
            // The organization exists (checked above), so a miss means the
            // minted key already sits in this document.
            Ok(_) => continue,
            Err(e) if is_duplicate_key_error(&e) => continue,
            Err(e) => {
                error!("Error adding project: {}", e);
                return HttpResponse::InternalServerError().json(json!({
                    "success": false,
                    "message": "Error adding project"
                }));
            }
        }
    }
}

/// GET /api/organization/projects
pub async fn get_projects(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let user = match auth::current_user(&req) {
        Some(user) => user,
        None => return auth::unauthorized(),
    };

    match profiles::get_profile::<OrganizationProfile>(&data.mongodb.db, &user.id).await {
        Ok(Some(organization)) => {
            HttpResponse::Ok().json(json!({ "projects": organization.projects, "success": true }))
        }
        Ok(None) => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "Organization not found"
        })),
        Err(e) => {
            error!("Get projects error: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error fetching projects"
            }))
        }
    }
}

/// GET /api/organization/project/{project_id}
pub async fn get_project_by_id(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let user = match auth::current_user(&req) {
        Some(user) => user,
        None => return auth::unauthorized(),
    };
    let project_id = path.into_inner();

    let organizations = data.mongodb.db.collection::<OrganizationProfile>("organizations");
    match organizations
        .find_one(doc! { "userId": &user.id, "projects.projectId": &project_id })
        .await
    {
        Ok(Some(organization)) => {
            match organization.projects.into_iter().find(|p| p.project_id == project_id) {
                Some(project) => {
                    HttpResponse::Ok().json(json!({ "project": project, "success": true }))
                }
                None => HttpResponse::NotFound().json(json!({
                    "success": false,
                    "message": "Project not found"
                })),
            }
        }
        Ok(None) => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "Project not found"
        })),
        Err(e) => {
            error!("Get project by ID error: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error fetching project details"
            }))
        }
    }
}

/// PUT /api/organization/project/{project_id}. An `action: "delete"` body removes
/// the project, anything else patches the supplied fields in place.
pub async fn edit_or_delete_project(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<EditProjectRequest>,
) -> impl Responder {
    let user = match auth::current_user(&req) {
        Some(user) => user,
        None => return auth::unauthorized(),
    };
    let project_id = path.into_inner();
    let payload = payload.into_inner();

    let organizations = data.mongodb.db.collection::<OrganizationProfile>("organizations");

    if payload.action.as_deref() == Some("delete") {
        return match organizations
            .update_one(
                doc! { "userId": &user.id },
                doc! { "$pull": { "projects": { "projectId": &project_id } } },
            )
            .await
        {
            Ok(res) if res.matched_count == 0 => HttpResponse::NotFound().json(json!({
                "success": false,
                "message": "Organization not found"
            })),
            Ok(res) if res.modified_count == 0 => HttpResponse::NotFound().json(json!({
                "success": false,
                "message": "Project not found"
            })),
            Ok(_) => {
                info!("Project {} deleted for {}", project_id, user.id);
                HttpResponse::Ok().json(json!({
                    "success": true,
                    "message": "Project deleted successfully"
                }))
            }
            Err(e) => {
                error!("Error deleting project: {}", e);
                HttpResponse::InternalServerError().json(json!({
                    "success": false,
                    "message": "Error updating/deleting project"
                }))
            }
        };
    }

    let mut set_doc = doc! {};
    if let Some(name) = &payload.name {
        set_doc.insert("projects.$.name", name);
    }
    if let Some(description) = &payload.description {
        set_doc.insert("projects.$.description", description);
    }
    if let Some(link_inputs) = payload.links {
        if !validate_links(&link_inputs) {
            return HttpResponse::BadRequest().json(json!({
                "success": false,
                "message": "Invalid links format. Each link must have title and url"
            }));
        }
        match to_bson(&build_links(link_inputs)) {
            Ok(bson) => {
                set_doc.insert("projects.$.links", bson);
            }
            Err(e) => {
                error!("Error serializing links: {}", e);
                return HttpResponse::InternalServerError().json(json!({
                    "success": false,
                    "message": "Error updating/deleting project"
                }));
            }
        }
    }
    if set_doc.is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": "No fields to update"
        }));
    }

    match organizations
        .update_one(
            doc! { "userId": &user.id, "projects.projectId": &project_id },
            doc! { "$set": set_doc },
        )
        .await
    {
        Ok(res) if res.matched_count == 0 => HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "Project not found"
        })),
        Ok(_) => {
            match organizations
                .find_one(doc! { "userId": &user.id, "projects.projectId": &project_id })
                .await
            {
                Ok(Some(organization)) => {
                    let project = organization
                        .projects
                        .into_iter()
                        .find(|p| p.project_id == project_id);
                    HttpResponse::Ok().json(json!({ "project": project, "success": true }))
                }
                _ => HttpResponse::InternalServerError().json(json!({
                    "success": false,
                    "message": "Error updating/deleting project"
                })),
            }
        }
        Err(e) => {
            error!("Error updating project: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error updating/deleting project"
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_require_title_and_url() {
        let good = vec![
            LinkInput { title: "Batch 1".to_string(), url: "http://x".to_string() },
            LinkInput { title: "Batch 2".to_string(), url: "http://y".to_string() },
        ];
        assert!(validate_links(&good));
        assert!(validate_links(&[]));

        let missing_url = vec![LinkInput { title: "Batch".to_string(), url: " ".to_string() }];
        assert!(!validate_links(&missing_url));
        let missing_title = vec![LinkInput { title: "".to_string(), url: "http://x".to_string() }];
        assert!(!validate_links(&missing_title));
    }

    #[test]
    fn project_push_filter_excludes_documents_holding_the_key() {
        let filter = push_project_filter("org-1", "Abc123Xyz789");
        assert_eq!(filter.get_str("userId"), Ok("org-1"));
        assert_eq!(
            filter
                .get_document("projects.projectKey")
                .unwrap()
                .get_str("$ne"),
            Ok("Abc123Xyz789")
        );
    }

    #[test]
    fn built_links_get_ids_and_no_assignment() {
        let links = build_links(vec![LinkInput {
            title: "Batch".to_string(),
            url: "http://x".to_string(),
        }]);
        assert_eq!(links.len(), 1);
        assert!(!links[0].link_id.is_empty());
        assert!(links[0].assigned_doctor.is_none());
    }
}
