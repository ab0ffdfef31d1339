// src/assignment.rs
//
// Doctor-to-link (and legacy doctor-to-project) bindings. A link moves
// unassigned -> assigned -> completed; only the assigned doctor may complete
// it or edit its notes. Embedded mutations are addressed, conditional
// array-filtered updates so concurrent writers cannot overwrite each other.

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, to_bson};
use mongodb::Database;
use serde::{Deserialize, Serialize};
use serde_json::json;
use log::{error, info};

use crate::app_state::AppState;
use crate::auth;
use crate::models::{AssignedDoctor, AssignmentStatus, Link, OrganizationProfile, Project};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignLinksRequest {
    pub project_id: String,
    pub link_ids: Vec<String>,
    pub doctor_email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignProjectRequest {
    pub project_id: String,
    pub doctor_email: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub project_id: String,
    pub link_id: String,
    pub status: AssignmentStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveDraftRequest {
    pub project_id: String,
    pub link_id: String,
    pub notes: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeassignRequest {
    pub project_id: String,
    pub link_id: Option<String>,
}

/* -------------------------------------------------------------------------- */
/* Planning core                                                              */
/* -------------------------------------------------------------------------- */

/// Partition of a batch-assign request over a loaded project: links free to
/// take, by id and title, and links that already carry an assignee, by title.
/// Unknown link ids are skipped.
#[derive(Debug, Default, PartialEq)]
pub struct AssignmentPlan {
    pub assignable: Vec<(String, String)>,
    pub already_assigned: Vec<String>,
}

pub fn plan_link_assignment(project: &Project, link_ids: &[String]) -> AssignmentPlan {
    let mut plan = AssignmentPlan::default();
    for link_id in link_ids {
        let Some(link) = project.links.iter().find(|l| &l.link_id == link_id) else {
            continue;
        };
        if link.assigned_doctor.is_some() {
            plan.already_assigned.push(link.title.clone());
        } else {
            plan.assignable.push((link.link_id.clone(), link.title.clone()));
        }
    }
    plan
}

pub fn batch_message(assigned: usize, already_assigned: usize) -> String {
    if already_assigned > 0 {
        format!(
            "{} links assigned successfully. {} links were already assigned.",
            assigned, already_assigned
        )
    } else {
        "All links assigned successfully".to_string()
    }
}

pub fn link_owned_by(link: &Link, doctor_email: &str) -> bool {
    link.assigned_doctor
        .as_ref()
        .map(|a| a.doctor_email == doctor_email)
        .unwrap_or(false)
}

/* -------------------------------------------------------------------------- */
/* Per-doctor aggregation                                                     */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedLinkView {
    pub link_id: String,
    pub title: String,
    pub url: String,
    pub status: AssignmentStatus,
    pub assigned_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentGroup {
    pub project_id: String,
    pub organization_name: String,
    pub project_name: String,
    pub project_description: String,
    pub links: Vec<AssignedLinkView>,
}

/// Groups every link assigned to the doctor by project, with organization
/// and project metadata attached.
pub fn collect_doctor_assignments(
    organizations: &[OrganizationProfile],
    doctor_email: &str,
) -> Vec<AssignmentGroup> {
    let mut groups = Vec::new();
    for org in organizations {
        for project in &org.projects {
            let links: Vec<AssignedLinkView> = project
                .links
                .iter()
                .filter(|link| link_owned_by(link, doctor_email))
                .map(|link| {
                    let assigned = link.assigned_doctor.as_ref().expect("filtered above");
                    AssignedLinkView {
                        link_id: link.link_id.clone(),
                        title: link.title.clone(),
                        url: link.url.clone(),
                        status: assigned.status,
                        assigned_date: assigned.assigned_date,
                        completion_date: assigned.completion_date,
                        notes: assigned.notes.clone(),
                    }
                })
                .collect();
            if !links.is_empty() {
                groups.push(AssignmentGroup {
                    project_id: project.project_id.clone(),
                    organization_name: org.name.clone(),
                    project_name: project.name.clone(),
                    project_description: project.description.clone(),
                    links,
                });
            }
        }
    }
    groups
}

/* -------------------------------------------------------------------------- */
/* Handlers                                                                   */
/* -------------------------------------------------------------------------- */

fn internal_error(message: &str) -> HttpResponse {
    HttpResponse::InternalServerError().json(json!({ "success": false, "message": message }))
}

async fn load_org_with_project(
    db: &Database,
    project_id: &str,
) -> mongodb::error::Result<Option<OrganizationProfile>> {
    db.collection::<OrganizationProfile>("organizations")
        .find_one(doc! { "projects.projectId": project_id })
        .await
}

async fn doctor_user_exists(db: &Database, email: &str) -> mongodb::error::Result<bool> {
    let user = db
        .collection::<mongodb::bson::Document>("users")
        .find_one(doc! { "email": email, "role": "doctor" })
        .await?;
    Ok(user.is_some())
}

/// POST /api/admin/assignments/links
pub async fn assign_links(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<AssignLinksRequest>,
) -> impl Responder {
    if let Err(resp) = auth::require_admin(&req) {
        return resp;
    }
    let payload = payload.into_inner();
    if payload.link_ids.is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": "No links selected for assignment"
        }));
    }

    let db = &data.mongodb.db;
    match doctor_user_exists(db, &payload.doctor_email).await {
        Ok(true) => {}
        Ok(false) => {
            return HttpResponse::NotFound().json(json!({
                "success": false,
                "message": "Doctor not found with this email"
            }))
        }
        Err(e) => {
            error!("Doctor lookup error: {}", e);
            return internal_error("Error assigning links");
        }
    }

    let organization = match load_org_with_project(db, &payload.project_id).await {
        Ok(Some(org)) => org,
        Ok(None) => {
            return HttpResponse::NotFound().json(json!({
                "success": false,
                "message": "Project not found"
            }))
        }
        Err(e) => {
            error!("Error loading project: {}", e);
            return internal_error("Error assigning links");
        }
    };
    let Some(project) = organization
        .projects
        .iter()
        .find(|p| p.project_id == payload.project_id)
    else {
        return HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "Project not found"
        }));
    };

    let plan = plan_link_assignment(project, &payload.link_ids);
    let mut assigned_links = Vec::new();
    let mut already_assigned_links = plan.already_assigned;

    let organizations = db.collection::<OrganizationProfile>("organizations");
    for (link_id, title) in plan.assignable {
        let assignment = AssignedDoctor {
            doctor_email: payload.doctor_email.clone(),
            status: AssignmentStatus::Assigned,
            assigned_date: Utc::now(),
            completion_date: None,
            notes: None,
        };
        let assignment_bson = match to_bson(&assignment) {
            Ok(bson) => bson,
            Err(e) => {
                error!("Error serializing assignment: {}", e);
                return internal_error("Error assigning links");
            }
        };
        // The array filter re-checks that no assignee appeared since the
        // planning read; a racing writer turns this into a no-op.
        let result = organizations
            .update_one(
                doc! { "userId": &organization.user_id },
                doc! { "$set": { "projects.$[p].links.$[l].assignedDoctor": assignment_bson } },
            )
            .array_filters(vec![
                doc! { "p.projectId": &payload.project_id },
                doc! { "l.linkId": &link_id, "l.assignedDoctor": { "$exists": false } },
            ])
            .await;
        match result {
            Ok(res) if res.modified_count == 1 => assigned_links.push(title),
            Ok(_) => already_assigned_links.push(title),
            Err(e) => {
                error!("Error assigning link {}: {}", link_id, e);
                return internal_error("Error assigning links");
            }
        }
    }

    info!(
        "Assigned {} links of project {} to {} ({} already assigned)",
        assigned_links.len(),
        payload.project_id,
        payload.doctor_email,
        already_assigned_links.len()
    );
    HttpResponse::Ok().json(json!({
        "success": true,
        "message": batch_message(assigned_links.len(), already_assigned_links.len()),
        "assignedLinks": assigned_links,
        "alreadyAssignedLinks": already_assigned_links
    }))
}

/// POST /api/admin/assignments/project. Legacy whole-project binding.
pub async fn assign_project(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<AssignProjectRequest>,
) -> impl Responder {
    if let Err(resp) = auth::require_admin(&req) {
        return resp;
    }
    let payload = payload.into_inner();
    let db = &data.mongodb.db;

    match doctor_user_exists(db, &payload.doctor_email).await {
        Ok(true) => {}
        Ok(false) => {
            return HttpResponse::NotFound().json(json!({
                "success": false,
                "message": "Doctor not found with this email"
            }))
        }
        Err(e) => {
            error!("Doctor lookup error: {}", e);
            return internal_error("Error assigning project");
        }
    }

    let assignment = AssignedDoctor {
        doctor_email: payload.doctor_email.clone(),
        status: AssignmentStatus::Assigned,
        assigned_date: Utc::now(),
        completion_date: None,
        notes: payload.notes.clone(),
    };
    let assignment_bson = match to_bson(&assignment) {
        Ok(bson) => bson,
        Err(e) => {
            error!("Error serializing assignment: {}", e);
            return internal_error("Error assigning project");
        }
    };

    let organizations = db.collection::<OrganizationProfile>("organizations");
    let result = organizations
        .update_one(
            doc! { "projects": { "$elemMatch": {
                "projectId": &payload.project_id,
                "assignedDoctor": { "$exists": false },
            }}},
            doc! { "$set": { "projects.$.assignedDoctor": assignment_bson } },
        )
        .await;
    match result {
        Ok(res) if res.modified_count == 1 => {
            info!(
                "Project {} assigned to {}",
                payload.project_id, payload.doctor_email
            );
            let project = load_org_with_project(db, &payload.project_id)
                .await
                .ok()
                .flatten()
                .and_then(|org| {
                    org.projects
                        .into_iter()
                        .find(|p| p.project_id == payload.project_id)
                });
            HttpResponse::Ok().json(json!({
                "success": true,
                "message": "Project assigned successfully",
                "project": project
            }))
        }
        Ok(_) => match load_org_with_project(db, &payload.project_id).await {
            Ok(Some(_)) => HttpResponse::BadRequest().json(json!({
                "success": false,
                "message": "Project is already assigned to a doctor"
            })),
            Ok(None) => HttpResponse::NotFound().json(json!({
                "success": false,
                "message": "Project not found"
            })),
            Err(e) => {
                error!("Error classifying assign failure: {}", e);
                internal_error("Error assigning project")
            }
        },
        Err(e) => {
            error!("Error assigning project: {}", e);
            internal_error("Error assigning project")
        }
    }
}

/// Ownership-checked mutation of a link's assignment sub-document. The write
/// itself re-verifies `assignedDoctor.doctorEmail`; a miss is classified
/// afterwards into 404 or 403.
async fn update_owned_assignment(
    db: &Database,
    project_id: &str,
    link_id: &str,
    doctor_email: &str,
    set_doc: mongodb::bson::Document,
    error_message: &str,
) -> HttpResponse {
    let organizations = db.collection::<OrganizationProfile>("organizations");
    let result = organizations
        .update_one(
            doc! { "projects.projectId": project_id },
            doc! { "$set": set_doc },
        )
        .array_filters(vec![
            doc! { "p.projectId": project_id },
            doc! { "l.linkId": link_id, "l.assignedDoctor.doctorEmail": doctor_email },
        ])
        .await;

    match result {
        Ok(res) if res.modified_count == 1 => {
            let link = load_org_with_project(db, project_id)
                .await
                .ok()
                .flatten()
                .and_then(|org| {
                    org.projects
                        .into_iter()
                        .find(|p| p.project_id == project_id)
                })
                .and_then(|p| p.links.into_iter().find(|l| l.link_id == link_id));
            HttpResponse::Ok().json(json!({
                "success": true,
                "message": "Assignment updated successfully",
                "data": link
            }))
        }
        Ok(_) => match load_org_with_project(db, project_id).await {
            Ok(Some(org)) => {
                let link = org
                    .projects
                    .iter()
                    .find(|p| p.project_id == project_id)
                    .and_then(|p| p.links.iter().find(|l| l.link_id == link_id));
                match link {
                    None => HttpResponse::NotFound().json(json!({
                        "success": false,
                        "message": "Assignment not found"
                    })),
                    Some(link) if !link_owned_by(link, doctor_email) => {
                        HttpResponse::Forbidden().json(json!({
                            "success": false,
                            "message": "Unauthorized to update this assignment"
                        }))
                    }
                    // Owned but the $set was a no-op (same values).
                    Some(_) => HttpResponse::Ok().json(json!({
                        "success": true,
                        "message": "Assignment updated successfully"
                    })),
                }
            }
            Ok(None) => HttpResponse::NotFound().json(json!({
                "success": false,
                "message": "Assignment not found"
            })),
            Err(e) => {
                error!("Error classifying update failure: {}", e);
                internal_error(error_message)
            }
        },
        Err(e) => {
            error!("{}: {}", error_message, e);
            internal_error(error_message)
        }
    }
}

async fn complete_assignment(
    db: &Database,
    payload: UpdateStatusRequest,
    doctor_email: &str,
) -> HttpResponse {
    // Only the terminal transition is exposed to clients.
    if payload.status != AssignmentStatus::Completed {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": "Invalid status update request"
        }));
    }

    let prefix = "projects.$[p].links.$[l].assignedDoctor";
    let mut set_doc = doc! {
        format!("{}.status", prefix): "completed",
        format!("{}.completionDate", prefix): Utc::now().to_rfc3339(),
    };
    if let Some(notes) = &payload.notes {
        set_doc.insert(format!("{}.notes", prefix), notes);
    }
    update_owned_assignment(
        db,
        &payload.project_id,
        &payload.link_id,
        doctor_email,
        set_doc,
        "Error updating assignment status",
    )
    .await
}

/// PUT /api/admin/assignments/status
pub async fn update_assignment_status(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<UpdateStatusRequest>,
) -> impl Responder {
    let admin = match auth::require_admin(&req) {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    complete_assignment(&data.mongodb.db, payload.into_inner(), &admin.email).await
}

/// POST /api/doctor/assignments/complete
pub async fn complete_own_assignment(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<UpdateStatusRequest>,
) -> impl Responder {
    let user = match auth::current_user(&req) {
        Some(user) => user,
        None => return auth::unauthorized(),
    };
    complete_assignment(&data.mongodb.db, payload.into_inner(), &user.email).await
}

/// POST /api/doctor/assignments/save-draft. Notes only, no status change.
pub async fn save_draft(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<SaveDraftRequest>,
) -> impl Responder {
    let user = match auth::current_user(&req) {
        Some(user) => user,
        None => return auth::unauthorized(),
    };
    let payload = payload.into_inner();
    let set_doc = doc! {
        "projects.$[p].links.$[l].assignedDoctor.notes": &payload.notes,
    };
    update_owned_assignment(
        &data.mongodb.db,
        &payload.project_id,
        &payload.link_id,
        &user.email,
        set_doc,
        "Error saving draft",
    )
    .await
}

/// DELETE /api/admin/assignments. Clears the binding on a link, or on the
/// whole project when no link id is given. Admin-gated like assignment.
pub async fn deassign(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<DeassignRequest>,
) -> impl Responder {
    if let Err(resp) = auth::require_admin(&req) {
        return resp;
    }
    let payload = payload.into_inner();
    let db = &data.mongodb.db;

    let organization = match load_org_with_project(db, &payload.project_id).await {
        Ok(Some(org)) => org,
        Ok(None) => {
            return HttpResponse::NotFound().json(json!({
                "success": false,
                "message": "Project not found"
            }))
        }
        Err(e) => {
            error!("Error loading project: {}", e);
            return internal_error("Error removing assignment");
        }
    };

    let organizations = db.collection::<OrganizationProfile>("organizations");
    let result = match &payload.link_id {
        Some(link_id) => {
            let project = organization
                .projects
                .iter()
                .find(|p| p.project_id == payload.project_id);
            let link_exists = project
                .map(|p| p.links.iter().any(|l| &l.link_id == link_id))
                .unwrap_or(false);
            if !link_exists {
                return HttpResponse::NotFound().json(json!({
                    "success": false,
                    "message": "Link not found"
                }));
            }
            organizations
                .update_one(
                    doc! { "userId": &organization.user_id },
                    doc! { "$unset": { "projects.$[p].links.$[l].assignedDoctor": "" } },
                )
                .array_filters(vec![
                    doc! { "p.projectId": &payload.project_id },
                    doc! { "l.linkId": link_id },
                ])
                .await
        }
        None => {
            organizations
                .update_one(
                    doc! { "userId": &organization.user_id },
                    doc! { "$unset": { "projects.$[p].assignedDoctor": "" } },
                )
                .array_filters(vec![doc! { "p.projectId": &payload.project_id }])
                .await
        }
    };

    match result {
        Ok(_) => {
            info!("Assignment cleared on project {}", payload.project_id);
            HttpResponse::Ok().json(json!({
                "success": true,
                "message": "Assignment removed successfully"
            }))
        }
        Err(e) => {
            error!("Error removing assignment: {}", e);
            internal_error("Error removing assignment")
        }
    }
}

async fn doctor_assignments_response(db: &Database, doctor_email: &str) -> HttpResponse {
    let organizations = db.collection::<OrganizationProfile>("organizations");
    let orgs: Vec<OrganizationProfile> = match organizations
        .find(doc! { "projects.links.assignedDoctor.doctorEmail": doctor_email })
        .await
    {
        Ok(cursor) => match cursor.try_collect().await {
            Ok(orgs) => orgs,
            Err(e) => {
                error!("Error reading assignments: {}", e);
                return internal_error("Error fetching assignments");
            }
        },
        Err(e) => {
            error!("Error fetching assignments: {}", e);
            return internal_error("Error fetching assignments");
        }
    };

    let assignments = collect_doctor_assignments(&orgs, doctor_email);
    HttpResponse::Ok().json(json!({ "success": true, "assignments": assignments }))
}

/// GET /api/doctor/assignments
pub async fn get_own_assignments(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let user = match auth::current_user(&req) {
        Some(user) => user,
        None => return auth::unauthorized(),
    };
    doctor_assignments_response(&data.mongodb.db, &user.email).await
}

/// GET /api/admin/assignments/doctor/{doctor_email}
pub async fn get_doctor_assignments(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    if let Err(resp) = auth::require_admin(&req) {
        return resp;
    }
    doctor_assignments_response(&data.mongodb.db, &path.into_inner()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(id: &str, title: &str, assignee: Option<&str>) -> Link {
        Link {
            link_id: id.to_string(),
            title: title.to_string(),
            url: format!("http://example.com/{}", id),
            assigned_doctor: assignee.map(|email| AssignedDoctor {
                doctor_email: email.to_string(),
                status: AssignmentStatus::Assigned,
                assigned_date: Utc::now(),
                completion_date: None,
                notes: None,
            }),
        }
    }

    fn project(id: &str, links: Vec<Link>) -> Project {
        Project {
            project_id: id.to_string(),
            name: "Study A".to_string(),
            description: "x".to_string(),
            project_key: "Abc123Xyz789".to_string(),
            links,
            assigned_doctor: None,
            created_at: Utc::now(),
        }
    }

    fn org(name: &str, projects: Vec<Project>) -> OrganizationProfile {
        OrganizationProfile {
            user_id: "org-1".to_string(),
            name: name.to_string(),
            contact_number: "123".to_string(),
            number_of_employees: 10,
            status: crate::models::ProfileStatus::Active,
            projects,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn plan_partitions_free_and_taken_links() {
        let project = project(
            "p1",
            vec![
                link("l1", "L1", None),
                link("l2", "L2", Some("busy@x.com")),
                link("l3", "L3", None),
            ],
        );
        let ids = vec!["l1".to_string(), "l2".to_string(), "l3".to_string()];
        let plan = plan_link_assignment(&project, &ids);
        assert_eq!(
            plan.assignable,
            vec![
                ("l1".to_string(), "L1".to_string()),
                ("l3".to_string(), "L3".to_string())
            ]
        );
        assert_eq!(plan.already_assigned, vec!["L2".to_string()]);
    }

    #[test]
    fn plan_skips_unknown_link_ids() {
        let project = project("p1", vec![link("l1", "L1", None)]);
        let ids = vec!["l1".to_string(), "nope".to_string()];
        let plan = plan_link_assignment(&project, &ids);
        assert_eq!(plan.assignable.len(), 1);
        assert!(plan.already_assigned.is_empty());
    }

    #[test]
    fn taken_link_is_reported_not_overwritten() {
        let project = project("p1", vec![link("l1", "L1", Some("first@x.com"))]);
        let plan = plan_link_assignment(&project, &["l1".to_string()]);
        assert!(plan.assignable.is_empty());
        assert_eq!(plan.already_assigned, vec!["L1".to_string()]);
        // The original assignment is untouched by planning.
        assert!(link_owned_by(&project.links[0], "first@x.com"));
    }

    #[test]
    fn cleared_link_is_assignable_again() {
        let mut l = link("l1", "L1", Some("d@x.com"));
        l.assigned_doctor = None;
        let project = project("p1", vec![l]);
        let plan = plan_link_assignment(&project, &["l1".to_string()]);
        assert_eq!(plan.assignable.len(), 1);
    }

    #[test]
    fn ownership_check_matches_exact_email() {
        let l = link("l1", "L1", Some("d@x.com"));
        assert!(link_owned_by(&l, "d@x.com"));
        assert!(!link_owned_by(&l, "other@x.com"));
        assert!(!link_owned_by(&link("l2", "L2", None), "d@x.com"));
    }

    #[test]
    fn batch_messages_report_both_subsets() {
        assert_eq!(batch_message(3, 0), "All links assigned successfully");
        assert_eq!(
            batch_message(2, 1),
            "2 links assigned successfully. 1 links were already assigned."
        );
    }

    #[test]
    fn assignments_group_by_project_with_metadata() {
        let orgs = vec![
            org(
                "Clinic A",
                vec![
                    project(
                        "p1",
                        vec![link("l1", "L1", Some("d@x.com")), link("l2", "L2", None)],
                    ),
                    project("p2", vec![link("l3", "L3", Some("other@x.com"))]),
                ],
            ),
            org("Clinic B", vec![project("p3", vec![link("l4", "L4", Some("d@x.com"))])]),
        ];
        let groups = collect_doctor_assignments(&orgs, "d@x.com");
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].project_id, "p1");
        assert_eq!(groups[0].organization_name, "Clinic A");
        assert_eq!(groups[0].links.len(), 1);
        assert_eq!(groups[0].links[0].link_id, "l1");
        assert_eq!(groups[1].organization_name, "Clinic B");
    }
}
