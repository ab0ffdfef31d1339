// src/models.rs

use chrono::{DateTime, Utc};
use mongodb::bson::{Bson, Document};
use serde::{Deserialize, Serialize};

/// Role a user settles into after registration. `None` on the user document
/// means registration is still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Doctor,
    Organization,
    AiCompany,
}

/// Lifecycle status of a profile document (doctor, organization, AI company).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileStatus {
    Pending,
    Active,
    Suspended,
}

/// Status of a doctor-to-link (or legacy doctor-to-project) binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Pending,
    Assigned,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationType {
    DataAccess,
    Api,
    ModelServing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationStatus {
    Pending,
    Configured,
    Active,
}

/// Account record created on first successful external login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
    /// Subject id reported by the identity provider.
    pub external_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_photo: Option<String>,
    pub role: Option<Role>,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationProfile {
    pub user_id: String,
    pub name: String,
    pub contact_number: String,
    pub number_of_employees: i32,
    pub status: ProfileStatus,
    pub projects: Vec<Project>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub project_id: String,
    pub name: String,
    pub description: String,
    /// 12-char alphanumeric key, unique across every organization's projects.
    pub project_key: String,
    #[serde(default)]
    pub links: Vec<Link>,
    /// Legacy whole-project assignment. Absent from the document when unset so
    /// that `$exists` guards work.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_doctor: Option<AssignedDoctor>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub link_id: String,
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_doctor: Option<AssignedDoctor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedDoctor {
    pub doctor_email: String,
    pub status: AssignmentStatus,
    pub assigned_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorProfile {
    pub user_id: String,
    pub info: DoctorInfo,
    pub status: ProfileStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorInfo {
    pub full_name: String,
    pub date_of_birth: String,
    pub gender: String,
    pub contact_number: String,
    pub address: String,
    pub specialization: String,
    /// Unique across doctors when present (sparse index).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_number: Option<String>,
    pub experience: i32,
    #[serde(default)]
    pub qualifications: Vec<Qualification>,
    #[serde(default)]
    pub expertise: Vec<Expertise>,
    #[serde(default)]
    pub languages: Vec<String>,
    pub consultation_fee: f64,
    #[serde(default)]
    pub available_days: Vec<String>,
    #[serde(default)]
    pub time_slots: Vec<TimeSlot>,
    pub professional_bio: String,
    #[serde(default)]
    pub portfolio_items: Vec<PortfolioItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Qualification {
    pub degree: String,
    pub institution: String,
    pub year: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expertise {
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioItem {
    pub title: String,
    pub description: String,
    pub link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AICompanyProfile {
    pub user_id: String,
    pub name: String,
    pub website: String,
    /// `med_ai_` plus 24 alphanumerics, unique across companies.
    pub api_key: String,
    pub status: ProfileStatus,
    #[serde(default)]
    pub image_addresses: Vec<ImageAddress>,
    #[serde(default)]
    pub integrations: Vec<Integration>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAddress {
    pub image_url: String,
    pub title: String,
    /// 12-char alphanumeric key handed out to annotators.
    pub access_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    #[serde(rename = "type")]
    pub integration_type: IntegrationType,
    pub status: IntegrationStatus,
    pub config: Document,
    pub created_at: DateTime<Utc>,
}

/// Annotation payloads stored against an image access key; the annotation
/// entries themselves are free-form JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationSet {
    pub access_key: String,
    pub image_name: String,
    pub image_url: String,
    #[serde(default)]
    pub annotations: Vec<Bson>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvDataset {
    pub key: String,
    pub filename: String,
    pub csv_data: String,
    #[serde(default)]
    pub headers: Vec<String>,
    pub upload_date: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_tags_are_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(serde_json::to_string(&Role::AiCompany).unwrap(), "\"aicompany\"");
        let parsed: Role = serde_json::from_str("\"organization\"").unwrap();
        assert_eq!(parsed, Role::Organization);
    }

    #[test]
    fn assignment_status_round_trips() {
        for (status, tag) in [
            (AssignmentStatus::Pending, "\"pending\""),
            (AssignmentStatus::Assigned, "\"assigned\""),
            (AssignmentStatus::Completed, "\"completed\""),
        ] {
            assert_eq!(serde_json::to_string(&status).unwrap(), tag);
            let parsed: AssignmentStatus = serde_json::from_str(tag).unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn integration_type_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&IntegrationType::DataAccess).unwrap(),
            "\"data_access\""
        );
        assert_eq!(
            serde_json::to_string(&IntegrationType::ModelServing).unwrap(),
            "\"model_serving\""
        );
    }

    #[test]
    fn unassigned_link_omits_assigned_doctor() {
        let link = Link {
            link_id: "l1".to_string(),
            title: "Scan batch".to_string(),
            url: "http://example.com".to_string(),
            assigned_doctor: None,
        };
        let value = serde_json::to_value(&link).unwrap();
        assert!(value.get("assignedDoctor").is_none());
    }
}
