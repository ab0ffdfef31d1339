//! Shared CRUD contract for role-tagged profiles. Each role keeps one profile
//! document per user; the unique `userId` index backs the conflict check.

use mongodb::bson::{doc, Document};
use mongodb::Database;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::is_duplicate_key_error;
use crate::models::{AICompanyProfile, DoctorProfile, OrganizationProfile};

pub trait ProfileKind: Serialize + DeserializeOwned + Send + Sync + Unpin {
    const COLLECTION: &'static str;
    /// Human-readable name used in response messages.
    const LABEL: &'static str;

    /// Update applied to the document before deletion, for clearing embedded
    /// collections.
    fn pre_delete_update() -> Option<Document> {
        None
    }
}

impl ProfileKind for DoctorProfile {
    const COLLECTION: &'static str = "doctors";
    const LABEL: &'static str = "Doctor profile";
}

impl ProfileKind for OrganizationProfile {
    const COLLECTION: &'static str = "organizations";
    const LABEL: &'static str = "Organization";

    fn pre_delete_update() -> Option<Document> {
        Some(doc! { "$set": { "projects": [] } })
    }
}

impl ProfileKind for AICompanyProfile {
    const COLLECTION: &'static str = "ai_companies";
    const LABEL: &'static str = "AI company";
}

#[derive(Debug)]
pub enum ProfileError {
    Conflict,
    Database(mongodb::error::Error),
}

impl From<mongodb::error::Error> for ProfileError {
    fn from(err: mongodb::error::Error) -> Self {
        ProfileError::Database(err)
    }
}

pub async fn create_profile<P: ProfileKind>(
    db: &Database,
    user_id: &str,
    profile: &P,
) -> Result<(), ProfileError> {
    let coll = db.collection::<P>(P::COLLECTION);
    if coll.find_one(doc! { "userId": user_id }).await?.is_some() {
        return Err(ProfileError::Conflict);
    }
    match coll.insert_one(profile).await {
        Ok(_) => Ok(()),
        // A racing creator loses to the unique userId index.
        Err(e) if is_duplicate_key_error(&e) => Err(ProfileError::Conflict),
        Err(e) => Err(ProfileError::Database(e)),
    }
}

pub async fn get_profile<P: ProfileKind>(
    db: &Database,
    user_id: &str,
) -> mongodb::error::Result<Option<P>> {
    db.collection::<P>(P::COLLECTION)
        .find_one(doc! { "userId": user_id })
        .await
}

/// Deletes the profile, returning whether a document was removed. The
/// pre-delete update runs first so embedded collections are cleared before
/// the document goes away.
pub async fn delete_profile<P: ProfileKind>(
    db: &Database,
    user_id: &str,
) -> mongodb::error::Result<bool> {
    let coll = db.collection::<P>(P::COLLECTION);
    if let Some(update) = P::pre_delete_update() {
        coll.update_one(doc! { "userId": user_id }, update).await?;
    }
    let res = coll.delete_one(doc! { "userId": user_id }).await?;
    Ok(res.deleted_count == 1)
}
