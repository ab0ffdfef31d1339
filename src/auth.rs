// src/auth.rs

use actix_web::{http::header, web, HttpMessage, HttpRequest, HttpResponse, Responder};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, error, info};
use mongodb::bson::doc;
use mongodb::Database;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::{Role, User};

const TOKEN_VALIDITY_DAYS: i64 = 30;
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: Option<Role>,
    pub display_name: Option<String>,
    pub exp: usize,
}

/// Authenticated caller, decoded from the bearer token by the middleware and
/// carried as a request extension.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub role: Option<Role>,
    pub display_name: Option<String>,
}

pub fn create_jwt(user: &User, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let expiration = Utc::now() + Duration::days(TOKEN_VALIDITY_DAYS);
    let claims = Claims {
        sub: user.user_id.clone(),
        email: user.email.clone(),
        role: user.role,
        display_name: user.display_name.clone(),
        exp: expiration.timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref()))
}

pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

pub fn auth_user_from_token(token: &str, secret: &str) -> Result<AuthUser, jsonwebtoken::errors::Error> {
    let claims = validate_jwt(token, secret)?;
    Ok(AuthUser {
        id: claims.sub,
        email: claims.email,
        role: claims.role,
        display_name: claims.display_name,
    })
}

pub fn current_user(req: &HttpRequest) -> Option<AuthUser> {
    req.extensions().get::<AuthUser>().cloned()
}

pub fn unauthorized() -> HttpResponse {
    HttpResponse::Unauthorized().json(json!({ "success": false, "message": "No token provided" }))
}

/// Admin predicate required by every /api/admin handler.
pub fn require_admin(req: &HttpRequest) -> Result<AuthUser, HttpResponse> {
    let user = current_user(req).ok_or_else(unauthorized)?;
    if user.role != Some(Role::Admin) {
        return Err(HttpResponse::Forbidden()
            .json(json!({ "success": false, "message": "Admin access required" })));
    }
    Ok(user)
}

/// Role assigned on first external login: auto-admin for the trusted domain,
/// otherwise registration is still pending.
pub fn initial_role(email: &str, admin_domain: Option<&str>) -> Option<Role> {
    match admin_domain {
        Some(domain) if email.ends_with(&format!("@{}", domain)) => Some(Role::Admin),
        _ => None,
    }
}

/// Frontend path a user lands on after login, by role.
pub fn post_login_redirect(role: Option<Role>) -> &'static str {
    match role {
        None => "/register",
        Some(Role::Doctor) => "/doctor",
        Some(Role::Organization) => "/organization",
        _ => "/",
    }
}

/* -------------------------------------------------------------------------- */
/* Google OAuth                                                               */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct GoogleProfile {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
}

fn url_encode(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace(':', "%3A")
        .replace('/', "%2F")
        .replace('?', "%3F")
        .replace('&', "%26")
        .replace('=', "%3D")
}

/// GET /auth/google
pub async fn google_login(data: web::Data<AppState>) -> impl Responder {
    let url = format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope=openid%20email%20profile&prompt=select_account",
        GOOGLE_AUTH_URL,
        url_encode(&data.config.google_client_id),
        url_encode(&data.config.google_callback_url),
    );
    HttpResponse::Found()
        .insert_header((header::LOCATION, url))
        .finish()
}

fn login_failure_redirect(frontend: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, format!("{}/login?error=auth_failed", frontend)))
        .finish()
}

/// GET /auth/google/callback
pub async fn google_callback(
    data: web::Data<AppState>,
    query: web::Query<CallbackQuery>,
) -> impl Responder {
    let frontend = data.config.frontend_origin.clone();
    let code = match &query.code {
        Some(code) => code.clone(),
        None => {
            error!("Google callback hit without a code");
            return login_failure_redirect(&frontend);
        }
    };

    let params = [
        ("client_id", data.config.google_client_id.as_str()),
        ("client_secret", data.config.google_client_secret.as_str()),
        ("code", code.as_str()),
        ("grant_type", "authorization_code"),
        ("redirect_uri", data.config.google_callback_url.as_str()),
    ];
    let mut token_resp = match data.http_client.post(GOOGLE_TOKEN_URL).send_form(&params).await {
        Ok(resp) if resp.status().is_success() => resp,
        Ok(resp) => {
            error!("Google token exchange failed: {}", resp.status());
            return login_failure_redirect(&frontend);
        }
        Err(e) => {
            error!("Google token endpoint unreachable: {}", e);
            return login_failure_redirect(&frontend);
        }
    };
    let token = match token_resp.json::<GoogleTokenResponse>().await {
        Ok(token) => token,
        Err(e) => {
            error!("Google token response parse error: {}", e);
            return login_failure_redirect(&frontend);
        }
    };

    let mut profile_resp = match data
        .http_client
        .get(GOOGLE_USERINFO_URL)
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token.access_token)))
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => resp,
        Ok(resp) => {
            error!("Google userinfo failed: {}", resp.status());
            return login_failure_redirect(&frontend);
        }
        Err(e) => {
            error!("Google userinfo unreachable: {}", e);
            return login_failure_redirect(&frontend);
        }
    };
    let profile = match profile_resp.json::<GoogleProfile>().await {
        Ok(profile) => profile,
        Err(e) => {
            error!("Google profile parse error: {}", e);
            return login_failure_redirect(&frontend);
        }
    };
    debug!("Google profile for {}", profile.email);

    let user = match find_or_create_user(
        &data.mongodb.db,
        profile,
        data.config.admin_email_domain.as_deref(),
    )
    .await
    {
        Ok(user) => user,
        Err(e) => {
            error!("Error loading user after Google login: {}", e);
            return login_failure_redirect(&frontend);
        }
    };

    match create_jwt(&user, &data.config.jwt_secret) {
        Ok(token) => HttpResponse::Found()
            .insert_header((
                header::LOCATION,
                format!("{}/google-callback?token={}", frontend, token),
            ))
            .finish(),
        Err(e) => {
            error!("Error signing session token: {}", e);
            login_failure_redirect(&frontend)
        }
    }
}

/// Looks the user up by external id, creating the account on first sight.
/// The stored role is never overwritten by this path.
pub async fn find_or_create_user(
    db: &Database,
    profile: GoogleProfile,
    admin_domain: Option<&str>,
) -> mongodb::error::Result<User> {
    let users = db.collection::<User>("users");

    if let Some(existing) = users.find_one(doc! { "externalId": &profile.id }).await? {
        users
            .update_one(
                doc! { "userId": &existing.user_id },
                doc! { "$set": { "lastLogin": Utc::now().to_rfc3339() } },
            )
            .await?;
        return Ok(existing);
    }

    let now = Utc::now();
    let role = initial_role(&profile.email, admin_domain);
    let user = User {
        user_id: Uuid::new_v4().to_string(),
        external_id: profile.id,
        email: profile.email,
        display_name: profile.name,
        first_name: profile.given_name,
        last_name: profile.family_name,
        profile_photo: profile.picture,
        role,
        created_at: now,
        last_login: now,
    };
    users.insert_one(&user).await?;
    info!("Created user {} ({:?})", user.user_id, user.role);
    Ok(user)
}

/* -------------------------------------------------------------------------- */
/* Session handlers                                                           */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Deserialize)]
pub struct CompleteRegistrationRequest {
    pub role: String,
    pub name: String,
}

async fn load_user(db: &Database, user_id: &str) -> mongodb::error::Result<Option<User>> {
    db.collection::<User>("users")
        .find_one(doc! { "userId": user_id })
        .await
}

/// GET /api/profile
pub async fn get_profile(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let auth = match current_user(&req) {
        Some(user) => user,
        None => return unauthorized(),
    };

    match load_user(&data.mongodb.db, &auth.id).await {
        Ok(Some(user)) => match create_jwt(&user, &data.config.jwt_secret) {
            Ok(token) => HttpResponse::Ok().json(json!({
                "user": user,
                "token": token,
                "success": true
            })),
            Err(e) => {
                error!("Error signing token: {}", e);
                HttpResponse::InternalServerError()
                    .json(json!({ "success": false, "message": "Server error" }))
            }
        },
        Ok(None) => HttpResponse::NotFound()
            .json(json!({ "success": false, "message": "User not found" })),
        Err(e) => {
            error!("Profile fetch error: {}", e);
            HttpResponse::InternalServerError()
                .json(json!({ "success": false, "message": "Server error" }))
        }
    }
}

/// GET /api/current-user
pub async fn get_current_user(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let auth = match current_user(&req) {
        Some(user) => user,
        None => return unauthorized(),
    };

    match load_user(&data.mongodb.db, &auth.id).await {
        Ok(Some(user)) => match create_jwt(&user, &data.config.jwt_secret) {
            Ok(token) => {
                let redirect = post_login_redirect(user.role);
                HttpResponse::Ok().json(json!({
                    "user": user,
                    "token": token,
                    "success": true,
                    "redirect": redirect
                }))
            }
            Err(e) => {
                error!("Error signing token: {}", e);
                HttpResponse::InternalServerError()
                    .json(json!({ "success": false, "message": "Server error" }))
            }
        },
        Ok(None) => HttpResponse::NotFound()
            .json(json!({ "success": false, "message": "User not found" })),
        Err(e) => {
            error!("Current user fetch error: {}", e);
            HttpResponse::InternalServerError()
                .json(json!({ "success": false, "message": "Server error" }))
        }
    }
}

/// POST /api/complete-registration
pub async fn complete_registration(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CompleteRegistrationRequest>,
) -> impl Responder {
    let auth = match current_user(&req) {
        Some(user) => user,
        None => return unauthorized(),
    };

    let role = match payload.role.as_str() {
        "doctor" => Role::Doctor,
        "organization" => Role::Organization,
        _ => {
            return HttpResponse::BadRequest()
                .json(json!({ "success": false, "message": "Invalid role" }))
        }
    };

    let users = data.mongodb.db.collection::<User>("users");
    let existing = match users.find_one(doc! { "userId": &auth.id }).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(json!({ "success": false, "message": "User not found" }))
        }
        Err(e) => {
            error!("Registration lookup error: {}", e);
            return HttpResponse::InternalServerError()
                .json(json!({ "success": false, "message": "Error completing registration" }));
        }
    };
    if existing.role.is_some() {
        return HttpResponse::BadRequest()
            .json(json!({ "success": false, "message": "User already registered" }));
    }

    let update = doc! { "$set": {
        "role": payload.role.as_str(),
        "displayName": payload.name.as_str(),
    }};
    if let Err(e) = users.update_one(doc! { "userId": &auth.id }, update).await {
        error!("Registration update error: {}", e);
        return HttpResponse::InternalServerError()
            .json(json!({ "success": false, "message": "Error completing registration" }));
    }

    let updated = match users.find_one(doc! { "userId": &auth.id }).await {
        Ok(Some(user)) => user,
        _ => {
            return HttpResponse::InternalServerError()
                .json(json!({ "success": false, "message": "Error completing registration" }))
        }
    };
    info!("User {} registered as {:?}", updated.user_id, role);

    match create_jwt(&updated, &data.config.jwt_secret) {
        Ok(token) => HttpResponse::Ok().json(json!({
            "user": updated,
            "token": token,
            "success": true,
            "redirect": post_login_redirect(Some(role))
        })),
        Err(e) => {
            error!("Error signing token: {}", e);
            HttpResponse::InternalServerError()
                .json(json!({ "success": false, "message": "Error completing registration" }))
        }
    }
}

/// DELETE /api/delete-account
pub async fn delete_account(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let auth = match current_user(&req) {
        Some(user) => user,
        None => return unauthorized(),
    };

    let users = data.mongodb.db.collection::<User>("users");
    match users.delete_one(doc! { "userId": &auth.id }).await {
        Ok(res) if res.deleted_count == 1 => {
            info!("Deleted account {}", auth.id);
            HttpResponse::Ok()
                .json(json!({ "success": true, "message": "Account deleted successfully" }))
        }
        Ok(_) => HttpResponse::NotFound()
            .json(json!({ "success": false, "message": "User not found" })),
        Err(e) => {
            error!("Error deleting account: {}", e);
            HttpResponse::InternalServerError()
                .json(json!({ "success": false, "message": "Error deleting account" }))
        }
    }
}

/// GET /api/logout. Tokens are stateless, so this is an acknowledgement only.
pub async fn logout() -> impl Responder {
    HttpResponse::Ok().json(json!({ "success": true, "message": "Logged out successfully" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(role: Option<Role>) -> User {
        let now = Utc::now();
        User {
            user_id: "u-1".to_string(),
            external_id: "g-1".to_string(),
            email: "doc@example.com".to_string(),
            display_name: Some("Dr Example".to_string()),
            first_name: None,
            last_name: None,
            profile_photo: None,
            role,
            created_at: now,
            last_login: now,
        }
    }

    #[test]
    fn jwt_round_trip_preserves_identity() {
        let user = sample_user(Some(Role::Doctor));
        let token = create_jwt(&user, "test-secret").unwrap();
        let claims = validate_jwt(&token, "test-secret").unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.email, "doc@example.com");
        assert_eq!(claims.role, Some(Role::Doctor));
        assert_eq!(claims.display_name.as_deref(), Some("Dr Example"));
    }

    #[test]
    fn jwt_rejects_wrong_secret() {
        let user = sample_user(None);
        let token = create_jwt(&user, "test-secret").unwrap();
        assert!(validate_jwt(&token, "other-secret").is_err());
    }

    #[test]
    fn expired_jwt_is_rejected() {
        let user = sample_user(None);
        let claims = Claims {
            sub: user.user_id.clone(),
            email: user.email.clone(),
            role: None,
            display_name: None,
            exp: (Utc::now() - Duration::hours(2)).timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret("test-secret".as_ref()),
        )
        .unwrap();
        assert!(validate_jwt(&token, "test-secret").is_err());
    }

    #[test]
    fn trusted_domain_gets_admin_role() {
        assert_eq!(
            initial_role("ops@example.org", Some("example.org")),
            Some(Role::Admin)
        );
        assert_eq!(initial_role("doc@clinic.com", Some("example.org")), None);
        assert_eq!(initial_role("doc@clinic.com", None), None);
    }

    #[test]
    fn redirect_paths_follow_role() {
        assert_eq!(post_login_redirect(None), "/register");
        assert_eq!(post_login_redirect(Some(Role::Doctor)), "/doctor");
        assert_eq!(post_login_redirect(Some(Role::Organization)), "/organization");
        assert_eq!(post_login_redirect(Some(Role::Admin)), "/");
    }
}
