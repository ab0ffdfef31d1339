// src/main.rs

mod admin;
mod aicompany;
mod annotation;
mod app_state;
mod assignment;
mod auth;
mod config;
mod csv;
mod db;
mod doctor;
mod keys;
mod models;
mod organization;
mod profiles;

use std::env;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix_cors::Cors;
use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http,
    middleware::Logger,
    web, App, Error, HttpMessage, HttpResponse, HttpServer,
};
use env_logger::Env;
use futures::future::{ok, Ready};
use serde_json::json;

use crate::app_state::AppState;

#[derive(Debug)]
pub struct Authentication;

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware { service })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    // Decodes "Bearer <token>" into an AuthUser extension. A request without
    // a token passes through; protected handlers answer 401 themselves.
    fn call(&self, req: ServiceRequest) -> Self::Future {
        if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
            if let Ok(auth_str) = auth_header.to_str() {
                if auth_str.starts_with("Bearer ") {
                    let token = auth_str.trim_start_matches("Bearer ").trim();
                    let secret =
                        env::var("JWT_SECRET").unwrap_or_else(|_| "secret".to_string());
                    match auth::auth_user_from_token(token, &secret) {
                        Ok(user) => {
                            req.extensions_mut().insert(user);
                        }
                        Err(e) => {
                            let (req_parts, _payload) = req.into_parts();
                            let resp = HttpResponse::Unauthorized()
                                .json(json!({
                                    "success": false,
                                    "message": format!("Invalid token: {}", e)
                                }))
                                .map_into_boxed_body();
                            let srv_resp = ServiceResponse::new(req_parts, resp);
                            return Box::pin(async move { Ok(srv_resp) });
                        }
                    }
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "message": "Server is running" }))
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(health))
        .service(
            web::scope("/auth")
                .route("/google", web::get().to(auth::google_login))
                .route("/google/callback", web::get().to(auth::google_callback)),
        )
        .service(
            web::scope("/api")
                // SESSION
                .route("/profile", web::get().to(auth::get_profile))
                .route("/current-user", web::get().to(auth::get_current_user))
                .route(
                    "/complete-registration",
                    web::post().to(auth::complete_registration),
                )
                .route("/delete-account", web::delete().to(auth::delete_account))
                .route("/logout", web::get().to(auth::logout))
                // DOCTORS
                .service(
                    web::scope("/doctor")
                        .route("/profile", web::post().to(doctor::create_profile))
                        .route("/profile", web::get().to(doctor::get_profile))
                        .route("/profile", web::put().to(doctor::edit_profile))
                        .route("/profile", web::delete().to(doctor::delete_profile))
                        .route("/list", web::get().to(doctor::get_doctor_list))
                        .route("/profile/{id}", web::get().to(doctor::get_doctor_by_id))
                        .route(
                            "/assignments",
                            web::get().to(assignment::get_own_assignments),
                        )
                        .route(
                            "/assignments/complete",
                            web::post().to(assignment::complete_own_assignment),
                        )
                        .route(
                            "/assignments/save-draft",
                            web::post().to(assignment::save_draft),
                        ),
                )
                // ORGANIZATIONS
                .service(
                    web::scope("/organization")
                        .route("/profile", web::post().to(organization::create_profile))
                        .route("/profile", web::get().to(organization::get_profile))
                        .route("/profile", web::put().to(organization::edit_profile))
                        .route("/profile", web::delete().to(organization::delete_profile))
                        .route("/project", web::post().to(organization::add_project))
                        .route("/projects", web::get().to(organization::get_projects))
                        .route(
                            "/project/{project_id}",
                            web::get().to(organization::get_project_by_id),
                        )
                        .route(
                            "/project/{project_id}",
                            web::put().to(organization::edit_or_delete_project),
                        ),
                )
                // ADMIN
                .service(
                    web::scope("/admin")
                        .route("/doctors", web::get().to(admin::get_all_doctors))
                        .route("/doctors/{id}", web::get().to(admin::get_doctor_by_id))
                        .route(
                            "/doctors/{id}/status",
                            web::put().to(admin::update_doctor_status),
                        )
                        .route(
                            "/organizations",
                            web::get().to(admin::get_all_organizations),
                        )
                        .route(
                            "/organizations/{id}",
                            web::get().to(admin::get_organization_by_id),
                        )
                        .route(
                            "/organizations/{id}/projects",
                            web::get().to(admin::get_organization_projects),
                        )
                        .route(
                            "/organizations/{id}/status",
                            web::put().to(admin::update_organization_status),
                        )
                        .route(
                            "/assignments/links",
                            web::post().to(assignment::assign_links),
                        )
                        .route(
                            "/assignments/project",
                            web::post().to(assignment::assign_project),
                        )
                        .route(
                            "/assignments/status",
                            web::put().to(assignment::update_assignment_status),
                        )
                        .route("/assignments", web::delete().to(assignment::deassign))
                        .route(
                            "/assignments/doctor/{doctor_email}",
                            web::get().to(assignment::get_doctor_assignments),
                        ),
                )
                // AI COMPANIES
                .service(
                    web::scope("/aicompany")
                        .route("/profile", web::post().to(aicompany::create_profile))
                        .route("/profile", web::get().to(aicompany::get_profile))
                        .route("/profile", web::put().to(aicompany::edit_profile))
                        .route("/profile", web::delete().to(aicompany::delete_profile))
                        .route("/api-key", web::get().to(aicompany::get_api_key))
                        .route(
                            "/api-key/regenerate",
                            web::post().to(aicompany::regenerate_api_key),
                        )
                        .route(
                            "/integration",
                            web::post().to(aicompany::configure_integration),
                        )
                        .route(
                            "/image-address",
                            web::post().to(aicompany::add_image_address),
                        )
                        .route(
                            "/image-addresses",
                            web::get().to(aicompany::get_image_addresses),
                        )
                        .route(
                            "/image-address/{access_key}",
                            web::delete().to(aicompany::delete_image_address),
                        ),
                )
                // ANNOTATIONS (public)
                .service(
                    web::scope("/annotations")
                        .route("/image", web::get().to(annotation::get_annotations))
                        .route("/image", web::post().to(annotation::save_annotations))
                        .route(
                            "/image/{access_key}",
                            web::delete().to(annotation::delete_annotations),
                        ),
                )
                // CSV DATASETS (public)
                .service(
                    web::scope("/csv")
                        .route("/upload", web::post().to(csv::upload_csv))
                        .route("/fetch/{key}", web::get().to(csv::fetch_csv))
                        .route("/download/{key}", web::get().to(csv::download_csv))
                        .route("/list", web::get().to(csv::list_csv))
                        .route("/delete/{key}", web::delete().to(csv::delete_csv)),
                ),
        );
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = config::Config::from_env();
    let mongodb = Arc::new(db::MongoDB::init(&config.mongo_uri, &config.database_name).await);
    db::ensure_indexes(&mongodb.db)
        .await
        .expect("Failed to create database indexes");

    let bind_addr = format!("0.0.0.0:{}", config.port);
    println!("Server running at http://{}", bind_addr);
    println!("Allowed CORS Origin: {}", config.frontend_origin);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&config.frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .wrap(Authentication)
            // awc::Client is per-worker, so the state is built inside the
            // factory closure.
            .app_data(web::Data::new(AppState {
                mongodb: mongodb.clone(),
                config: config.clone(),
                http_client: awc::Client::default(),
            }))
            // CSV uploads carry whole files in the JSON body.
            .app_data(web::JsonConfig::default().limit(10 * 1024 * 1024))
            .configure(routes)
    })
    .bind(bind_addr)?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::{Method, StatusCode};
    use actix_web::test;

    fn test_config() -> config::Config {
        config::Config {
            mongo_uri: "mongodb://localhost:27017".to_string(),
            database_name: "healthbridge_test".to_string(),
            jwt_secret: "test-secret".to_string(),
            google_client_id: "client".to_string(),
            google_client_secret: "secret".to_string(),
            google_callback_url: "http://localhost:5001/auth/google/callback".to_string(),
            frontend_origin: "http://localhost:3000".to_string(),
            admin_email_domain: None,
            port: 5001,
        }
    }

    #[actix_web::test]
    async fn catalog_routes_use_singular_resource_paths() {
        // The driver connects lazily, so building the app touches no server.
        let mongodb = Arc::new(
            db::MongoDB::init("mongodb://localhost:27017", "healthbridge_test").await,
        );
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(AppState {
                    mongodb,
                    config: test_config(),
                    http_client: awc::Client::default(),
                }))
                .configure(routes),
        )
        .await;
        for (method, path) in [
            (Method::POST, "/api/organization/project"),
            (Method::GET, "/api/organization/projects"),
            (Method::GET, "/api/organization/project/p-1"),
            (Method::PUT, "/api/organization/project/p-1"),
            (Method::POST, "/api/aicompany/integration"),
            (Method::POST, "/api/aicompany/image-address"),
            (Method::GET, "/api/aicompany/image-addresses"),
            (Method::DELETE, "/api/aicompany/image-address/Abc123Xyz789"),
        ] {
            let req = test::TestRequest::with_uri(path)
                .method(method.clone())
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_ne!(
                resp.status(),
                StatusCode::NOT_FOUND,
                "{} {} is not routed",
                method,
                path
            );
        }
    }
}
