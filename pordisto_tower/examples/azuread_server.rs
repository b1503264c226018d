use aliri_clock::{Clock, System};
use axum::{routing::get, Extension, Json, Router};
use http::HeaderValue;
use pordisto::{jws, jwt};
use pordisto_oauth2::{scope::ObjectId, Authority, IdentityClaims, KeySource, ScopePolicy};
use pordisto_tower::Oauth2Authorizer;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    tracing_subscriber::fmt::init();

    let authority = construct_authority()?;
    let authorizer = Oauth2Authorizer::new()
        .with_claims::<IdentityClaims>()
        .with_terse_error_handler::<axum::body::Body>();
    //.with_verbose_error_handler::<axum::body::Body>();

    let unauthed_routes = Router::new().route("/health", get(handle_health));

    let authed_routes = Router::new()
        .route("/protected", get(handle_protected))
        .layer(authorizer.scope_layer(ScopePolicy::allow_one_from_static(REQUIRED_SCOPE)))
        .layer(authorizer.jwt_layer(authority));

    let cors = CorsLayer::new()
        .allow_origin("http://localhost:4200".parse::<HeaderValue>()?)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request());

    let app = authed_routes.merge(unauthed_routes).layer(cors);

    println!("Call GET /protected with a bearer token issued by the tenant");
    println!("Press Ctrl+C to exit");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// Replace with the tenant and app registration that protect the API
const TENANT_ID: &str = "00000000-0000-0000-0000-000000000000";
const CLIENT_ID: &str = "11111111-1111-1111-1111-111111111111";
const REQUIRED_SCOPE: &str = "access_as_user";

fn construct_authority() -> color_eyre::Result<Authority> {
    let validator = jwt::CoreValidator::default()
        .add_approved_algorithm(jws::Algorithm::RS256)
        .add_allowed_audience(jwt::Audience::from(format!("api://{CLIENT_ID}")))
        .require_issuer(jwt::Issuer::from(format!(
            "https://sts.windows.net/{TENANT_ID}/"
        )))
        .with_leeway_secs(60);

    // No keys are fetched until the first token arrives needing them
    let authority = Authority::remote(
        KeySource::jwks(format!(
            "https://login.microsoftonline.com/{TENANT_ID}/discovery/v2.0/keys"
        )),
        validator,
    )?;

    Ok(authority)
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        time: System.now().0,
    })
}

async fn handle_protected(Extension(claims): Extension<IdentityClaims>) -> Json<ProtectedResponse> {
    Json(ProtectedResponse {
        message: format!("Hello {}!", claims.name.as_deref().unwrap_or("unknown")),
        oid: claims.oid,
        issued_at: claims.iat.0,
    })
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    time: u64,
}

#[derive(serde::Serialize)]
struct ProtectedResponse {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    oid: Option<ObjectId>,
    issued_at: u64,
}
