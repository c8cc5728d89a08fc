// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::HeaderName,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{
        CheckoutResponse, ConfirmationSource, LandingResponse, OfferResponse, PollState,
        PollStatus, RegistrationForm, UserProfile,
    },
    state::AppState,
};

pub mod checkout;
pub mod health;
pub mod landing;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/offer", get(landing::get_offer))
        .route("/landing", get(landing::get_landing))
        .route("/checkouts", post(checkout::create_checkout))
        .route(
            "/checkouts/{checkout_request_id}",
            get(checkout::get_checkout).delete(checkout::cancel_checkout),
        )
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .with_state(state);

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        landing::get_offer,
        landing::get_landing,
        checkout::create_checkout,
        checkout::get_checkout,
        checkout::cancel_checkout,
        health::health,
        health::liveness
    ),
    components(
        schemas(
            RegistrationForm,
            CheckoutResponse,
            PollState,
            PollStatus,
            ConfirmationSource,
            OfferResponse,
            LandingResponse,
            UserProfile,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Landing", description = "Offer and landing view"),
        (name = "Checkout", description = "M-Pesa STK Push checkout and confirmation"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;
