// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Landing page endpoints.

use axum::{extract::State, http::HeaderMap, Json};
use axum::http::header::COOKIE;

use crate::{
    models::{LandingResponse, OfferResponse},
    session::Session,
    state::AppState,
};

/// Offer headline, price and call to action.
#[utoipa::path(
    get,
    path = "/v1/offer",
    tag = "Landing",
    responses(
        (status = 200, description = "Current offer", body = OfferResponse)
    )
)]
pub async fn get_offer(State(state): State<AppState>) -> Json<OfferResponse> {
    Json(OfferResponse::from(state.offer.as_ref()))
}

/// Pick the landing view for this visitor.
///
/// The visitor's cookies are forwarded to the account API. Signed-in visitors
/// get the welcome view, everyone else the registration form.
#[utoipa::path(
    get,
    path = "/v1/landing",
    tag = "Landing",
    responses(
        (status = 200, description = "View to render", body = LandingResponse)
    )
)]
pub async fn get_landing(State(state): State<AppState>, headers: HeaderMap) -> Json<LandingResponse> {
    let cookie = headers.get(COOKIE).and_then(|v| v.to_str().ok());

    let mut session = state.session();
    let view = match session.load(cookie).await {
        Session::Authenticated(user) => LandingResponse::Welcome { user: user.clone() },
        Session::Anonymous => LandingResponse::Register {
            offer: OfferResponse::from(state.offer.as_ref()),
        },
    };
    Json(view)
}
