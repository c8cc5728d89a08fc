// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! M-Pesa Checkout - Landing Page Backend
//!
//! This crate serves a single-offer landing page: it collects a visitor's
//! contact details, sends an M-Pesa STK Push through the payments backend and
//! polls until the payment is confirmed, fails or times out.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `gateway` - Payments and account backend client
//! - `poller` - Background payment confirmation
//! - `checkout` - Registry of in-flight and recent checkouts
//! - `session` - Visitor session lookup
//! - `phone` - MSISDN normalization

pub mod api;
pub mod checkout;
pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod phone;
pub mod poller;
pub mod session;
pub mod state;
pub mod submission;
