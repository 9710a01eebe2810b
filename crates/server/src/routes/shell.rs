// SPDX-License-Identifier: MIT

//! `GET /` (spec.md §6 "returns the SPA shell"). The browser-side renderer
//! is explicitly out of scope (spec.md §1 Non-goals); this route exists
//! only so the external interface contract is satisfiable, serving a
//! single embedded placeholder page (SPEC_FULL.md §4.G "Static shell").

use axum::http::header;
use axum::response::IntoResponse;

const SHELL_HTML: &str = include_str!("../../assets/shell.html");

pub async fn serve_shell() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], SHELL_HTML)
}
