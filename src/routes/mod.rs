/// Router Module Index
///
/// Splits routing by who may call what. Public catalog and download routes need
/// no session. Admin pages live under the guarded prefix and are filtered by the
/// route guard before they reach a handler. The admin JSON API sits outside the
/// prefix and checks the caller itself via the `AdminUser` extractor.

/// Routes accessible to everyone (catalog browsing and downloads).
pub mod public;

/// Admin pages under `/admin`, behind `guard::admin_route_guard`.
pub mod admin;

/// Admin JSON API under `/api/admin`, each handler starting with `AdminUser`.
pub mod api_admin;
