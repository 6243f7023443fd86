pub mod health;
pub mod order;

use actix_web::web;

/// Mount every route. Unmatched paths fall through to the app's default
/// service, which main and the tests set to [`health::hello`].
pub fn configure(cfg: &mut web::ServiceConfig) {
    health::configure(cfg);
    order::configure(cfg);
}
