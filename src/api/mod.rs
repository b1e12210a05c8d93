mod accounts;
mod apps;
mod health;
pub mod models;

use actix_web::HttpResponse;
use actix_web::web::{self, ServiceConfig};

use crate::error::LedgerError;

pub use models::AppState;

pub fn init_routes(cfg: &mut ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(health::health_check)
            .service(apps::create_app)
            .service(apps::get_state)
            .service(apps::get_logs)
            .service(apps::bootstrap)
            .service(apps::mine)
            .service(accounts::post_faucet)
            .service(accounts::opt_in)
            .service(accounts::get_account),
    );
}

/// Maps a failed ledger call to a response carrying the reason as body.
fn reject(err: LedgerError) -> HttpResponse {
    match err {
        LedgerError::UnknownApp(_) | LedgerError::UnknownAsset(_) => {
            HttpResponse::NotFound().body(err.to_string())
        }
        e if e.is_transient() => HttpResponse::ServiceUnavailable().body(e.to_string()),
        e => HttpResponse::BadRequest().body(e.to_string()),
    }
}
