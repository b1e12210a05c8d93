use actix_web::{HttpResponse, Responder, get, post, web};
use log::{debug, warn};

use super::models::{AppState, FaucetRequest, OptInCall, SignedCall};
use super::reject;
use crate::ledger::OPT_IN_METHOD;

/// DEV faucet: credits native units directly to an account.
#[post("/faucet/")]
pub async fn post_faucet(
    state: web::Data<AppState>,
    body: web::Json<FaucetRequest>,
) -> impl Responder {
    if body.amount == 0 {
        return HttpResponse::BadRequest().body("amount must be > 0");
    }
    let view = state.ledger.fund(&body.address, body.amount);
    HttpResponse::Ok().json(view)
}

#[post("/accounts/{address}/opt-in/")]
pub async fn opt_in(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<SignedCall<OptInCall>>,
) -> impl Responder {
    let address = path.into_inner();
    let sender = match body.verify(OPT_IN_METHOD) {
        Ok(sender) => sender,
        Err(e) => return reject(e),
    };
    if sender != address.to_lowercase() {
        warn!("POST /accounts/{address}/opt-in/ - rejected: signed by {sender}");
        return HttpResponse::BadRequest().body("only the account itself may opt in");
    }

    match state.ledger.opt_in(&sender, body.call.asset_id) {
        Ok(view) => {
            debug!("POST /accounts/{address}/opt-in/ - asset {}", body.call.asset_id);
            HttpResponse::Ok().json(view)
        }
        Err(e) => reject(e),
    }
}

#[get("/accounts/{address}/")]
pub async fn get_account(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    HttpResponse::Ok().json(state.ledger.account(&path.into_inner()))
}
