use actix_web::{HttpResponse, Responder, get, post, web};
use log::{debug, info, warn};

use super::models::{
    AppState, BootstrapCall, BootstrapResponse, CreateAppRequest, LogsResponse, MineCall,
    MineResponse, SignedCall,
};
use super::reject;
use crate::ledger::{BOOTSTRAP_METHOD, MINE_METHOD};

#[post("/apps/")]
pub async fn create_app(
    state: web::Data<AppState>,
    body: web::Json<CreateAppRequest>,
) -> impl Responder {
    if body.creator.is_empty() {
        return HttpResponse::BadRequest().body("creator must not be empty");
    }
    let info = state.ledger.create_app(&body.creator);
    HttpResponse::Ok().json(info)
}

#[get("/apps/{app_id}/state/")]
pub async fn get_state(state: web::Data<AppState>, path: web::Path<u64>) -> impl Responder {
    match state.ledger.state(path.into_inner()) {
        Ok(chain) => HttpResponse::Ok().json(chain),
        Err(e) => reject(e),
    }
}

#[get("/apps/{app_id}/logs/")]
pub async fn get_logs(state: web::Data<AppState>, path: web::Path<u64>) -> impl Responder {
    let app_id = path.into_inner();
    match state.ledger.logs(app_id) {
        Ok(logs) => HttpResponse::Ok().json(LogsResponse {
            app_id,
            logs: logs.iter().map(hex::encode).collect(),
        }),
        Err(e) => reject(e),
    }
}

/// Executes the `[seed payment, bootstrap()]` group signed by the creator.
#[post("/apps/{app_id}/bootstrap/")]
pub async fn bootstrap(
    state: web::Data<AppState>,
    path: web::Path<u64>,
    body: web::Json<SignedCall<BootstrapCall>>,
) -> impl Responder {
    let app_id = path.into_inner();
    if body.call.app_id != app_id {
        warn!("POST /apps/{app_id}/bootstrap/ - rejected: call targets app {}", body.call.app_id);
        return HttpResponse::BadRequest().body("call app_id does not match path");
    }
    let sender = match body.verify(BOOTSTRAP_METHOD) {
        Ok(sender) => sender,
        Err(e) => return reject(e),
    };

    match state.ledger.bootstrap(app_id, &sender, &body.call.group) {
        Ok(asset_id) => {
            info!("POST /apps/{app_id}/bootstrap/ - accepted, asset {asset_id}");
            HttpResponse::Ok().json(BootstrapResponse { asset_id })
        }
        Err(e) => {
            warn!("POST /apps/{app_id}/bootstrap/ - rejected: {e}");
            reject(e)
        }
    }
}

#[post("/apps/{app_id}/mine/")]
pub async fn mine(
    state: web::Data<AppState>,
    path: web::Path<u64>,
    body: web::Json<SignedCall<MineCall>>,
) -> impl Responder {
    let app_id = path.into_inner();
    if body.call.app_id != app_id {
        return HttpResponse::BadRequest().body("call app_id does not match path");
    }
    let sender = match body.verify(MINE_METHOD) {
        Ok(sender) => sender,
        Err(e) => return reject(e),
    };
    let Ok(coinbase) = hex::decode(&body.call.coinbase) else {
        return HttpResponse::BadRequest().body("coinbase must be hex");
    };

    match state.ledger.mine(app_id, &sender, body.call.nonce, &coinbase) {
        Ok(reward) => HttpResponse::Ok().json(MineResponse { reward }),
        Err(e) => {
            // stale submissions are routine when several miners race
            debug!("POST /apps/{app_id}/mine/ - rejected: {e}");
            reject(e)
        }
    }
}
