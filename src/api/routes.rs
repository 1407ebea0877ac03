use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/wallet/create", web::post().to(handlers::create_wallet))
            .route("/wallet/info", web::get().to(handlers::wallet_info))
            .route("/transaction/create", web::post().to(handlers::create_transaction))
            .route("/transaction/receive", web::post().to(handlers::receive_transaction))
            .route("/transactions/pending", web::get().to(handlers::get_pending_transactions))
            .route("/mine", web::post().to(handlers::mine_block))
            .route("/blockchain", web::get().to(handlers::get_blockchain))
            .route("/blockchain/full", web::get().to(handlers::get_full_blockchain))
            .route("/blockchain/export", web::get().to(handlers::export_blockchain))
            .route("/blockchain/sync", web::post().to(handlers::sync_blockchain))
            .route("/blockchain/reconcile", web::post().to(handlers::reconcile_blockchain))
            .route("/balance/{address}", web::get().to(handlers::get_balance))
            .route("/peers/register", web::post().to(handlers::register_peer))
            .route("/peers", web::get().to(handlers::get_peers))
    );
}
