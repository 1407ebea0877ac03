use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::{anyhow, Context};
use clap::Parser;
use log::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use std::sync::Arc;

mod api;
mod blockchain;
mod config;
mod network;
mod node;

use config::NodeConfig;

/// Largest request body accepted, big enough for a full chain export
const MAX_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::create_wallet,
        api::handlers::wallet_info,
        api::handlers::create_transaction,
        api::handlers::receive_transaction,
        api::handlers::get_pending_transactions,
        api::handlers::mine_block,
        api::handlers::get_blockchain,
        api::handlers::get_full_blockchain,
        api::handlers::export_blockchain,
        api::handlers::sync_blockchain,
        api::handlers::reconcile_blockchain,
        api::handlers::get_balance,
        api::handlers::register_peer,
        api::handlers::get_peers
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::Address,
            blockchain::DigitalSignature,
            blockchain::ChainExport,
            node::IdentityInfo,
            node::MinedBlock,
            node::BlockSummary,
            node::ChainSummary,
            node::TransactionView,
            node::BlockDetail,
            node::FullChain,
            api::schema::WalletRequest,
            api::schema::TransactionRequest,
            api::schema::MineRequest,
            api::schema::PeerRequest,
            api::schema::ReconcileResponse,
            api::schema::ErrorResponse,
            api::handlers::WalletResponse,
            api::handlers::CreatedTransaction,
            api::handlers::TransactionResponse,
            api::handlers::BalanceResponse,
            api::handlers::PeersResponse
        )
    ),
    tags(
        (name = "ledger", description = "Proof-of-work ledger node endpoints")
    ),
    info(
        title = "Ledger Node API",
        version = "0.1.0",
        description = "Signed transfers, proof-of-work mining and longest-chain sync",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = NodeConfig::parse();
    config.validate().map_err(|e| anyhow!(e))?;

    let node = Arc::new(node::NodeContext::new(
        config.ledger_settings(),
        config.mining_timeout(),
    ));
    let state = web::Data::new(api::AppState {
        node,
        peers: network::PeerRegistry::new(config.peers.clone()),
        transport: Arc::new(network::HttpPeerClient::new(
            config.broadcast_timeout(),
            config.sync_timeout(),
        )),
        public_url: config.public_url(),
    });

    info!(
        "Starting node at http://{}:{} (difficulty {}, reward {}, {} peers)",
        config.host,
        config.port,
        config.difficulty,
        config.mining_reward,
        state.peers.list().len()
    );

    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(MAX_PAYLOAD_BYTES))
            .app_data(web::JsonConfig::default().limit(MAX_PAYLOAD_BYTES))
            .configure(api::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
    })
    .bind((config.host.as_str(), config.port))
    .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?
    .run()
    .await
    .context("HTTP server failed")
}
