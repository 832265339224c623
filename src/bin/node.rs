//! The `otcswap-node` binary (spec.md 6): with no subcommand it starts a
//! node process (gossip listener + HTTP/REST gateway); given a subcommand
//! it instead acts as a thin client against an already-running node's
//! local HTTP socket, the same split the teacher draws between its
//! `makerd`/`takerd` server binaries and its `maker-cli`/`taker-cli`
//! client binaries.

use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use otcswap::node::{Node, NodeConfig};
use serde_json::{json, Value};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Cross-chain OTC swap node and CLI client", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Option<Command>,

    /// Gossip/negotiation listening port. Node-startup mode only.
    #[clap(long)]
    port: Option<u16>,

    /// HTTP/REST gateway listening port. Node-startup mode only.
    #[clap(long)]
    http_port: Option<u16>,

    /// Peer address to dial at startup (spec.md 6 `--connect`). Node-startup
    /// mode only.
    #[clap(long)]
    connect: Option<String>,

    /// Base URL of a running node's HTTP gateway. Client subcommands only.
    #[clap(long, default_value = "http://127.0.0.1:8080")]
    api: String,

    /// Bearer session token obtained from `auth login`. Client subcommands
    /// that mutate state require it. Falls back to `OTCSWAP_SESSION`.
    #[clap(long)]
    session: Option<String>,
}

#[derive(Parser, Debug)]
enum Command {
    /// Register or log in a local user account (spec.md 4.2).
    Auth {
        #[clap(subcommand)]
        action: AuthAction,
    },
    /// Create, list, or cancel orders (spec.md 4.6, 6).
    Order {
        #[clap(subcommand)]
        action: OrderAction,
    },
    /// Drive the negotiation state machine as a Taker or a Maker
    /// (spec.md 4.7, 6).
    Negotiate {
        #[clap(subcommand)]
        action: NegotiateAction,
    },
    /// Read-only lookups against the running node (spec.md 6).
    Query {
        #[clap(subcommand)]
        action: QueryAction,
    },
}

#[derive(Parser, Debug)]
enum AuthAction {
    Register {
        #[clap(long)]
        username: String,
        #[clap(long)]
        password: String,
    },
    Login {
        #[clap(long)]
        username: String,
        #[clap(long)]
        password: String,
    },
}

#[derive(Parser, Debug)]
enum OrderAction {
    Create {
        #[clap(long, value_parser = parse_side)]
        side: String,
        #[clap(long)]
        base_asset: String,
        #[clap(long)]
        base_chain: String,
        #[clap(long)]
        quote_asset: String,
        #[clap(long)]
        quote_chain: String,
        #[clap(long)]
        base_amount: u64,
        #[clap(long)]
        min_price: f64,
        #[clap(long)]
        max_price: f64,
        #[clap(long, default_value_t = 3600)]
        ttl_secs: u64,
    },
    List,
    Cancel {
        #[clap(long)]
        order_id: String,
    },
}

#[derive(Parser, Debug)]
enum NegotiateAction {
    /// Pull an order's full terms from its creator before proposing.
    Request {
        #[clap(long)]
        order_id: String,
        #[clap(long)]
        to_peer_id: String,
    },
    /// A Taker proposes against an order.
    Propose {
        #[clap(long)]
        order_id: String,
        #[clap(long)]
        amount: u64,
        #[clap(long)]
        price: f64,
        #[clap(long)]
        nonce: u64,
        #[clap(long)]
        taker_base_address: String,
        #[clap(long)]
        taker_quote_address: String,
    },
    /// The Maker accepts a pending proposal.
    Accept {
        #[clap(long)]
        proposal_id: String,
        #[clap(long)]
        maker_base_address: Option<String>,
        #[clap(long)]
        maker_quote_address: Option<String>,
    },
    /// The Maker rejects a pending proposal.
    Reject {
        #[clap(long)]
        proposal_id: String,
    },
    /// Either party withdraws a still-pending proposal.
    Cancel {
        #[clap(long)]
        proposal_id: String,
    },
}

#[derive(Parser, Debug)]
enum QueryAction {
    Peers,
    Orders,
    Proposals,
    Status {
        #[clap(long)]
        proposal_id: String,
    },
}

fn parse_side(raw: &str) -> Result<String, String> {
    match raw.to_ascii_lowercase().as_str() {
        "buy" => Ok("Buy".to_string()),
        "sell" => Ok("Sell".to_string()),
        other => Err(format!("side must be 'buy' or 'sell', got '{other}'")),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let mut cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(1);
        }
    };
    if cli.session.is_none() {
        cli.session = std::env::var("OTCSWAP_SESSION").ok();
    }

    otcswap::setup_logger();

    match cli.command.take() {
        None => run_node(cli).await,
        Some(command) => run_client(&cli.api, cli.session.as_deref(), command).await,
    }
}

/// Node-startup mode: `node --port <p> [--connect <multiaddr>]` (spec.md 6).
async fn run_node(cli: Cli) -> ExitCode {
    let mut config = match NodeConfig::load(None) {
        Ok(config) => config,
        Err(e) => {
            log::error!("failed to load node configuration: {e}");
            return ExitCode::from(2);
        }
    };
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(http_port) = cli.http_port {
        config.http_port = http_port;
    }
    if cli.connect.is_some() {
        config.bootstrap_peer = cli.connect;
    }

    let node = Arc::new(Node::new(config));
    match otcswap::node::server::run(node).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("node exited: {e}");
            ExitCode::from(2)
        }
    }
}

/// Client mode: every non-node-startup subcommand talks to a running
/// node's HTTP gateway (spec.md 6: "subcommands act against a running node
/// via its local HTTP socket").
async fn run_client(api: &str, session: Option<&str>, command: Command) -> ExitCode {
    let client = reqwest::Client::new();
    let result = match command {
        Command::Auth { action } => handle_auth(&client, api, action).await,
        Command::Order { action } => handle_order(&client, api, session, action).await,
        Command::Negotiate { action } => handle_negotiate(&client, api, session, action).await,
        Command::Query { action } => handle_query(&client, api, session, action).await,
    };

    match result {
        Ok(body) => {
            println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}

async fn handle_auth(client: &reqwest::Client, api: &str, action: AuthAction) -> Result<Value, String> {
    match action {
        AuthAction::Register { username, password } => {
            post(client, api, "/auth/register", None, &json!({ "username": username, "password": password })).await
        }
        AuthAction::Login { username, password } => {
            post(client, api, "/auth/login", None, &json!({ "username": username, "password": password })).await
        }
    }
}

async fn handle_order(
    client: &reqwest::Client,
    api: &str,
    session: Option<&str>,
    action: OrderAction,
) -> Result<Value, String> {
    match action {
        OrderAction::Create {
            side,
            base_asset,
            base_chain,
            quote_asset,
            quote_chain,
            base_amount,
            min_price,
            max_price,
            ttl_secs,
        } => {
            let body = json!({
                "side": side,
                "base_asset": base_asset,
                "base_chain": base_chain,
                "quote_asset": quote_asset,
                "quote_chain": quote_chain,
                "base_amount": base_amount,
                "min_price": min_price,
                "max_price": max_price,
                "ttl_secs": ttl_secs,
            });
            post(client, api, "/orders", session, &body).await
        }
        OrderAction::List => get(client, api, "/orders", session).await,
        OrderAction::Cancel { order_id } => {
            post(client, api, &format!("/orders/{order_id}/cancel"), session, &json!({})).await
        }
    }
}

async fn handle_negotiate(
    client: &reqwest::Client,
    api: &str,
    session: Option<&str>,
    action: NegotiateAction,
) -> Result<Value, String> {
    match action {
        NegotiateAction::Request { order_id, to_peer_id } => {
            post(
                client,
                api,
                &format!("/orders/{order_id}/request"),
                session,
                &json!({ "to_peer_id": to_peer_id }),
            )
            .await
        }
        NegotiateAction::Propose {
            order_id,
            amount,
            price,
            nonce,
            taker_base_address,
            taker_quote_address,
        } => {
            let body = json!({
                "amount": amount,
                "price": price,
                "nonce": nonce,
                "taker_base_address": taker_base_address,
                "taker_quote_address": taker_quote_address,
            });
            post(client, api, &format!("/orders/{order_id}/proposals"), session, &body).await
        }
        NegotiateAction::Accept {
            proposal_id,
            maker_base_address,
            maker_quote_address,
        } => {
            let body = json!({
                "accept": true,
                "maker_base_address": maker_base_address,
                "maker_quote_address": maker_quote_address,
            });
            post(client, api, &format!("/proposals/{proposal_id}/decide"), session, &body).await
        }
        NegotiateAction::Reject { proposal_id } => {
            let body = json!({ "accept": false, "maker_base_address": Value::Null, "maker_quote_address": Value::Null });
            post(client, api, &format!("/proposals/{proposal_id}/decide"), session, &body).await
        }
        NegotiateAction::Cancel { proposal_id } => {
            post(client, api, &format!("/proposals/{proposal_id}/cancel"), session, &json!({})).await
        }
    }
}

async fn handle_query(
    client: &reqwest::Client,
    api: &str,
    session: Option<&str>,
    action: QueryAction,
) -> Result<Value, String> {
    match action {
        QueryAction::Peers => get(client, api, "/peers", session).await,
        QueryAction::Orders => get(client, api, "/orders", session).await,
        QueryAction::Proposals => get(client, api, "/proposals", session).await,
        QueryAction::Status { proposal_id } => get(client, api, &format!("/settlement/{proposal_id}"), session).await,
    }
}

async fn get(client: &reqwest::Client, api: &str, path: &str, session: Option<&str>) -> Result<Value, String> {
    let mut request = client.get(format!("{api}{path}"));
    if let Some(token) = session {
        request = request.bearer_auth(token);
    }
    send(request).await
}

async fn post(client: &reqwest::Client, api: &str, path: &str, session: Option<&str>, body: &Value) -> Result<Value, String> {
    let mut request = client.post(format!("{api}{path}")).json(body);
    if let Some(token) = session {
        request = request.bearer_auth(token);
    }
    send(request).await
}

async fn send(request: reqwest::RequestBuilder) -> Result<Value, String> {
    let response = request.send().await.map_err(|e| format!("request failed: {e}"))?;
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    if !status.is_success() {
        return Err(format!("{status}: {body}"));
    }
    Ok(body)
}
