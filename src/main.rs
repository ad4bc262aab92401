use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use liqapi::config::{CLIENT_VERSION, parse_header};
use liqapi::http::Params;
use liqapi::{
    ApiClient, ApiConfig, AuthManager, ExchangeParams, HttpMethod, HttpTransport, OAuthToken,
    TokenStore,
};
use log::debug;
use reqwest::Client;

/// liqapi - liq backend API client
///
/// Sends requests through the same pipeline the app uses: additional
/// headers, bearer token, response normalization and unauthorized recovery.
///
/// Examples:
///   liqapi get documents
///   liqapi send POST items --json '{"name": "x"}'
///   liqapi exchange --code abc123
#[derive(Parser, Debug)]
#[command(author, version = CLIENT_VERSION, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API base URL
    #[arg(
        long = "base-url",
        env = "LIQAPI_BASE_URL",
        value_name = "URL",
        global = true,
        default_value = "http://localhost:3000/api/v1/"
    )]
    pub base_url: String,

    /// Code exchange endpoint (defaults to /oauth/token on the base host)
    #[arg(long = "auth-url", env = "LIQAPI_AUTH_URL", value_name = "URL", global = true)]
    pub auth_url: Option<String>,

    /// Access token sent as a bearer Authorization header
    #[arg(long, env = "LIQAPI_TOKEN", value_name = "TOKEN", global = true)]
    pub token: Option<String>,

    /// Additional header attached to every request ("Name: value")
    #[arg(long = "header", short = 'H', value_name = "HEADER", global = true)]
    pub headers: Vec<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Fetch a JSON payload from a path under the base URL
    Get(GetArgs),

    /// Send a command whose response body is not consumed
    Send(SendArgs),

    /// Exchange an authorization code for a token
    Exchange(ExchangeArgs),
}

#[derive(clap::Args, Debug)]
pub struct GetArgs {
    /// Path relative to the base URL, or an absolute URL
    #[arg(value_name = "PATH")]
    pub path: String,
}

#[derive(clap::Args, Debug)]
pub struct SendArgs {
    /// HTTP method (GET, POST, PUT, PATCH, DELETE)
    #[arg(value_name = "METHOD")]
    pub method: HttpMethod,

    /// Path relative to the base URL, or an absolute URL
    #[arg(value_name = "URL")]
    pub url: String,

    /// JSON object sent as the request body
    #[arg(long, value_name = "JSON")]
    pub json: Option<String>,

    /// Send without an Authorization header
    #[arg(long = "no-auth")]
    pub no_auth: bool,
}

#[derive(clap::Args, Debug)]
pub struct ExchangeArgs {
    /// Authorization code
    #[arg(long)]
    pub code: String,

    #[arg(long = "client-id")]
    pub client_id: Option<String>,

    #[arg(long = "redirect-uri")]
    pub redirect_uri: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let config = build_config(&cli)?;
    let transport = Arc::new(HttpTransport::new(Client::builder().build()?));
    let token_store = Arc::new(match &cli.token {
        Some(token) => TokenStore::with_token(OAuthToken::bearer(token.as_str())),
        None => TokenStore::new(),
    });

    match cli.command {
        Commands::Get(args) => {
            let client = ApiClient::new(transport, config, token_store.clone(), token_store);
            let payload = client.get_json(&args.path).await?;
            println!("{}", serde_json::to_string_pretty(&payload.into_value())?);
        }
        Commands::Send(args) => {
            let url = config.resolve(&args.url)?;
            let params = args.json.as_deref().map(parse_params).transpose()?;
            let client = ApiClient::new(transport, config, token_store.clone(), token_store);
            if args.no_auth {
                client
                    .request_without_authorization(args.method, url.as_str(), params)
                    .await?;
            } else {
                client.request(args.method, url.as_str(), params).await?;
            }
            println!("{} {} succeeded", args.method, url);
        }
        Commands::Exchange(args) => {
            let manager = AuthManager::from_config(transport, &config, token_store);
            let mut params = ExchangeParams::authorization_code(args.code);
            if let Some(client_id) = args.client_id {
                params = params.client_id(client_id);
            }
            if let Some(redirect_uri) = args.redirect_uri {
                params = params.redirect_uri(redirect_uri);
            }
            let token = manager.authenticate_with_code(params).await?;
            println!(
                "Authenticated as {} (token {})",
                token.uid.as_deref().unwrap_or("unknown"),
                mask(&token.access_token)
            );
        }
    }
    Ok(())
}

fn build_config(cli: &Cli) -> Result<ApiConfig> {
    let mut config = ApiConfig::new(&cli.base_url)?;
    if let Some(auth_url) = &cli.auth_url {
        config = config.with_auth_url(auth_url)?;
    }
    for header in &cli.headers {
        let (name, value) = parse_header(header)?;
        config = config.with_header(&name, &value)?;
    }
    debug!("Using base URL {}", config.base_url);
    Ok(config)
}

fn parse_params(json: &str) -> Result<Params> {
    let value: serde_json::Value =
        serde_json::from_str(json).context("Failed to parse --json body")?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => anyhow::bail!("--json body must be a JSON object"),
    }
}

fn mask(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}*********{}", head, tail)
}
