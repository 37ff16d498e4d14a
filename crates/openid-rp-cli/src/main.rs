mod config;
mod logging;
mod serve;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use openid_rp::{
    AssertionVerifier, AuthenticationRequest, InMemoryNonceStore, NonceStore, ReqwestTransport,
    RequestBinAllocator, VerifiedIdentity, WargamingAccount,
};

use crate::config::{
    RpConfig, default_config_dir, load_config, validate_config, write_default_config,
    write_default_config_file,
};

#[derive(Debug, Parser)]
#[command(name = "openid-rp", about = "OpenID 2.0 relying party: log in and verify assertions")]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    /// Config file (default: ~/.config/openid-rp/rp.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write a default rp.toml
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Start a login and print the OP URL to open
    Login {
        #[arg(long)]
        op_endpoint: Option<String>,
        #[arg(long)]
        return_to: Option<String>,
        #[arg(long)]
        request_id: Option<String>,
    },
    /// Verify a callback URL received from the OP
    Verify { callback_url: String },
    /// Log in, wait for the callback on localhost, and verify it
    Serve {
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        op_endpoint: Option<String>,
        #[arg(long)]
        return_to: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    logging::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => cmd_init(cli.config.as_deref(), force, cli.json),
        Commands::Login {
            op_endpoint,
            return_to,
            request_id,
        } => {
            let mut cfg = load_config(cli.config.as_deref())?;
            apply_overrides(&mut cfg, op_endpoint, return_to, None)?;
            cmd_login(&cfg, request_id, cli.json)
        }
        Commands::Verify { callback_url } => {
            let cfg = load_config(cli.config.as_deref())?;
            cmd_verify(&cfg, &callback_url, cli.json)
        }
        Commands::Serve {
            port,
            op_endpoint,
            return_to,
        } => {
            let mut cfg = load_config(cli.config.as_deref())?;
            apply_overrides(&mut cfg, op_endpoint, return_to, port)?;
            cmd_serve(&cfg, cli.json)
        }
    }
}

fn cmd_init(config: Option<&Path>, force: bool, json: bool) -> anyhow::Result<()> {
    let path = match config {
        Some(path) => {
            write_default_config_file(path, force)?;
            path.to_path_buf()
        }
        None => write_default_config(&default_config_dir(), force)?,
    };
    pout(
        json,
        serde_json::json!({"message": "init complete", "config": path}),
        &format!("Init complete: {}", path.display()),
    )
}

fn apply_overrides(
    cfg: &mut RpConfig,
    op_endpoint: Option<String>,
    return_to: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    if let Some(op_endpoint) = op_endpoint {
        cfg.op_endpoint = op_endpoint;
    }
    if let Some(return_to) = return_to {
        cfg.return_to = return_to;
    }
    if let Some(port) = port {
        cfg.listen_port = port;
    }
    validate_config(cfg)
}

fn transport(cfg: &RpConfig) -> anyhow::Result<ReqwestTransport> {
    ReqwestTransport::with_timeout(Duration::from_millis(cfg.request_timeout_ms))
        .context("failed to build HTTP client")
}

fn build_request(
    cfg: &RpConfig,
    request_id: Option<String>,
    transport: &ReqwestTransport,
) -> anyhow::Result<AuthenticationRequest> {
    let mut builder = AuthenticationRequest::builder();
    if let Some(request_id) = request_id {
        builder = builder.request_id(request_id);
    }
    if !cfg.return_to.is_empty() {
        builder = builder.return_to(cfg.return_to.clone());
    } else if let Some(bin) = &cfg.request_bin {
        builder = builder.allocator(Arc::new(RequestBinAllocator::with_endpoints(
            bin.api_url.clone(),
            bin.public_base.clone(),
            Arc::new(transport.clone()),
        )));
    }
    Ok(builder.build()?)
}

fn login(
    cfg: &RpConfig,
    request_id: Option<String>,
    transport: &ReqwestTransport,
) -> anyhow::Result<(AuthenticationRequest, String)> {
    let request = build_request(cfg, request_id, transport)?;
    let login_url = request
        .authenticate(&cfg.op_endpoint, transport)
        .with_context(|| format!("authentication request to {} failed", cfg.op_endpoint))?;
    Ok((request, login_url))
}

fn cmd_login(cfg: &RpConfig, request_id: Option<String>, json: bool) -> anyhow::Result<()> {
    let transport = transport(cfg)?;
    let (request, login_url) = login(cfg, request_id, &transport)?;
    let evidence = request.evidence();
    let text = format!(
        "Open this url:\n{login_url}\n\nrequest_id: {}\nreturn_to: {}\nsent: {}",
        evidence.request_id,
        request.return_to(),
        evidence.http_date
    );
    pout(
        json,
        serde_json::json!({"login_url": login_url, "evidence": evidence}),
        &text,
    )
}

fn cmd_verify(cfg: &RpConfig, callback_url: &str, json: bool) -> anyhow::Result<()> {
    let transport = Arc::new(transport(cfg)?);
    let verifier = AssertionVerifier::new(callback_url)?.with_transport(transport);
    report(verifier.verify(), json)
}

fn cmd_serve(cfg: &RpConfig, json: bool) -> anyhow::Result<()> {
    if cfg.return_to.is_empty() {
        anyhow::bail!("serve needs a return_to on localhost");
    }
    let return_port = url::Url::parse(&cfg.return_to)?.port_or_known_default();
    if return_port != Some(cfg.listen_port) {
        tracing::warn!(
            return_to = %cfg.return_to,
            listen_port = cfg.listen_port,
            "return_to does not point at the listen port; the callback will not arrive here"
        );
    }

    let transport = transport(cfg)?;
    let (request, login_url) = login(cfg, None, &transport)?;
    eprintln!();
    eprintln!("##################");
    eprintln!("# Open this url: #");
    eprintln!("------------------");
    eprintln!("{login_url}");
    eprintln!("------------------");

    let target = serve::capture_callback(cfg.listen_port)?;
    let callback_url = serve::callback_url(request.return_to(), &target)?;
    tracing::info!(request_id = request.request_id(), "callback received");

    let nonces: Arc<dyn NonceStore> = Arc::new(InMemoryNonceStore::new());
    let verifier = AssertionVerifier::with_capabilities(&callback_url, nonces, Arc::new(transport))?;
    report(verifier.verify(), json)
}

fn report(outcome: openid_rp::Result<VerifiedIdentity>, json: bool) -> anyhow::Result<()> {
    match outcome {
        Ok(user) => {
            let account = WargamingAccount::from_identity(&user.identity);
            let text = match &account {
                Some(account) => format!(
                    "Authenticated: {} (account {}, nickname {})",
                    user.claimed_id, account.account_id, account.nickname
                ),
                None => format!("Authenticated: {}", user.claimed_id),
            };
            pout(
                json,
                serde_json::json!({"ok": true, "user": user, "wargaming": account}),
                &text,
            )
        }
        Err(e) => {
            let kind = if e.is_rejection() { "rejected" } else { "fatal" };
            if json {
                pout(
                    true,
                    serde_json::json!({"ok": false, "kind": kind, "check": e.check(), "error": e.to_string()}),
                    "",
                )?;
            }
            Err(anyhow::Error::new(e).context(format!("assertion {kind}")))
        }
    }
}

fn pout(json_mode: bool, value: serde_json::Value, text: &str) -> anyhow::Result<()> {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{text}");
    }
    Ok(())
}
