//! `hy2mgr export`: client URIs and the subscription link.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use hy2mgr_core::{NodeId, Settings};

use super::{require_root, Host};

const DEFAULT_MANAGE_PORT: &str = "3333";

#[derive(Subcommand, Debug)]
pub enum ExportCommand {
    /// Print the hysteria2:// URI of a node.
    Uri(ExportUriArgs),
    /// Issue, rotate or revoke the subscription token.
    Subscription(ExportSubscriptionArgs),
}

#[derive(Args, Debug)]
pub struct ExportUriArgs {
    /// Node id.
    #[arg(long)]
    pub id: String,
}

#[derive(Args, Debug)]
pub struct ExportSubscriptionArgs {
    /// Issue a new token; earlier ones stop working.
    #[arg(long, conflicts_with = "revoke")]
    pub rotate: bool,

    /// Revoke the current token.
    #[arg(long)]
    pub revoke: bool,
}

pub fn run(command: ExportCommand) -> Result<()> {
    match command {
        ExportCommand::Uri(args) => {
            let host = Host::open(false)?;
            let state = host.load_state()?;
            let uri = host
                .manager()
                .node_uri(&state, &NodeId::from(args.id.as_str()))
                .with_context(|| format!("failed to build URI for node '{}'", args.id))?;
            println!("{uri}");
            Ok(())
        }
        ExportCommand::Subscription(args) => subscription(args),
    }
}

fn subscription(args: ExportSubscriptionArgs) -> Result<()> {
    let host = Host::open(false)?;
    let mut state = host.load_state()?;
    let writes = args.rotate || args.revoke || state.subscription.token_hashed.is_empty();
    if !writes {
        println!("Token is stored hashed; to show a usable URL, rotate it:");
        println!("  hy2mgr export subscription --rotate");
        return Ok(());
    }

    require_root(&host.layout)?;
    if args.revoke {
        host.manager()
            .subscription_revoke(&mut state)
            .context("failed to revoke subscription")?;
        println!("Subscription revoked.");
        return Ok(());
    }
    let issued = host
        .manager()
        .subscription_rotate(&mut state)
        .context("failed to rotate subscription token")?;
    println!("New token (shown once): {}", issued.token);
    println!(
        "Subscription URL: http://127.0.0.1:{}{}",
        manage_port(&state.settings),
        issued.path
    );
    Ok(())
}

fn manage_port(settings: &Settings) -> &str {
    settings
        .manage_listen
        .rsplit_once(':')
        .map(|(_, port)| port)
        .filter(|port| !port.is_empty())
        .unwrap_or(DEFAULT_MANAGE_PORT)
}
