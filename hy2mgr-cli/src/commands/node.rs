//! `hy2mgr node`: manage client accounts.

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use hy2mgr_core::{Node, NodeId};

use super::{print_apply_report, Host};

#[derive(Subcommand, Debug)]
pub enum NodeCommand {
    /// Add a node and apply.
    Add(NodeAddArgs),
    /// Remove a node and apply.
    Rm(NodeIdArg),
    /// List nodes in creation order.
    Ls(NodeLsArgs),
    /// Enable a node and apply.
    Enable(NodeIdArg),
    /// Disable a node (kept in state, dropped from auth) and apply.
    Disable(NodeIdArg),
    /// Generate a new password for a node and apply.
    Reset(NodeIdArg),
}

#[derive(Args, Debug)]
pub struct NodeAddArgs {
    /// Display name.
    #[arg(long)]
    pub name: String,

    /// Auth username (default: `u<id>`).
    #[arg(long)]
    pub username: Option<String>,

    /// Auth password (default: random).
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Args, Debug)]
pub struct NodeIdArg {
    /// Node id.
    #[arg(long)]
    pub id: String,
}

#[derive(Args, Debug)]
pub struct NodeLsArgs {
    /// Emit machine-readable JSON (passwords omitted).
    #[arg(long)]
    pub json: bool,
}

pub fn run(command: NodeCommand) -> Result<()> {
    match command {
        NodeCommand::Add(args) => add(args),
        NodeCommand::Rm(NodeIdArg { id }) => {
            let host = Host::open(true)?;
            let mut state = host.load_state()?;
            let report = host
                .manager()
                .node_delete(&mut state, &NodeId::from(id.as_str()))
                .with_context(|| format!("failed to delete node '{id}'"))?;
            print_apply_report(&report);
            println!("Deleted: {id}");
            Ok(())
        }
        NodeCommand::Ls(args) => list(args),
        NodeCommand::Enable(NodeIdArg { id }) => set_enabled(&id, true),
        NodeCommand::Disable(NodeIdArg { id }) => set_enabled(&id, false),
        NodeCommand::Reset(NodeIdArg { id }) => {
            let host = Host::open(true)?;
            let mut state = host.load_state()?;
            let (_, report) = host
                .manager()
                .node_reset_password(&mut state, &NodeId::from(id.as_str()))
                .with_context(|| format!("failed to reset node '{id}'"))?;
            print_apply_report(&report);
            println!("Reset password: {id}");
            println!("Next: hy2mgr export uri --id {id}");
            Ok(())
        }
    }
}

fn add(args: NodeAddArgs) -> Result<()> {
    if args.name.trim().is_empty() {
        bail!("--name must not be empty");
    }
    let host = Host::open(true)?;
    let mut state = host.load_state()?;
    let (node, report) = host
        .manager()
        .node_add(&mut state, args.name.trim(), args.username, args.password)
        .context("failed to add node")?;
    print_apply_report(&report);
    println!("Node created: {} {}", node.id, node.name);
    println!("URI: hy2mgr export uri --id {}", node.id);
    Ok(())
}

fn set_enabled(id: &str, enabled: bool) -> Result<()> {
    let host = Host::open(true)?;
    let mut state = host.load_state()?;
    let report = host
        .manager()
        .node_set_enabled(&mut state, &NodeId::from(id), enabled)
        .with_context(|| format!("failed to update node '{id}'"))?;
    print_apply_report(&report);
    println!("{}: {id}", if enabled { "Enabled" } else { "Disabled" });
    Ok(())
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[derive(Tabled)]
struct NodeTableRow {
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "username")]
    username: String,
    #[tabled(rename = "enabled")]
    enabled: bool,
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "created")]
    created: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeJson<'a> {
    id: &'a str,
    name: &'a str,
    username: &'a str,
    enabled: bool,
    created_at: String,
}

fn list(args: NodeLsArgs) -> Result<()> {
    let host = Host::open(false)?;
    let state = host.load_state()?;
    let nodes = state.nodes_sorted();

    if args.json {
        let payload: Vec<NodeJson<'_>> = nodes.iter().map(|n| node_json(n)).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).context("failed to serialize nodes JSON")?
        );
        return Ok(());
    }

    if nodes.is_empty() {
        println!("No nodes. Add one with `hy2mgr node add --name <name>`.");
        return Ok(());
    }
    let rows: Vec<NodeTableRow> = nodes
        .into_iter()
        .map(|n| NodeTableRow {
            id: n.id.to_string(),
            username: n.username.clone(),
            enabled: n.enabled,
            name: n.name.clone(),
            created: n.created_at.format("%Y-%m-%d %H:%M").to_string(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn node_json(n: &Node) -> NodeJson<'_> {
    NodeJson {
        id: &n.id.0,
        name: &n.name,
        username: &n.username,
        enabled: n.enabled,
        created_at: n.created_at.to_rfc3339(),
    }
}
