//! Reconcile and state-operation scenarios against a throwaway root with
//! in-memory host collaborators.

use std::fs;
use std::net::IpAddr;

use hy2mgr_core::{DesiredState, Layout, Node, NodeId, StateStore, DAEMON_UNIT};
use hy2mgr_detector::FixedAddress;
use hy2mgr_host::{HostFirewall, MemoryServiceController, ScriptedRunner};
use hy2mgr_render::validate;
use hy2mgr_sync::{
    config_backups, parse_pin, subscription_verify, CertStep, Manager, ReconcileError, Reconciler, Step,
    WriteResult,
};
use tempfile::TempDir;

fn public_ip() -> IpAddr {
    "203.0.113.7".parse().unwrap()
}

fn reconciler<'a>(layout: &Layout, services: &'a MemoryServiceController) -> Reconciler<'a> {
    reconciler_with_ports(layout, services, |_p: u16| true)
}

fn reconciler_with_ports<'a>(
    layout: &Layout,
    services: &'a MemoryServiceController,
    probe: impl Fn(u16) -> bool + 'a,
) -> Reconciler<'a> {
    Reconciler::new(layout.clone(), services, HostFirewall::new(ScriptedRunner::new()))
        .unwrap()
        .with_port_probe(probe)
        .with_public_address(FixedAddress(Some(public_ip())))
}

fn state_with(nodes: Vec<Node>) -> DesiredState {
    let mut st = DesiredState::default();
    st.nodes = nodes;
    st
}

// ---------------------------------------------------------------------------
// 1. apply
// ---------------------------------------------------------------------------

#[test]
fn first_apply_creates_cert_config_and_starts_daemon() {
    let tmp = TempDir::new().unwrap();
    let layout = Layout::under(tmp.path());
    let services = MemoryServiceController::new();
    let rec = reconciler(&layout, &services);

    let mut st = state_with(vec![Node::new("a", Some("u1".into()), Some("p1".into()))]);
    let report = rec.apply(&mut st, false).unwrap();

    let pin = match &report.cert {
        CertStep::Generated { pin } => pin.clone(),
        other => panic!("expected a generated cert, got {other:?}"),
    };
    assert_eq!(parse_pin(&layout.cert_path()).unwrap(), pin);
    assert!(layout.key_path().exists());
    assert!(matches!(report.config, WriteResult::Written { backup: None, .. }));

    let doc = fs::read_to_string(layout.config_path()).unwrap();
    let cfg = validate(&doc).unwrap();
    assert_eq!(cfg.listen.as_deref(), Some(":443"));
    assert_eq!(cfg.auth.userpass.unwrap().get("u1").map(String::as_str), Some("p1"));

    assert_eq!(
        services.calls(),
        vec![format!("enable-now {DAEMON_UNIT}"), format!("restart {DAEMON_UNIT}")]
    );
}

#[test]
fn second_apply_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let layout = Layout::under(tmp.path());
    let services = MemoryServiceController::new();
    let rec = reconciler(&layout, &services);

    let mut st = state_with(vec![Node::new("a", None, None)]);
    rec.apply(&mut st, false).unwrap();
    let first = fs::read(layout.config_path()).unwrap();

    let report = rec.apply(&mut st, false).unwrap();
    assert_eq!(report.cert, CertStep::Present);
    assert!(matches!(report.config, WriteResult::Unchanged { .. }));
    assert_eq!(fs::read(layout.config_path()).unwrap(), first);
    assert!(config_backups(&layout.config_path()).unwrap().is_empty());
}

#[test]
fn cert_without_key_is_regenerated() {
    let tmp = TempDir::new().unwrap();
    let layout = Layout::under(tmp.path());
    let services = MemoryServiceController::new();
    let rec = reconciler(&layout, &services);

    let mut st = state_with(vec![Node::new("a", None, None)]);
    rec.apply(&mut st, false).unwrap();
    let old_pin = parse_pin(&layout.cert_path()).unwrap();
    fs::remove_file(layout.key_path()).unwrap();

    let report = rec.apply(&mut st, false).unwrap();
    let pin = match &report.cert {
        CertStep::Generated { pin } => pin.clone(),
        other => panic!("expected a regenerated cert, got {other:?}"),
    };
    assert_ne!(pin, old_pin);
    assert!(layout.key_path().exists());
    assert_eq!(parse_pin(&layout.cert_path()).unwrap(), pin);
}

#[test]
fn changed_state_backs_up_previous_config() {
    let tmp = TempDir::new().unwrap();
    let layout = Layout::under(tmp.path());
    let services = MemoryServiceController::new();
    let rec = reconciler(&layout, &services);

    let mut st = state_with(vec![
        Node::new("a", Some("u1".into()), Some("p1".into())),
        Node::new("b", Some("u2".into()), Some("p2".into())),
    ]);
    rec.apply(&mut st, false).unwrap();

    st.nodes[1].enabled = false;
    let report = rec.apply(&mut st, false).unwrap();
    assert!(matches!(report.config, WriteResult::Written { backup: Some(_), .. }));
    assert_eq!(config_backups(&layout.config_path()).unwrap().len(), 1);

    let cfg = validate(&fs::read_to_string(layout.config_path()).unwrap()).unwrap();
    let users = cfg.auth.userpass.unwrap();
    assert!(users.contains_key("u1"));
    assert!(!users.contains_key("u2"));
    assert_eq!(st.nodes.len(), 2, "disabled node keeps its record");
}

#[test]
fn dry_run_touches_nothing() {
    let tmp = TempDir::new().unwrap();
    let layout = Layout::under(tmp.path());
    let services = MemoryServiceController::new();
    let rec = reconciler(&layout, &services);

    let mut st = state_with(vec![Node::new("a", Some("u1".into()), Some("secret".into()))]);
    let report = rec.apply(&mut st, true).unwrap();

    assert!(matches!(report.cert, CertStep::WouldGenerate { .. }));
    assert!(matches!(report.config, WriteResult::WouldWrite { .. }));
    let preview = report.preview.unwrap();
    assert!(preview.contains("***"));
    assert!(!preview.contains("secret"));
    assert!(!layout.cert_path().exists());
    assert!(!layout.config_path().exists());
    assert!(services.calls().is_empty());
}

#[test]
fn empty_node_list_gets_a_default_node() {
    let tmp = TempDir::new().unwrap();
    let layout = Layout::under(tmp.path());
    let services = MemoryServiceController::new();
    let rec = reconciler(&layout, &services);

    let mut st = DesiredState::default();
    let report = rec.apply(&mut st, false).unwrap();

    assert_eq!(st.nodes.len(), 1);
    assert_eq!(st.nodes[0].name, "default");
    assert_eq!(report.default_node, Some(st.nodes[0].id.clone()));
}

#[test]
fn busy_port_falls_back_to_first_bindable_candidate() {
    let tmp = TempDir::new().unwrap();
    let layout = Layout::under(tmp.path());
    let services = MemoryServiceController::new();
    let rec = reconciler_with_ports(&layout, &services, |p: u16| p == 2053);

    let mut st = state_with(vec![Node::new("a", None, None)]);
    let report = rec.apply(&mut st, false).unwrap();

    assert_eq!(report.previous_port, 443);
    assert_eq!(report.port, 2053);
    assert!(report.port_changed());
    assert_eq!(st.settings.listen_port, 2053);
}

#[test]
fn port_held_by_running_daemon_is_kept() {
    let tmp = TempDir::new().unwrap();
    let layout = Layout::under(tmp.path());
    let services = MemoryServiceController::new();
    let mut st = state_with(vec![Node::new("a", None, None)]);
    reconciler(&layout, &services).apply(&mut st, false).unwrap();

    // The daemon now owns 443, so a real probe would report it busy.
    let rec = reconciler_with_ports(&layout, &services, |p: u16| p != 443);
    let report = rec.apply(&mut st, false).unwrap();
    assert_eq!(report.port, 443);
    assert!(!report.port_changed());
}

#[test]
fn service_failures_become_warnings() {
    let tmp = TempDir::new().unwrap();
    let layout = Layout::under(tmp.path());
    let services = MemoryServiceController::new().failing(DAEMON_UNIT);
    let rec = reconciler(&layout, &services);

    let mut st = state_with(vec![Node::new("a", None, None)]);
    let report = rec.apply(&mut st, false).unwrap();

    let service_warnings: Vec<_> = report.warnings.iter().filter(|w| w.step == Step::Service).collect();
    assert_eq!(service_warnings.len(), 2);
    assert!(layout.config_path().exists());
}

#[test]
fn duplicate_usernames_are_warned_about() {
    let tmp = TempDir::new().unwrap();
    let layout = Layout::under(tmp.path());
    let services = MemoryServiceController::new();
    let rec = reconciler(&layout, &services);

    let mut st = state_with(vec![
        Node::new("a", Some("same".into()), None),
        Node::new("b", Some("same".into()), None),
    ]);
    let report = rec.apply(&mut st, true).unwrap();
    assert!(report.warnings.iter().any(|w| w.step == Step::Users && w.message.contains("same")));
}

// ---------------------------------------------------------------------------
// 2. Manager operations
// ---------------------------------------------------------------------------

#[test]
fn node_add_applies_and_persists() {
    let tmp = TempDir::new().unwrap();
    let layout = Layout::under(tmp.path());
    let store = StateStore::new(&layout);
    let services = MemoryServiceController::new();
    let rec = reconciler(&layout, &services);
    let mgr = Manager::new(&store, &rec);

    let mut st = store.load_or_init().unwrap();
    let (node, _) = mgr.node_add(&mut st, "phone", None, None).unwrap();

    let saved = store.load_or_init().unwrap();
    assert_eq!(saved.node(&node.id).map(|n| n.name.as_str()), Some("phone"));
    let doc = fs::read_to_string(layout.config_path()).unwrap();
    assert!(doc.contains(&node.username));
}

#[test]
fn unknown_node_is_not_found_and_nothing_changes() {
    let tmp = TempDir::new().unwrap();
    let layout = Layout::under(tmp.path());
    let store = StateStore::new(&layout);
    let services = MemoryServiceController::new();
    let rec = reconciler(&layout, &services);
    let mgr = Manager::new(&store, &rec);

    let mut st = state_with(vec![Node::new("a", None, None)]);
    let before = st.clone();
    let missing = NodeId::from("nope");

    assert!(matches!(mgr.node_delete(&mut st, &missing), Err(ReconcileError::NodeNotFound(_))));
    assert!(matches!(
        mgr.node_set_enabled(&mut st, &missing, false),
        Err(ReconcileError::NodeNotFound(_))
    ));
    assert!(matches!(mgr.node_reset_password(&mut st, &missing), Err(ReconcileError::NodeNotFound(_))));
    assert_eq!(st, before);
    assert!(!store.path().exists());
    assert!(services.calls().is_empty());
}

#[test]
fn reset_password_changes_rendered_credential() {
    let tmp = TempDir::new().unwrap();
    let layout = Layout::under(tmp.path());
    let store = StateStore::new(&layout);
    let services = MemoryServiceController::new();
    let rec = reconciler(&layout, &services);
    let mgr = Manager::new(&store, &rec);

    let mut st = store.load_or_init().unwrap();
    let (node, _) = mgr.node_add(&mut st, "a", Some("u1".into()), Some("old".into())).unwrap();
    let (password, _) = mgr.node_reset_password(&mut st, &node.id).unwrap();

    assert_ne!(password, "old");
    let cfg = validate(&fs::read_to_string(layout.config_path()).unwrap()).unwrap();
    assert_eq!(cfg.auth.userpass.unwrap().get("u1"), Some(&password));
}

#[test]
fn only_latest_subscription_token_verifies() {
    let tmp = TempDir::new().unwrap();
    let layout = Layout::under(tmp.path());
    let store = StateStore::new(&layout);
    let services = MemoryServiceController::new();
    let rec = reconciler(&layout, &services);
    let mgr = Manager::new(&store, &rec);

    let mut st = store.load_or_init().unwrap();
    let first = mgr.subscription_rotate(&mut st).unwrap();
    assert_eq!(first.token.len(), 36);
    assert_eq!(first.path, format!("/sub/{}", first.token));
    assert!(subscription_verify(&st, &first.token));

    let second = mgr.subscription_rotate(&mut st).unwrap();
    assert!(!subscription_verify(&st, &first.token));
    assert!(subscription_verify(&st, &second.token));
    assert!(subscription_verify(&store.load_or_init().unwrap(), &second.token));

    mgr.subscription_revoke(&mut st).unwrap();
    assert!(!subscription_verify(&st, &second.token));
    assert!(services.calls().is_empty(), "subscription changes do not apply");
}

#[test]
fn subscription_export_lists_enabled_nodes_in_creation_order() {
    let tmp = TempDir::new().unwrap();
    let layout = Layout::under(tmp.path());
    let store = StateStore::new(&layout);
    let services = MemoryServiceController::new();
    let rec = reconciler(&layout, &services);
    let mgr = Manager::new(&store, &rec);

    let mut st = store.load_or_init().unwrap();
    mgr.node_add(&mut st, "a", Some("first".into()), Some("p1".into())).unwrap();
    let (b, _) = mgr.node_add(&mut st, "b", Some("second".into()), Some("p2".into())).unwrap();
    mgr.node_add(&mut st, "c", Some("third".into()), Some("p3".into())).unwrap();
    mgr.node_set_enabled(&mut st, &b.id, false).unwrap();
    let token = mgr.subscription_rotate(&mut st).unwrap().token;

    assert_eq!(mgr.subscription_export(&st, "wrong"), None);
    let body = mgr.subscription_export(&st, &token).unwrap();
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("hysteria2://first%3Ap1@203.0.113.7:443/?insecure=1&sni=www.bing.com&pinSHA256="));
    assert!(lines[1].starts_with("hysteria2://third%3Ap3@"));
}

#[test]
fn node_uri_uses_configured_host_and_pin() {
    let tmp = TempDir::new().unwrap();
    let layout = Layout::under(tmp.path());
    let store = StateStore::new(&layout);
    let services = MemoryServiceController::new();
    let rec = reconciler(&layout, &services);
    let mgr = Manager::new(&store, &rec);

    let mut st = store.load_or_init().unwrap();
    st.settings.listen_host = "vpn.example.com".into();
    let (node, _) = mgr.node_add(&mut st, "a", Some("u1".into()), Some("p1".into())).unwrap();

    let pin = mgr.current_pin().unwrap();
    let uri = mgr.node_uri(&st, &node.id).unwrap();
    assert_eq!(
        uri,
        format!(
            "hysteria2://u1%3Ap1@vpn.example.com:443/?insecure=1&sni=www.bing.com&pinSHA256={}",
            pin.replace(':', "%3A")
        )
    );
}

#[test]
fn rotate_cert_changes_pin_and_restarts() {
    let tmp = TempDir::new().unwrap();
    let layout = Layout::under(tmp.path());
    let store = StateStore::new(&layout);
    let services = MemoryServiceController::new();
    let rec = reconciler(&layout, &services);
    let mgr = Manager::new(&store, &rec);

    let mut st = state_with(vec![Node::new("a", None, None)]);
    mgr.apply(&mut st, false).unwrap();
    let old_pin = mgr.current_pin().unwrap();

    let (generated, _) = mgr.rotate_cert(&mut st, false).unwrap();
    assert_ne!(generated.pin, old_pin);
    assert_eq!(mgr.current_pin(), Some(generated.pin));
    assert_eq!(services.calls().iter().filter(|c| c.starts_with("restart")).count(), 2);
}

#[test]
fn restore_puts_latest_backup_back_and_restarts() {
    let tmp = TempDir::new().unwrap();
    let layout = Layout::under(tmp.path());
    let store = StateStore::new(&layout);
    let services = MemoryServiceController::new();
    let rec = reconciler(&layout, &services);
    let mgr = Manager::new(&store, &rec);

    let mut st = state_with(vec![Node::new("a", Some("u1".into()), Some("p1".into()))]);
    mgr.apply(&mut st, false).unwrap();
    let original = fs::read_to_string(layout.config_path()).unwrap();
    st.nodes[0].password = "p2".into();
    mgr.apply(&mut st, false).unwrap();

    let report = mgr.restore(None).unwrap();
    assert!(report.restart_warning.is_none());
    assert_eq!(fs::read_to_string(layout.config_path()).unwrap(), original);
    assert_eq!(services.calls().last().map(String::as_str), Some("restart hysteria-server.service"));
}

#[test]
fn restore_without_backups_fails() {
    let tmp = TempDir::new().unwrap();
    let layout = Layout::under(tmp.path());
    let store = StateStore::new(&layout);
    let services = MemoryServiceController::new();
    let rec = reconciler(&layout, &services);
    let mgr = Manager::new(&store, &rec);

    assert!(matches!(mgr.restore(None), Err(ReconcileError::NoBackup { .. })));
}
