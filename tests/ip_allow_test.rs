//! Integration tests for the IP allow engine.

use std::net::IpAddr;
use std::sync::Arc;

use r0n_ipallow::ip_allow::{
    AclTable, CollectingSink, MethodMask, MethodRegistry, Severity, WELL_KNOWN_METHODS,
};

fn registry() -> Arc<MethodRegistry> {
    Arc::new(MethodRegistry::standard())
}

fn build(text: &str) -> AclTable {
    AclTable::builder(registry()).source("ip_allow.config").build(text)
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

const SAMPLE: &str = "\
# Default ip_allow.config
src_ip=0.0.0.0-255.255.255.255                    action=ip_deny  method=PUSH|PURGE|DELETE
src_ip=::-ffff:ffff:ffff:ffff:ffff:ffff:ffff:ffff action=ip_deny  method=PUSH|PURGE|DELETE
src_ip=127.0.0.1                                  action=ip_allow method=ALL
src_ip=::1                                        action=ip_allow method=ALL
";

#[test]
fn test_default_config() {
    let table = build(SAMPLE);

    for method in WELL_KNOWN_METHODS {
        assert!(table.is_allowed_method(ip("127.0.0.1"), method), "{method}");
        assert!(table.is_allowed_method(ip("::1"), method), "{method}");
    }

    for addr in ["192.168.1.1", "2001:db8::1"] {
        assert!(table.is_allowed_method(ip(addr), "GET"));
        assert!(table.is_allowed_method(ip(addr), "POST"));
        assert!(!table.is_allowed_method(ip(addr), "PURGE"));
        assert!(!table.is_allowed_method(ip(addr), "PUSH"));
        assert!(!table.is_allowed_method(ip(addr), "DELETE"));
    }
}

#[test]
fn test_deny_rule_inverts_method_set() {
    let denied = ["GET", "PURGE"];
    let table = build("src_ip=172.16.0.0-172.16.255.255 action=ip_deny method=GET|PURGE\n");

    for addr in ["172.16.0.0", "172.16.40.7", "172.16.255.255"] {
        for method in WELL_KNOWN_METHODS {
            assert_eq!(
                table.is_allowed_method(ip(addr), method),
                !denied.contains(&method),
                "{addr} {method}"
            );
        }
    }
}

#[test]
fn test_allow_without_methods_permits_every_method() {
    let table = build("src_ip=fe80::-fe80::ffff action=ip_allow\n");
    for method in WELL_KNOWN_METHODS {
        assert!(table.is_allowed_method(ip("fe80::1"), method));
        assert!(table.is_allowed_method(ip("fe80::ffff"), method));
    }
}

#[test]
fn test_last_write_wins_on_overlap() {
    let table = build(
        "src_ip=1.0.0.0-1.0.0.255 action=ip_allow\n\
         src_ip=1.0.0.10 action=ip_deny method=GET\n",
    );

    assert!(!table.is_allowed_method(ip("1.0.0.10"), "GET"));
    assert!(table.is_allowed_method(ip("1.0.0.10"), "POST"));
    assert!(table.is_allowed_method(ip("1.0.0.20"), "GET"));
    assert_eq!(table.len(), 3);
}

#[test]
fn test_unmatched_address_is_denied() {
    let table = build(
        "src_ip=10.0.0.0-10.0.0.255 action=ip_allow\n\
         src_ip=2001:db8::1 action=ip_allow\n",
    );

    for method in WELL_KNOWN_METHODS {
        assert!(!table.is_allowed_method(ip("10.0.1.0"), method));
        assert!(!table.is_allowed_method(ip("9.255.255.255"), method));
        assert!(!table.is_allowed_method(ip("2001:db8::2"), method));
    }
}

#[test]
fn test_empty_and_rejected_configs_deny_everything() {
    let sink = Arc::new(CollectingSink::new());
    let texts = [
        "",
        "# only comments\n\n   \n",
        "src_ip=10.0.0.1\nsrc_ip=nope action=ip_allow\naction=ip_allow\n",
    ];

    for text in texts {
        let table = AclTable::builder(registry())
            .source("ip_allow.config")
            .sink(sink.clone())
            .build(text);
        assert!(table.is_empty());
        for method in WELL_KNOWN_METHODS {
            assert!(!table.is_allowed_method(ip("10.0.0.1"), method));
            assert!(!table.is_allowed_method(ip("::1"), method));
        }
    }

    // One empty-table warning per build; the rejected build alarms once.
    assert_eq!(sink.count(Severity::Warning), 3);
    assert_eq!(sink.count(Severity::Alarm), 1);
    assert_eq!(sink.count(Severity::Error), 2);
}

#[test]
fn test_reject_messages() {
    let sink = Arc::new(CollectingSink::new());
    let table = AclTable::builder(registry())
        .module_name("IpAllow")
        .source("/etc/r0n/ip_allow.config")
        .sink(sink.clone())
        .build("src_ip=127.0.0.1 action=ip_allow\nsrc_ip=10.0.0.1 method=GET\n");

    assert_eq!(table.len(), 1);
    let diagnostics = sink.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].severity, Severity::Alarm);
    assert_eq!(diagnostics[0].line, Some(2));
    assert_eq!(
        diagnostics[0].message,
        "IpAllow discarding /etc/r0n/ip_allow.config entry at line 2 : Invalid action/method specified"
    );
}

#[test]
fn test_rebuild_is_deterministic() {
    let first = build(SAMPLE);
    let second = build(SAMPLE);
    assert_eq!(first.describe(), second.describe());
    assert!(first.describe().starts_with("6 ACL entries."));
}

#[test]
fn test_single_address_range_is_exact() {
    let table = build("src_ip=192.0.2.33 action=ip_allow\nsrc_ip=2001:db8::33 action=ip_allow\n");

    assert!(table.is_allowed_method(ip("192.0.2.33"), "GET"));
    assert!(!table.is_allowed_method(ip("192.0.2.32"), "GET"));
    assert!(!table.is_allowed_method(ip("192.0.2.34"), "GET"));
    assert!(table.is_allowed_method(ip("2001:db8::33"), "GET"));
    assert!(!table.is_allowed_method(ip("2001:db8::32"), "GET"));
    assert!(!table.is_allowed_method(ip("2001:db8::34"), "GET"));
}

#[test]
fn test_v6_range_ending_in_mapped_block_is_accepted() {
    let sink = Arc::new(CollectingSink::new());
    let table = AclTable::builder(registry())
        .source("ip_allow.config")
        .sink(sink.clone())
        .build("src_ip=::-::ffff:255.255.255.255 action=ip_allow\n");

    assert_eq!(table.len(), 1);
    assert_eq!(table.report().accepted, 1);
    assert_eq!(sink.count(Severity::Alarm), 0);
    assert!(table.is_allowed_method(ip("::ffff:10.1.2.3"), "GET"));
    assert!(table.is_allowed_method(ip("::"), "GET"));
    assert!(!table.is_allowed_method(ip("10.1.2.3"), "GET"));
}

#[test]
fn test_describe_lists_every_v6_interval() {
    let table = build(
        "src_ip=::-ffff:: action=ip_allow\n\
         src_ip=::2-::fffe:ffff:ffff action=ip_deny\n",
    );
    let described = table.describe();
    let listed: Vec<&str> = described.lines().skip(1).collect();

    assert!(described.starts_with("3 ACL entries."));
    assert_eq!(listed.len(), 3);
    assert_eq!(table.entries().count(), table.len());
    assert!(listed[2].starts_with("  Line 1: ::ffff:0.0.0.0 - ffff:: method="));
}

#[test]
fn test_mapped_client_address_is_matched_as_v6() {
    let table = build("src_ip=::-ffff:: action=ip_allow\n");
    assert!(table.is_allowed_method(ip("::ffff:1.2.3.4"), "GET"));
    assert!(!table.is_allowed_method(ip("1.2.3.4"), "GET"));

    let table = build("src_ip=192.0.2.0-192.0.2.255 action=ip_allow\n");
    assert!(table.is_allowed_method(ip("192.0.2.7"), "GET"));
    assert!(!table.is_allowed_method(ip("::ffff:192.0.2.7"), "GET"));
}

#[test]
fn test_extended_registry() {
    let registry = Arc::new(
        MethodRegistry::standard()
            .extend(["PROPFIND", "MKCOL"])
            .unwrap(),
    );
    let table = AclTable::builder(Arc::clone(&registry))
        .build("src_ip=10.0.0.1 action=ip_deny method=propfind\n");

    assert!(!table.is_allowed_method(ip("10.0.0.1"), "PROPFIND"));
    assert!(table.is_allowed_method(ip("10.0.0.1"), "MKCOL"));

    let record = table.find(ip("10.0.0.1")).unwrap();
    let propfind = registry.index_of("PROPFIND").unwrap();
    assert_eq!(record.method_mask(), MethodMask::ALL & !propfind.mask());
}
