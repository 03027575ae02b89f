use std::collections::HashSet;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hostwall::kernel::{Netfilter, Transaction};
use hostwall::safety::SafetyRule;
use hostwall::{
    Action, ChainKind, Error, Firewall, MemoryKernel, Notifier, Protocol, Status, MAX_COMMENT_LEN,
};
use nix::errno::Errno;

mod lib;
use lib::*;

#[test]
fn ssh_is_allowed() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Arc::new(MemoryKernel::new());
    let firewall = start(&kernel, dir.path());

    let rule = firewall
        .add(request("input", "tcp", 22, "accept", "ssh"))
        .unwrap();
    assert_ne!(rule.handle, 0);
    assert_eq!(rule.chain, ChainKind::Input);
    assert_eq!(rule.protocol, Protocol::Tcp);
    assert_eq!(rule.port, 22);
    assert_eq!(rule.source_ip, None);
    assert_eq!(rule.action, Action::Accept);

    assert_eq!(firewall.list().unwrap(), vec![rule]);
    assert_eq!(
        firewall.status(),
        Status {
            enabled: true,
            rule_count: 1,
            table: TABLE_NAME.to_string(),
        }
    );
}

#[test]
fn port_requires_a_protocol() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Arc::new(MemoryKernel::new());
    let firewall = start(&kernel, dir.path());
    let commits = kernel.commit_count();

    for port in &[1, 22, 443, 8080, 65535] {
        for chain in &["input", "forward", "output"] {
            match firewall.add(request(chain, "", *port, "accept", "")) {
                Err(Error::BadRequest(_)) => {}
                other => panic!("port {} without protocol: {:?}", port, other),
            }
        }
    }
    assert!(firewall.list().unwrap().is_empty());
    assert_eq!(kernel.commit_count(), commits);
}

#[test]
fn invalid_requests_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Arc::new(MemoryKernel::new());
    let firewall = start(&kernel, dir.path());

    let mut bad_ip = request("input", "", 0, "drop", "");
    bad_ip.source_ip = "300.1.1.1".to_string();
    for req in vec![
        request("prerouting", "tcp", 22, "accept", ""),
        request("input", "sctp", 22, "accept", ""),
        request("input", "tcp", 22, "reject", ""),
        bad_ip,
        request("input", "tcp", 22, "accept", &"x".repeat(300)),
        request("input", "tcp", 22, "accept", "dns\0server"),
    ] {
        assert!(matches!(firewall.add(req), Err(Error::BadRequest(_))));
    }
    assert!(firewall.list().unwrap().is_empty());
}

#[test]
fn comments_are_kept_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Arc::new(MemoryKernel::new());
    let firewall = start(&kernel, dir.path());

    let longest = format!("{}é", "x".repeat(MAX_COMMENT_LEN - 2));
    assert_eq!(longest.len(), MAX_COMMENT_LEN);
    let rule = firewall
        .add(request("input", "tcp", 22, "accept", &longest))
        .unwrap();
    assert_eq!(rule.comment, longest);

    let listed = firewall.list().unwrap();
    assert_eq!(listed, vec![rule]);
    assert_eq!(firewall.mirror().load().unwrap(), Some(listed));
}

#[test]
fn failed_mirror_write_keeps_the_change() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Arc::new(MemoryKernel::new());
    let (tx, rx) = mpsc::channel();
    let notifier = Notifier::new(4, move |rules| {
        let _ = tx.send(rules.to_vec());
    });
    let firewall = start_with_notifier(&kernel, dir.path(), notifier);
    // the mirror cannot be replaced by a file anymore
    std::fs::create_dir(firewall.mirror().path()).unwrap();

    let ssh = firewall
        .add(request("input", "tcp", 22, "accept", "ssh"))
        .unwrap();
    assert_eq!(firewall.list().unwrap(), vec![ssh]);
    assert_eq!(kernel_rules(&kernel, "input").len(), 3);
    assert!(firewall.mirror().path().is_dir());
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn rules_are_listed_chain_after_chain() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Arc::new(MemoryKernel::new());
    let firewall = start(&kernel, dir.path());

    firewall
        .add(request("output", "udp", 53, "accept", "dns"))
        .unwrap();
    let mut blocked = request("input", "", 0, "drop", "blocked host");
    blocked.source_ip = "203.0.113.7".to_string();
    let blocked = firewall.add(blocked).unwrap();
    firewall
        .add(request("forward", "", 0, "drop", "no routing"))
        .unwrap();
    firewall
        .add(request("input", "tcp", 443, "accept", "https"))
        .unwrap();

    let rules = firewall.list().unwrap();
    assert_eq!(
        comments(&rules),
        ["blocked host", "https", "no routing", "dns"]
    );
    assert_eq!(rules[0], blocked);
    assert_eq!(rules[0].source_ip, Some("203.0.113.7".parse().unwrap()));
}

#[test]
fn identical_rules_get_their_own_handle() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Arc::new(MemoryKernel::new());
    let firewall = start(&kernel, dir.path());

    let first = firewall
        .add(request("input", "tcp", 80, "drop", "first"))
        .unwrap();
    let second = firewall
        .add(request("input", "tcp", 80, "drop", "second"))
        .unwrap();
    assert_ne!(first.handle, second.handle);
    assert_eq!(comments(&firewall.list().unwrap()), ["first", "second"]);
}

#[test]
fn safety_rules_are_in_place_and_hidden() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Arc::new(MemoryKernel::new());
    let firewall = start(&kernel, dir.path());
    firewall
        .add(request("input", "tcp", 22, "accept", "ssh"))
        .unwrap();

    let rules = kernel_rules(&kernel, "input");
    assert_eq!(rules.len(), 3);
    let safety = safety_rules(&kernel);
    assert_eq!(
        safety.iter().map(|s| s.1).collect::<Vec<_>>(),
        [SafetyRule::Loopback, SafetyRule::Established]
    );
    assert_eq!(rules[0].get_handle(), Some(&safety[0].0));
    assert_eq!(rules[1].get_handle(), Some(&safety[1].0));

    let listed = firewall.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert!(safety.iter().all(|(h, _)| listed[0].handle != *h));
}

#[test]
fn safety_rules_cannot_be_touched() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Arc::new(MemoryKernel::new());
    let firewall = start(&kernel, dir.path());
    let ssh = firewall
        .add(request("input", "tcp", 22, "accept", "ssh"))
        .unwrap();

    for (handle, _) in safety_rules(&kernel) {
        assert!(matches!(
            firewall.delete(handle),
            Err(Error::Forbidden(h)) if h == handle
        ));
        assert!(matches!(
            firewall.reorder("input", &[handle, ssh.handle]),
            Err(Error::BadRequest(_))
        ));
    }
    assert_eq!(safety_rules(&kernel).len(), 2);
    assert_eq!(firewall.list().unwrap(), vec![ssh]);
}

#[test]
fn delete_rule() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Arc::new(MemoryKernel::new());
    let firewall = start(&kernel, dir.path());
    let a = firewall.add(request("input", "tcp", 22, "accept", "a")).unwrap();
    let b = firewall.add(request("output", "udp", 53, "accept", "b")).unwrap();

    firewall.delete(a.handle).unwrap();
    assert_eq!(firewall.list().unwrap(), vec![b.clone()]);
    assert_eq!(firewall.mirror().load().unwrap(), Some(vec![b]));

    assert!(matches!(
        firewall.delete(a.handle),
        Err(Error::NotFound(h)) if h == a.handle
    ));
    assert!(matches!(firewall.delete(0xdead), Err(Error::NotFound(_))));
}

#[test]
fn reorder_rules() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Arc::new(MemoryKernel::new());
    let firewall = start(&kernel, dir.path());
    let a = firewall.add(request("input", "tcp", 22, "accept", "a")).unwrap();
    let b = firewall.add(request("input", "tcp", 80, "accept", "b")).unwrap();
    let c = firewall.add(request("input", "tcp", 443, "accept", "c")).unwrap();
    let other = firewall
        .add(request("output", "udp", 53, "accept", "other"))
        .unwrap();

    let reordered = firewall
        .reorder("input", &[c.handle, a.handle, b.handle])
        .unwrap();
    assert_eq!(comments(&reordered), ["c", "a", "b"]);

    let listed = firewall.list().unwrap();
    assert_eq!(comments(&listed), ["c", "a", "b", "other"]);
    assert_eq!(&listed[..3], reordered.as_slice());
    // other chains keep their handles
    assert_eq!(listed[3], other);
    assert_eq!(firewall.mirror().load().unwrap(), Some(listed));

    // the safety rules stay on top
    let kernel_input = kernel_rules(&kernel, "input");
    let safety = safety_rules(&kernel);
    assert_eq!(kernel_input[0].get_handle(), Some(&safety[0].0));
    assert_eq!(kernel_input[1].get_handle(), Some(&safety[1].0));
}

#[test]
fn reorder_requires_a_permutation() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Arc::new(MemoryKernel::new());
    let firewall = start(&kernel, dir.path());
    let a = firewall.add(request("input", "tcp", 22, "accept", "a")).unwrap();
    let b = firewall.add(request("input", "tcp", 80, "accept", "b")).unwrap();
    let out = firewall
        .add(request("output", "udp", 53, "accept", "out"))
        .unwrap();
    let before = firewall.list().unwrap();

    for handles in vec![
        vec![a.handle],
        vec![a.handle, a.handle],
        vec![a.handle, b.handle, b.handle],
        vec![a.handle, b.handle, 0xdead],
        vec![a.handle, out.handle],
    ] {
        assert!(
            matches!(
                firewall.reorder("input", &handles),
                Err(Error::BadRequest(_))
            ),
            "{:?} accepted",
            handles
        );
    }
    assert!(matches!(
        firewall.reorder("prerouting", &[a.handle, b.handle]),
        Err(Error::BadRequest(_))
    ));
    assert_eq!(firewall.list().unwrap(), before);
}

#[test]
fn reorder_empty_chain() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Arc::new(MemoryKernel::new());
    let firewall = start(&kernel, dir.path());
    assert!(firewall.reorder("forward", &[]).unwrap().is_empty());
}

#[test]
fn failed_commit_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Arc::new(MemoryKernel::new());
    let firewall = start(&kernel, dir.path());
    let a = firewall.add(request("input", "tcp", 22, "accept", "a")).unwrap();
    let mirror = std::fs::read(firewall.mirror().path()).unwrap();

    kernel.fail_next_commit(Errno::EPERM);
    assert!(matches!(
        firewall.add(request("input", "tcp", 80, "accept", "b")),
        Err(Error::Internal(_))
    ));
    kernel.fail_next_commit(Errno::EPERM);
    assert!(matches!(firewall.delete(a.handle), Err(Error::Internal(_))));

    assert_eq!(firewall.list().unwrap(), vec![a]);
    assert_eq!(std::fs::read(firewall.mirror().path()).unwrap(), mirror);
}

#[test]
fn foreign_rules_are_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Arc::new(MemoryKernel::new());
    let firewall = start(&kernel, dir.path());
    let a = firewall.add(request("input", "tcp", 22, "accept", "a")).unwrap();
    let b = firewall.add(request("input", "tcp", 80, "accept", "b")).unwrap();

    // a rule added by another tool, without verdict
    let foreign = hostwall::Rule::new(&kernel_chain("input"))
        .unwrap()
        .with_expr(hostwall::expr::Counter::new())
        .with_comment("someone else");
    kernel.commit(Transaction::new().with_add(foreign)).unwrap();

    assert_eq!(firewall.list().unwrap(), vec![a.clone(), b.clone()]);
    assert_eq!(firewall.status().rule_count, 2);

    firewall.reorder("input", &[b.handle, a.handle]).unwrap();
    let kernel_input = kernel_rules(&kernel, "input");
    assert_eq!(kernel_input.len(), 5);
    assert!(kernel_input
        .iter()
        .any(|r| r.get_comment().as_deref() == Some("someone else")));
}

#[test]
fn concurrent_adds() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Arc::new(MemoryKernel::new());
    let firewall = Arc::new(start(&kernel, dir.path()));

    let workers: Vec<_> = (0..8u16)
        .map(|i| {
            let firewall = firewall.clone();
            thread::spawn(move || {
                (0..4u16)
                    .map(|j| {
                        let port = 1000 + i * 10 + j;
                        firewall
                            .add(request("input", "tcp", port, "accept", &port.to_string()))
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let added: Vec<_> = workers
        .into_iter()
        .flat_map(|w| w.join().unwrap())
        .collect();

    let handles: HashSet<u64> = added.iter().map(|r| r.handle).collect();
    assert_eq!(handles.len(), 32);

    let listed = firewall.list().unwrap();
    assert_eq!(listed.len(), 32);
    for rule in &added {
        assert!(listed.contains(rule), "{:?} is missing", rule);
    }
    assert_eq!(firewall.mirror().load().unwrap(), Some(listed));
    assert_eq!(safety_rules(&kernel).len(), 2);
}

#[test]
fn disabled_engine() {
    let dir = tempfile::tempdir().unwrap();
    let firewall: Firewall<MemoryKernel> = Firewall::disabled(config(dir.path()), Notifier::none());

    assert!(!firewall.is_enabled());
    assert_eq!(
        firewall.status(),
        Status {
            enabled: false,
            rule_count: 0,
            table: TABLE_NAME.to_string(),
        }
    );
    assert!(matches!(firewall.list(), Err(Error::KernelUnavailable)));
    assert!(matches!(
        firewall.add(request("input", "tcp", 22, "accept", "")),
        Err(Error::KernelUnavailable)
    ));
    assert!(matches!(firewall.delete(1), Err(Error::KernelUnavailable)));
    assert!(matches!(
        firewall.reorder("input", &[]),
        Err(Error::KernelUnavailable)
    ));
    assert!(matches!(firewall.recover(), Err(Error::KernelUnavailable)));
}

#[test]
fn changes_are_notified() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Arc::new(MemoryKernel::new());
    let (tx, rx) = mpsc::channel();
    let notifier = Notifier::new(4, move |rules| {
        let _ = tx.send(rules.to_vec());
    });
    let firewall = start_with_notifier(&kernel, dir.path(), notifier);

    let ssh = firewall
        .add(request("input", "tcp", 22, "accept", "ssh"))
        .unwrap();
    let notified = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(notified, vec![ssh.clone()]);

    firewall.delete(ssh.handle).unwrap();
    let notified = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(notified.is_empty());
}
