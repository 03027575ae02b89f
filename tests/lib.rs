#![allow(dead_code)]
use std::path::Path;
use std::sync::Arc;

use hostwall::kernel::Netfilter;
use hostwall::safety::{classify, SafetyRule};
use hostwall::{
    Chain, Config, CreateRuleRequest, Firewall, MemoryKernel, Notifier, ProtocolFamily, Rule,
    Table,
};

pub const TABLE_NAME: &str = "hostwall";

pub type TestFirewall = Firewall<Arc<MemoryKernel>>;

pub fn config(data_dir: &Path) -> Config {
    Config {
        data_dir: data_dir.to_path_buf(),
        ..Config::default()
    }
}

pub fn start(kernel: &Arc<MemoryKernel>, data_dir: &Path) -> TestFirewall {
    start_with_notifier(kernel, data_dir, Notifier::none())
}

pub fn start_with_notifier(
    kernel: &Arc<MemoryKernel>,
    data_dir: &Path,
    notifier: Notifier,
) -> TestFirewall {
    Firewall::with_kernel(kernel.clone(), config(data_dir), notifier)
        .expect("Couldn't start the firewall")
}

pub fn request(
    chain: &str,
    protocol: &str,
    port: u16,
    action: &str,
    comment: &str,
) -> CreateRuleRequest {
    CreateRuleRequest {
        chain: chain.to_string(),
        protocol: protocol.to_string(),
        port,
        source_ip: String::new(),
        action: action.to_string(),
        comment: comment.to_string(),
    }
}

pub fn kernel_table() -> Table {
    Table::new(ProtocolFamily::Ipv4).with_name(TABLE_NAME)
}

pub fn kernel_chain(name: &str) -> Chain {
    Chain::new(&kernel_table()).with_name(name)
}

pub fn kernel_chains(kernel: &MemoryKernel) -> Vec<Chain> {
    kernel.list_chains(&kernel_table()).unwrap()
}

/// The rules of a chain as the kernel holds them, safety rules and foreign rules included.
pub fn kernel_rules(kernel: &MemoryKernel, chain: &str) -> Vec<Rule> {
    kernel.list_rules(&kernel_chain(chain)).unwrap()
}

pub fn safety_rules(kernel: &MemoryKernel) -> Vec<(u64, SafetyRule)> {
    kernel_rules(kernel, "input")
        .iter()
        .filter_map(|r| Some((*r.get_handle()?, classify(r.iter_expressions())?)))
        .collect()
}

pub fn comments(rules: &[hostwall::FirewallRule]) -> Vec<&str> {
    rules.iter().map(|r| r.comment.as_str()).collect()
}
