//! The table and the three base chains the engine works in.

use crate::error::Error;
use crate::kernel::{Netfilter, Transaction};
use crate::model::ChainKind;
use crate::sys::NF_IP_PRI_FILTER;
use crate::{Chain, ChainPolicy, ChainType, Hook, ProtocolFamily, Table};

/// The kernel objects the engine is attached to, as the kernel reported them (handles included).
#[derive(Debug, Clone)]
pub struct Topology {
    table: Table,
    input: Chain,
    forward: Chain,
    output: Chain,
}

impl Topology {
    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn chain(&self, kind: ChainKind) -> &Chain {
        match kind {
            ChainKind::Input => &self.input,
            ChainKind::Forward => &self.forward,
            ChainKind::Output => &self.output,
        }
    }

    /// The managed chains, in `input`, `forward`, `output` order.
    pub fn chains(&self) -> impl Iterator<Item = (ChainKind, &Chain)> {
        ChainKind::ALL.iter().map(move |k| (*k, self.chain(*k)))
    }
}

/// The base chain `kind` of `table`, as the engine creates it.
pub fn base_chain(table: &Table, kind: ChainKind) -> Chain {
    Chain::new(table)
        .with_name(kind.name())
        .with_hook(Hook::new(kind.hook(), NF_IP_PRI_FILTER))
        .with_type(ChainType::Filter)
        .with_policy(ChainPolicy::Accept)
}

/// Creates whatever is missing of the table and its chains, in a single transaction, then
/// attaches to them.
///
/// Existing chains are reused. A chain found with a drop policy is switched back to accept:
/// the engine only filters with explicit rules. A chain with the right name but without the
/// right hook is never taken over and the engine does not attach.
pub fn bootstrap(kernel: &dyn Netfilter, table_name: &str) -> Result<Topology, Error> {
    let table = Table::new(ProtocolFamily::Ipv4).with_name(table_name);
    attach(kernel, &table).map_err(|e| {
        warn!("Could not attach to the table '{}': {}", table_name, e);
        Error::KernelUnavailable
    })
}

fn attach(kernel: &dyn Netfilter, table: &Table) -> Result<Topology, Error> {
    let mut tx = Transaction::new();

    let existing_table = kernel.list_tables()?.into_iter().find(|t| t.is_same(table));
    if existing_table.is_none() {
        info!("Creating the table '{}'", table_name(table));
        tx.add(table.clone());
    }

    let chains = match existing_table {
        Some(ref t) => kernel.list_chains(t)?,
        None => Vec::new(),
    };
    for kind in ChainKind::ALL.iter() {
        let wanted = base_chain(table, *kind);
        match chains.iter().find(|c| c.is_same(&wanted)) {
            None => {
                info!("Creating the chain '{}'", kind);
                tx.add(wanted);
            }
            Some(c) if c.get_hook().and_then(|h| h.get_class()) != Some(&kind.hook()) => {
                error!(
                    "The chain '{}' exists but is not a base chain on the {} hook",
                    kind,
                    kind.name()
                );
                return Err(Error::Internal(format!(
                    "the chain '{}' is not hooked where expected",
                    kind
                )));
            }
            Some(c) if c.get_policy() != Some(&ChainPolicy::Accept) => {
                warn!("The chain '{}' does not accept by default, resetting its policy", kind);
                tx.add(
                    Chain::new(table)
                        .with_name(kind.name())
                        .with_policy(ChainPolicy::Accept),
                );
            }
            Some(_) => debug!("Reusing the chain '{}'", kind),
        }
    }

    if !tx.is_empty() {
        kernel.commit(tx)?;
    }

    let table = kernel
        .list_tables()?
        .into_iter()
        .find(|t| t.is_same(table))
        .ok_or_else(|| Error::Internal("the table vanished after its creation".to_string()))?;
    let chains = kernel.list_chains(&table)?;
    let find = |kind: ChainKind| {
        chains
            .iter()
            .find(|c| c.get_name().map(String::as_str) == Some(kind.name()))
            .cloned()
            .ok_or_else(|| {
                Error::Internal(format!("the chain '{}' vanished after its creation", kind))
            })
    };

    Ok(Topology {
        input: find(ChainKind::Input)?,
        forward: find(ChainKind::Forward)?,
        output: find(ChainKind::Output)?,
        table,
    })
}

fn table_name(table: &Table) -> &str {
    table.get_name().map(String::as_str).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HookClass, MemoryKernel};

    #[test]
    fn bootstrap_creates_then_reuses() {
        let kernel = MemoryKernel::new();
        let topology = bootstrap(&kernel, "hostwall").unwrap();
        assert_eq!(kernel.commit_count(), 1);
        assert!(topology.table().get_handle().is_some());
        for (kind, chain) in topology.chains() {
            assert_eq!(chain.get_name().map(String::as_str), Some(kind.name()));
            assert_eq!(chain.get_policy(), Some(&ChainPolicy::Accept));
            assert_eq!(
                chain.get_hook().and_then(|h| h.get_class()),
                Some(&kind.hook())
            );
            assert!(chain.get_handle().is_some());
        }

        let again = bootstrap(&kernel, "hostwall").unwrap();
        assert_eq!(kernel.commit_count(), 1);
        assert_eq!(
            again.chain(ChainKind::Forward).get_handle(),
            topology.chain(ChainKind::Forward).get_handle()
        );
    }

    #[test]
    fn missing_chain_is_recreated() {
        let kernel = MemoryKernel::new();
        let topology = bootstrap(&kernel, "hostwall").unwrap();
        kernel
            .commit(Transaction::new().with_delete(topology.chain(ChainKind::Output).clone()))
            .unwrap();

        let again = bootstrap(&kernel, "hostwall").unwrap();
        assert_eq!(
            again.chain(ChainKind::Input).get_handle(),
            topology.chain(ChainKind::Input).get_handle()
        );
        assert_ne!(
            again.chain(ChainKind::Output).get_handle(),
            topology.chain(ChainKind::Output).get_handle()
        );
    }

    #[test]
    fn misplaced_chains_are_not_taken_over() {
        let table = Table::new(ProtocolFamily::Ipv4).with_name("hostwall");
        let regular = Chain::new(&table).with_name("forward");
        let wrong_hook = Chain::new(&table)
            .with_name("output")
            .with_hook(Hook::new(HookClass::In, NF_IP_PRI_FILTER))
            .with_type(ChainType::Filter)
            .with_policy(ChainPolicy::Accept);

        for chain in vec![regular, wrong_hook] {
            let kernel = MemoryKernel::new();
            kernel
                .commit(Transaction::new().with_add(table.clone()).with_add(chain))
                .unwrap();
            assert!(matches!(
                bootstrap(&kernel, "hostwall"),
                Err(Error::KernelUnavailable)
            ));
            assert_eq!(kernel.commit_count(), 1);
        }
    }

    #[test]
    fn drop_policy_is_reset() {
        let kernel = MemoryKernel::new();
        let topology = bootstrap(&kernel, "hostwall").unwrap();
        kernel
            .commit(
                Transaction::new().with_add(
                    Chain::new(topology.table())
                        .with_name("forward")
                        .with_policy(ChainPolicy::Drop),
                ),
            )
            .unwrap();

        let again = bootstrap(&kernel, "hostwall").unwrap();
        assert_eq!(
            again.chain(ChainKind::Forward).get_policy(),
            Some(&ChainPolicy::Accept)
        );
    }
}
