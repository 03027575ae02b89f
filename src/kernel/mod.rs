//! The seam between the firewall engine and netfilter.
//!
//! The engine never talks to a socket directly: it goes through a [`Netfilter`] implementation
//! it owns. [`NetlinkKernel`] is the real kernel, [`memory::MemoryKernel`] an in-process
//! simulation speaking the same wire format.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, QueryError};
use crate::query::{list_objects_with_data, send_batch};
use crate::sys::{NFT_MSG_GETCHAIN, NFT_MSG_GETRULE, NFT_MSG_GETTABLE};
use crate::{Batch, Chain, MsgType, Rule, Table};

pub mod memory;

/// An nf_tables object that can be part of a [`Transaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelObject {
    Table(Table),
    Chain(Chain),
    Rule(Rule),
}

impl From<Table> for KernelObject {
    fn from(t: Table) -> Self {
        KernelObject::Table(t)
    }
}

impl From<Chain> for KernelObject {
    fn from(c: Chain) -> Self {
        KernelObject::Chain(c)
    }
}

impl From<Rule> for KernelObject {
    fn from(r: Rule) -> Self {
        KernelObject::Rule(r)
    }
}

/// An ordered list of additions and deletions, committed all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    ops: Vec<(MsgType, KernelObject)>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, obj: impl Into<KernelObject>) {
        self.ops.push((MsgType::Add, obj.into()));
    }

    pub fn delete(&mut self, obj: impl Into<KernelObject>) {
        self.ops.push((MsgType::Del, obj.into()));
    }

    pub fn with_add(mut self, obj: impl Into<KernelObject>) -> Self {
        self.add(obj);
        self
    }

    pub fn with_delete(mut self, obj: impl Into<KernelObject>) -> Self {
        self.delete(obj);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(MsgType, KernelObject)> {
        self.ops.iter()
    }

    /// Serializes the transaction into a netlink batch.
    pub fn to_batch(&self) -> Batch {
        let mut batch = Batch::new();
        for (msg_type, obj) in &self.ops {
            match obj {
                KernelObject::Table(t) => batch.add(t, *msg_type),
                KernelObject::Chain(c) => batch.add(c, *msg_type),
                KernelObject::Rule(r) => batch.add(r, *msg_type),
            }
        }
        batch
    }
}

/// Transactional access to the nf_tables state.
pub trait Netfilter: Send + Sync {
    fn list_tables(&self) -> Result<Vec<Table>, QueryError>;

    /// Lists the chains of `table`.
    fn list_chains(&self, table: &Table) -> Result<Vec<Chain>, QueryError>;

    /// Lists the rules of `chain`, in evaluation order.
    fn list_rules(&self, chain: &Chain) -> Result<Vec<Rule>, QueryError>;

    /// Applies every operation of `transaction`, or none of them.
    fn commit(&self, transaction: Transaction) -> Result<(), QueryError>;
}

impl<T: Netfilter + ?Sized> Netfilter for Arc<T> {
    fn list_tables(&self) -> Result<Vec<Table>, QueryError> {
        (**self).list_tables()
    }

    fn list_chains(&self, table: &Table) -> Result<Vec<Chain>, QueryError> {
        (**self).list_chains(table)
    }

    fn list_rules(&self, chain: &Chain) -> Result<Vec<Rule>, QueryError> {
        (**self).list_rules(chain)
    }

    fn commit(&self, transaction: Transaction) -> Result<(), QueryError> {
        (**self).commit(transaction)
    }
}

/// The in-kernel netfilter, reached over `NETLINK_NETFILTER`.
#[derive(Debug, Clone)]
pub struct NetlinkKernel {
    timeout: Option<Duration>,
}

impl NetlinkKernel {
    /// Checks that netfilter answers (the process has `CAP_NET_ADMIN` and the kernel has
    /// nf_tables) before handing out the channel.
    pub fn open(timeout: Option<Duration>) -> Result<Self, Error> {
        let kernel = NetlinkKernel { timeout };
        match kernel.list_tables() {
            Ok(tables) => {
                debug!("netfilter reachable, {} tables present", tables.len());
                Ok(kernel)
            }
            Err(e) => {
                warn!("netfilter is not reachable: {}", e);
                Err(Error::KernelUnavailable)
            }
        }
    }
}

impl Netfilter for NetlinkKernel {
    fn list_tables(&self) -> Result<Vec<Table>, QueryError> {
        list_objects_with_data::<Table>(NFT_MSG_GETTABLE, None, self.timeout)
    }

    fn list_chains(&self, table: &Table) -> Result<Vec<Chain>, QueryError> {
        let filter = Chain::new(table);
        let chains = list_objects_with_data(NFT_MSG_GETCHAIN, Some(&filter), self.timeout)?;
        // chain dumps are only filtered by family on the kernel side
        Ok(chains
            .into_iter()
            .filter(|c: &Chain| c.get_table() == table.get_name())
            .collect())
    }

    fn list_rules(&self, chain: &Chain) -> Result<Vec<Rule>, QueryError> {
        let filter = Rule::new(chain)?;
        let rules = list_objects_with_data(NFT_MSG_GETRULE, Some(&filter), self.timeout)?;
        Ok(rules
            .into_iter()
            .filter(|r: &Rule| {
                r.get_table() == chain.get_table() && r.get_chain() == chain.get_name()
            })
            .collect())
    }

    fn commit(&self, transaction: Transaction) -> Result<(), QueryError> {
        if transaction.is_empty() {
            return Ok(());
        }
        debug!("Committing a transaction of {} operations", transaction.len());
        send_batch(transaction.to_batch(), self.timeout)
    }
}
