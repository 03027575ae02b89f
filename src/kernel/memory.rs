use std::sync::Mutex;

use nix::errno::Errno;

use super::{Netfilter, Transaction};
use crate::error::QueryError;
use crate::nlmsg::{
    pad_netlink_object_with_variable_size, NfNetlinkDeserializable, NfNetlinkObject, NfNetlinkWriter,
};
use crate::parser::{get_operation_from_nlmsghdr_type, parse_nlmsg, NlMsg};
use crate::sys::{
    NFT_MSG_DELCHAIN, NFT_MSG_DELRULE, NFT_MSG_DELTABLE, NFT_MSG_NEWCHAIN, NFT_MSG_NEWRULE,
    NFT_MSG_NEWTABLE, NFNL_MSG_BATCH_BEGIN, NFNL_MSG_BATCH_END, NLM_F_APPEND,
};
use crate::{Chain, MsgType, Rule, Table};

#[derive(Debug, Clone)]
struct ChainState {
    chain: Chain,
    rules: Vec<Rule>,
}

#[derive(Debug, Clone)]
struct TableState {
    table: Table,
    chains: Vec<ChainState>,
    // handles of chains and rules are allocated per table, like the kernel does
    next_handle: u64,
}

#[derive(Debug, Clone, Default)]
struct State {
    tables: Vec<TableState>,
    next_table_handle: u64,
}

#[derive(Debug, Default)]
struct Inner {
    state: State,
    fail_next_commit: Option<Errno>,
    commits: usize,
}

/// An in-memory netfilter.
///
/// Transactions go through the same netlink encoding as for the real kernel: they are turned
/// into a batch, which is decoded back message by message before being applied. Dumped objects
/// are re-encoded and decoded too, so what the engine sees went through the wire format in both
/// directions.
#[derive(Debug, Default)]
pub struct MemoryKernel {
    inner: Mutex<Inner>,
}

impl MemoryKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next commit fail with `errno`, leaving the state untouched.
    pub fn fail_next_commit(&self, errno: Errno) {
        self.lock().fail_next_commit = Some(errno);
    }

    /// Number of transactions successfully applied so far.
    pub fn commit_count(&self) -> usize {
        self.lock().commits
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // the state is only replaced once a transaction fully succeeded, a panic while holding
        // the lock cannot leave it half-updated
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Netfilter for MemoryKernel {
    fn list_tables(&self) -> Result<Vec<Table>, QueryError> {
        let inner = self.lock();
        inner
            .state
            .tables
            .iter()
            .map(|t| reencode(&t.table))
            .collect()
    }

    fn list_chains(&self, table: &Table) -> Result<Vec<Chain>, QueryError> {
        let inner = self.lock();
        // like a kernel dump, an unknown table simply has no chains
        let table = match find_table(&inner.state, table) {
            Ok(t) => t,
            Err(_) => return Ok(Vec::new()),
        };
        inner.state.tables[table]
            .chains
            .iter()
            .map(|c| reencode(&c.chain))
            .collect()
    }

    fn list_rules(&self, chain: &Chain) -> Result<Vec<Rule>, QueryError> {
        let inner = self.lock();
        let (table, chain) = match find_chain(&inner.state, chain) {
            Ok(found) => found,
            Err(_) => return Ok(Vec::new()),
        };
        inner.state.tables[table].chains[chain]
            .rules
            .iter()
            .map(reencode)
            .collect()
    }

    fn commit(&self, transaction: Transaction) -> Result<(), QueryError> {
        let mut inner = self.lock();
        if let Some(errno) = inner.fail_next_commit.take() {
            debug!("Injected commit failure: {}", errno);
            return Err(QueryError::NetlinkError(errno));
        }

        let buf = transaction.to_batch().finalize();
        let mut state = inner.state.clone();
        apply_batch(&mut state, &buf)?;

        inner.state = state;
        inner.commits += 1;
        Ok(())
    }
}

fn reencode<T: NfNetlinkObject>(obj: &T) -> Result<T, QueryError> {
    let mut buf = Vec::new();
    let mut writer = NfNetlinkWriter::new(&mut buf);
    obj.add_or_remove(&mut writer, MsgType::Add, 0);
    Ok(T::deserialize(&buf)?.0)
}

fn find_table(state: &State, table: &Table) -> Result<usize, QueryError> {
    state
        .tables
        .iter()
        .position(|t| t.table.is_same(table))
        .ok_or(QueryError::NetlinkError(Errno::ENOENT))
}

fn find_chain(state: &State, chain: &Chain) -> Result<(usize, usize), QueryError> {
    let mut table = Table::new(chain.get_family());
    if let Some(name) = chain.get_table() {
        table.set_name(name.as_str());
    }
    let t = find_table(state, &table)?;
    let c = state.tables[t]
        .chains
        .iter()
        .position(|c| c.chain.is_same(chain))
        .ok_or(QueryError::NetlinkError(Errno::ENOENT))?;
    Ok((t, c))
}

fn chain_of_rule(rule: &Rule) -> Chain {
    let mut chain = Chain::default();
    chain.set_family(rule.get_family());
    if let Some(table) = rule.get_table() {
        chain.set_table(table.as_str());
    }
    if let Some(name) = rule.get_chain() {
        chain.set_name(name.as_str());
    }
    chain
}

fn apply_batch(state: &mut State, mut buf: &[u8]) -> Result<(), QueryError> {
    while !buf.is_empty() {
        let (hdr, msg) = parse_nlmsg(buf)?;
        let msg_len = hdr.nlmsg_len as usize;
        let is_batch_delimiter =
            hdr.nlmsg_type == NFNL_MSG_BATCH_BEGIN || hdr.nlmsg_type == NFNL_MSG_BATCH_END;
        if !is_batch_delimiter && matches!(msg, NlMsg::NfGenMsg(_, _)) {
            let msg_buf = &buf[..msg_len];
            match get_operation_from_nlmsghdr_type(hdr.nlmsg_type) as u16 {
                NFT_MSG_NEWTABLE => new_table(state, Table::deserialize(msg_buf)?.0),
                NFT_MSG_DELTABLE => del_table(state, &Table::deserialize(msg_buf)?.0)?,
                NFT_MSG_NEWCHAIN => new_chain(state, Chain::deserialize(msg_buf)?.0)?,
                NFT_MSG_DELCHAIN => del_chain(state, &Chain::deserialize(msg_buf)?.0)?,
                NFT_MSG_NEWRULE => {
                    let append = hdr.nlmsg_flags & NLM_F_APPEND != 0;
                    new_rule(state, Rule::deserialize(msg_buf)?.0, append)?
                }
                NFT_MSG_DELRULE => del_rule(state, &Rule::deserialize(msg_buf)?.0)?,
                _ => return Err(QueryError::NetlinkError(Errno::EOPNOTSUPP)),
            }
        }
        let next = pad_netlink_object_with_variable_size(msg_len).min(buf.len());
        buf = &buf[next..];
    }
    Ok(())
}

fn new_table(state: &mut State, table: Table) {
    if state.tables.iter().any(|t| t.table.is_same(&table)) {
        return;
    }
    state.next_table_handle += 1;
    let table = table.with_handle(state.next_table_handle);
    state.tables.push(TableState {
        table,
        chains: Vec::new(),
        next_handle: 1,
    });
}

fn del_table(state: &mut State, table: &Table) -> Result<(), QueryError> {
    let t = find_table(state, table)?;
    state.tables.remove(t);
    Ok(())
}

fn new_chain(state: &mut State, chain: Chain) -> Result<(), QueryError> {
    let mut table = Table::new(chain.get_family());
    table.set_name(
        chain
            .get_table()
            .ok_or(QueryError::NetlinkError(Errno::EINVAL))?
            .as_str(),
    );
    if chain.get_name().is_none() {
        return Err(QueryError::NetlinkError(Errno::EINVAL));
    }
    let t = find_table(state, &table)?;
    let table = &mut state.tables[t];
    if let Some(existing) = table.chains.iter_mut().find(|c| c.chain.is_same(&chain)) {
        // an existing chain only gets its policy updated, and only base chains have one
        if let Some(policy) = chain.get_policy() {
            if existing.chain.get_hook().is_none() {
                return Err(QueryError::NetlinkError(Errno::EOPNOTSUPP));
            }
            existing.chain.set_policy(*policy);
        }
        return Ok(());
    }
    let handle = table.next_handle;
    table.next_handle += 1;
    table.chains.push(ChainState {
        chain: chain.with_handle(handle),
        rules: Vec::new(),
    });
    Ok(())
}

fn del_chain(state: &mut State, chain: &Chain) -> Result<(), QueryError> {
    let (t, c) = find_chain(state, chain)?;
    if !state.tables[t].chains[c].rules.is_empty() {
        return Err(QueryError::NetlinkError(Errno::EBUSY));
    }
    state.tables[t].chains.remove(c);
    Ok(())
}

fn new_rule(state: &mut State, rule: Rule, append: bool) -> Result<(), QueryError> {
    let (t, c) = find_chain(state, &chain_of_rule(&rule))?;
    let table = &mut state.tables[t];
    let handle = table.next_handle;
    let rules = &mut table.chains[c].rules;

    let index = match rule.get_position() {
        Some(position) => {
            let i = rules
                .iter()
                .position(|r| r.get_handle() == Some(position))
                .ok_or(QueryError::NetlinkError(Errno::ENOENT))?;
            if append {
                i + 1
            } else {
                i
            }
        }
        None if append => rules.len(),
        None => 0,
    };

    rules.insert(index, without_position(rule.with_handle(handle)));
    table.next_handle += 1;
    Ok(())
}

// the position is an insertion parameter, not a property of the stored rule
fn without_position(rule: Rule) -> Rule {
    let mut stored = Rule::default();
    stored.set_family(rule.get_family());
    if let Some(table) = rule.get_table() {
        stored.set_table(table.as_str());
    }
    if let Some(chain) = rule.get_chain() {
        stored.set_chain(chain.as_str());
    }
    if let Some(handle) = rule.get_handle() {
        stored.set_handle(*handle);
    }
    if let Some(exprs) = rule.get_expressions() {
        stored.set_expressions(exprs.clone());
    }
    if let Some(userdata) = rule.get_userdata() {
        stored.set_userdata(userdata.clone());
    }
    stored
}

fn del_rule(state: &mut State, rule: &Rule) -> Result<(), QueryError> {
    let handle = *rule
        .get_handle()
        .ok_or(QueryError::NetlinkError(Errno::EINVAL))?;
    let (t, c) = find_chain(state, &chain_of_rule(rule))?;
    let rules = &mut state.tables[t].chains[c].rules;
    let i = rules
        .iter()
        .position(|r| r.get_handle() == Some(&handle))
        .ok_or(QueryError::NetlinkError(Errno::ENOENT))?;
    rules.remove(i);
    Ok(())
}
