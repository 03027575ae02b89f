use std::collections::HashSet;
use std::convert::TryFrom;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::compiler::{build_rule, decompile_rule};
use crate::config::Config;
use crate::error::{BuilderError, Error};
use crate::kernel::{NetlinkKernel, Netfilter, Transaction};
use crate::mirror::Mirror;
use crate::model::{ChainKind, CreateRuleRequest, FirewallRule, Status};
use crate::notify::Notifier;
use crate::safety;
use crate::topology::{self, Topology};
use crate::{Chain, Rule};

struct Attached<K> {
    kernel: K,
    topology: Topology,
}

/// A rule of a managed chain, as found in the kernel.
enum Listed {
    Safety,
    Managed(FirewallRule),
    /// Added out of band, with a shape the engine does not produce.
    Foreign,
}

/// The firewall engine.
///
/// Reads ([`status`], [`list`]) share a lock, mutations ([`add`], [`delete`], [`reorder`],
/// [`recover`]) hold it exclusively: two mutations never interleave their kernel transactions.
///
/// Without a kernel the engine is *disabled*: [`status`] reports it and every other operation
/// fails with [`Error::KernelUnavailable`].
///
/// [`status`]: Firewall::status
/// [`list`]: Firewall::list
/// [`add`]: Firewall::add
/// [`delete`]: Firewall::delete
/// [`reorder`]: Firewall::reorder
/// [`recover`]: Firewall::recover
pub struct Firewall<K: Netfilter = NetlinkKernel> {
    config: Config,
    mirror: Mirror,
    notifier: Notifier,
    attached: Option<RwLock<Attached<K>>>,
}

impl Firewall<NetlinkKernel> {
    /// Attaches to the in-kernel netfilter. When it cannot be reached the engine starts
    /// disabled instead of failing.
    pub fn open(config: Config, notifier: Notifier) -> Self {
        let kernel = match NetlinkKernel::open(config.kernel_timeout()) {
            Ok(kernel) => kernel,
            Err(_) => {
                warn!("Starting the firewall engine disabled");
                return Firewall::disabled(config, notifier);
            }
        };
        match Firewall::with_kernel(kernel, config.clone(), notifier.clone()) {
            Ok(firewall) => firewall,
            Err(e) => {
                warn!("Starting the firewall engine disabled: {}", e);
                Firewall::disabled(config, notifier)
            }
        }
    }
}

impl<K: Netfilter> Firewall<K> {
    /// Bootstraps the table and chains, installs the safety rules and replays the mirror.
    pub fn with_kernel(kernel: K, config: Config, notifier: Notifier) -> Result<Self, Error> {
        let topology = topology::bootstrap(&kernel, &config.table_name)?;
        safety::ensure(&kernel, topology.chain(ChainKind::Input))?;

        let firewall = Firewall {
            mirror: Mirror::new(config.mirror_path()),
            config,
            notifier,
            attached: Some(RwLock::new(Attached { kernel, topology })),
        };
        firewall.recover()?;
        Ok(firewall)
    }

    /// An engine without kernel.
    pub fn disabled(config: Config, notifier: Notifier) -> Self {
        Firewall {
            mirror: Mirror::new(config.mirror_path()),
            config,
            notifier,
            attached: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.attached.is_some()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Attached<K>>, Error> {
        let lock = self.attached.as_ref().ok_or(Error::KernelUnavailable)?;
        // the guarded state holds no invariant a panicking holder could break
        Ok(lock.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Attached<K>>, Error> {
        let lock = self.attached.as_ref().ok_or(Error::KernelUnavailable)?;
        Ok(lock.write().unwrap_or_else(|e| e.into_inner()))
    }

    /// Never fails: a disabled engine, or one whose kernel stopped answering, reports no rule.
    pub fn status(&self) -> Status {
        let rule_count = match self.read() {
            Ok(attached) => match attached.list_managed() {
                Ok(rules) => rules.len(),
                Err(e) => {
                    warn!("Unable to count the rules: {}", e);
                    0
                }
            },
            Err(_) => 0,
        };
        Status {
            enabled: self.is_enabled(),
            rule_count,
            table: self.config.table_name.clone(),
        }
    }

    /// The managed rules of every chain, chain after chain, in evaluation order.
    pub fn list(&self) -> Result<Vec<FirewallRule>, Error> {
        let attached = self.read()?;
        attached.list_managed()
    }

    /// Validates and appends a rule to its chain. The returned rule carries its kernel handle.
    pub fn add(&self, request: CreateRuleRequest) -> Result<FirewallRule, Error> {
        let rule = FirewallRule::try_from(&request)?;
        let attached = self.write()?;
        let chain = attached.topology.chain(rule.chain);

        attached
            .kernel
            .commit(Transaction::new().with_add(build_rule(chain, &rule)?))?;

        // the kernel does not return the handle of a new rule: it is the newest matching one
        let handle = attached
            .list_chain(rule.chain)?
            .into_iter()
            .filter_map(|(_, listed)| match listed {
                Listed::Managed(r) if r.same_match(&rule) => Some(r.handle),
                _ => None,
            })
            .max()
            .ok_or_else(|| Error::Internal("the new rule is missing from its chain".to_string()))?;
        info!("Added rule {} to the {} chain", handle, rule.chain);

        self.persist(&attached);
        Ok(FirewallRule { handle, ..rule })
    }

    /// Deletes the rule with the given handle, whatever its chain.
    pub fn delete(&self, handle: u64) -> Result<(), Error> {
        let attached = self.write()?;

        for (kind, chain) in attached.topology.chains() {
            for (rule, listed) in attached.list_chain(kind)? {
                if rule.get_handle() != Some(&handle) {
                    continue;
                }
                if let Listed::Safety = listed {
                    return Err(Error::Forbidden(handle));
                }
                attached
                    .kernel
                    .commit(Transaction::new().with_delete(rule_ref(chain, handle)?))?;
                info!("Deleted rule {} from the {} chain", handle, kind);

                self.persist(&attached);
                return Ok(());
            }
        }

        Err(Error::NotFound(handle))
    }

    /// Rewrites the managed rules of `chain` in the order of `handles`, which must list each of
    /// them exactly once.
    ///
    /// The rules are deleted in one transaction and re-added in a second one, so they get new
    /// handles. A failure between both leaves the chain without managed rules until the next
    /// recovery replays the mirror, which still holds the previous order.
    pub fn reorder(&self, chain: &str, handles: &[u64]) -> Result<Vec<FirewallRule>, Error> {
        let kind: ChainKind = chain.parse()?;
        let attached = self.write()?;
        let chain = attached.topology.chain(kind);

        let mut managed = Vec::new();
        let mut safety_handles = HashSet::new();
        for (rule, listed) in attached.list_chain(kind)? {
            match listed {
                Listed::Managed(r) => managed.push(r),
                Listed::Safety => safety_handles.extend(rule.get_handle().copied()),
                Listed::Foreign => {}
            }
        }

        let ordered = order_by_handles(&managed, handles, &safety_handles, kind)?;

        let mut delete = Transaction::new();
        for rule in &managed {
            delete.delete(rule_ref(chain, rule.handle)?);
        }
        attached.kernel.commit(delete)?;

        let mut add = Transaction::new();
        for rule in &ordered {
            add.add(build_rule(chain, rule)?);
        }
        if let Err(e) = attached.kernel.commit(add) {
            error!(
                "The {} chain lost its rules while being reordered, they will be restored on \
                 the next recovery: {}",
                kind, e
            );
            return Err(e.into());
        }
        info!("Reordered {} rules of the {} chain", ordered.len(), kind);

        self.persist(&attached);
        attached.list_chain(kind).map(|rules| {
            rules
                .into_iter()
                .filter_map(|(_, l)| match l {
                    Listed::Managed(r) => Some(r),
                    _ => None,
                })
                .collect()
        })
    }

    /// Makes the kernel match the mirror: every rule of the managed chains except the safety
    /// rules is deleted, then the mirrored rules are re-added in their stored order.
    ///
    /// Without mirror (first start) nothing is done. A mirror that cannot be read is left
    /// untouched, as is the kernel.
    pub fn recover(&self) -> Result<(), Error> {
        let attached = self.write()?;

        let stored = match self.mirror.load() {
            Ok(Some(rules)) => rules,
            Ok(None) => {
                info!("No rule mirror at {}, nothing to recover", self.mirror.path().display());
                return Ok(());
            }
            Err(e) => {
                error!(
                    "Unable to read the rule mirror {}, the kernel rules are left as is: {}",
                    self.mirror.path().display(),
                    e
                );
                return Ok(());
            }
        };

        for (kind, chain) in attached.topology.chains() {
            let mut wipe = Transaction::new();
            for (rule, listed) in attached.list_chain(kind)? {
                if let Listed::Safety = listed {
                    continue;
                }
                if let Some(handle) = rule.get_handle() {
                    wipe.delete(rule_ref(chain, *handle)?);
                }
            }
            if !wipe.is_empty() {
                debug!("Removing {} stale rules from the {} chain", wipe.len(), kind);
                attached.kernel.commit(wipe)?;
            }
        }

        let mut replayed = 0;
        for (kind, chain) in attached.topology.chains() {
            let mut replay = Transaction::new();
            for rule in stored.iter().filter(|r| r.chain == kind) {
                if let Err(e) = rule.validate() {
                    warn!("Skipping an invalid mirrored rule {:?}: {}", rule, e);
                    continue;
                }
                replay.add(build_rule(chain, rule)?);
            }
            if !replay.is_empty() {
                replayed += replay.len();
                attached.kernel.commit(replay)?;
            }
        }
        info!("Recovered {} of {} mirrored rules", replayed, stored.len());

        self.persist(&attached);
        Ok(())
    }

    // Saves the managed rules to the mirror, then notifies the subscriber. Failures are logged:
    // the kernel already holds the change.
    fn persist(&self, attached: &Attached<K>) {
        let rules = match attached.list_managed() {
            Ok(rules) => rules,
            Err(e) => {
                error!("Unable to list the rules to save: {}", e);
                return;
            }
        };
        if let Err(e) = self.mirror.save(&rules) {
            error!(
                "Unable to save the rules to {}: {}",
                self.mirror.path().display(),
                e
            );
            return;
        }
        self.notifier.notify(rules);
    }
}

// a rule reference, enough to delete it
fn rule_ref(chain: &Chain, handle: u64) -> Result<Rule, BuilderError> {
    Ok(Rule::new(chain)?.with_handle(handle))
}

impl<K: Netfilter> Attached<K> {
    fn list_chain(&self, kind: ChainKind) -> Result<Vec<(Rule, Listed)>, Error> {
        let chain = self.topology.chain(kind);
        Ok(self
            .kernel
            .list_rules(chain)?
            .into_iter()
            .map(|rule| {
                let listed = if safety::classify(rule.iter_expressions()).is_some() {
                    Listed::Safety
                } else {
                    match decompile_rule(&rule, kind) {
                        Some(r) => Listed::Managed(r),
                        None => Listed::Foreign,
                    }
                };
                (rule, listed)
            })
            .collect())
    }

    fn list_managed(&self) -> Result<Vec<FirewallRule>, Error> {
        let mut rules = Vec::new();
        for kind in ChainKind::ALL.iter() {
            for (_, listed) in self.list_chain(*kind)? {
                if let Listed::Managed(r) = listed {
                    rules.push(r);
                }
            }
        }
        Ok(rules)
    }
}

// Checks that `handles` is a permutation of the managed rules and returns them in that order.
fn order_by_handles(
    managed: &[FirewallRule],
    handles: &[u64],
    safety_handles: &HashSet<u64>,
    kind: ChainKind,
) -> Result<Vec<FirewallRule>, Error> {
    let mut seen = HashSet::new();
    let mut ordered = Vec::with_capacity(handles.len());
    for handle in handles {
        if safety_handles.contains(handle) {
            return Err(Error::BadRequest(format!(
                "rule {} is a protected system rule and cannot be reordered",
                handle
            )));
        }
        if !seen.insert(*handle) {
            return Err(Error::BadRequest(format!("rule {} is listed twice", handle)));
        }
        let rule = managed
            .iter()
            .find(|r| r.handle == *handle)
            .ok_or_else(|| {
                Error::BadRequest(format!("no rule {} in the {} chain", handle, kind))
            })?;
        ordered.push(rule.clone());
    }
    if let Some(missing) = managed.iter().find(|r| !seen.contains(&r.handle)) {
        return Err(Error::BadRequest(format!(
            "rule {} of the {} chain is missing from the new order",
            missing.handle, kind
        )));
    }
    Ok(ordered)
}
