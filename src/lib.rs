// Copyryght (c) 2021 GPL lafleur@boum.org and Simon Thoby
//
// This file is free software: you may copy, redistribute and/or modify it
// under the terms of the GNU General Public License as published by the
// Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// This file is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see the LICENSE file.
//
// This file incorporates work covered by the following copyright and
// permission notice:
//
//     Copyright 2018 Amagicom AB.
//
//     Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
//     http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
//     <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
//     option. This file may not be copied, modified, or distributed
//     except according to those terms.

//! Host packet-filter control engine. Programs the in-kernel nf_tables firewall on behalf of an
//! administrative API, speaking the nfnetlink protocol directly (no libnftnl involved).
//!
//! The engine owns one table holding three base chains (`input`, `forward` and `output`), all
//! with an accept policy: filtering is entirely done by explicit rules. Two system rules
//! (accept on loopback, accept established/related connections) are kept at the top of the
//! `input` chain. They are invisible to the [`Firewall`] API and cannot be modified through it.
//!
//! Every mutation is mirrored to a JSON file. On startup the managed chains are wiped and the
//! mirror is replayed: the kernel converges to the last known-good configuration even after
//! out-of-band changes.
//!
//! The lower layers ([`Batch`], [`Table`], [`Chain`], [`Rule`], [`expr`]) are a small netlink
//! codec for the subset of nf_tables this crate needs, and the [`Netfilter`] trait is the seam
//! between the engine and the kernel: [`NetlinkKernel`] talks to the real thing while
//! [`MemoryKernel`] simulates it for tests.
//!
//! ```no_run
//! use hostwall::{Config, CreateRuleRequest, Firewall, Notifier};
//!
//! let firewall = Firewall::open(Config::default(), Notifier::none());
//! let rule = firewall.add(CreateRuleRequest {
//!     chain: "input".into(),
//!     protocol: "tcp".into(),
//!     port: 22,
//!     action: "accept".into(),
//!     ..Default::default()
//! })?;
//! println!("ssh allowed by rule {}", rule.handle);
//! # Ok::<(), hostwall::Error>(())
//! ```

#[macro_use]
extern crate log;

use std::convert::TryFrom;

pub mod sys;

pub mod error;
pub use error::{BuilderError, DecodeError, Error, QueryError};

pub mod parser;
pub mod nlmsg;
mod parser_impls;
pub use parser_impls::NfNetlinkData;

mod batch;
pub use batch::{default_batch_page_size, Batch};

mod table;
pub use table::Table;

mod chain;
pub use chain::{Chain, ChainPolicy, ChainPriority, ChainType, Hook, HookClass};

mod rule;
pub use rule::{Placement, Rule, MAX_COMMENT_LEN};

pub mod expr;

pub mod query;

pub mod kernel;
pub use kernel::{memory::MemoryKernel, NetlinkKernel, Netfilter, Transaction};

pub mod compiler;
pub mod config;
pub use config::Config;
mod firewall;
pub use firewall::Firewall;
pub mod mirror;
pub mod model;
pub use model::{Action, ChainKind, CreateRuleRequest, FirewallRule, Protocol, Status};
pub mod notify;
pub use notify::Notifier;
pub mod safety;
pub mod topology;

/// The type of the message as it's sent to netfilter. A message consists of an object, such as a
/// [`Table`], [`Chain`] or [`Rule`] for example, and a [`MsgType`] to describe what to do with
/// that object. If a [`Table`] object is sent with `MsgType::Add` then that table will be added
/// to netfilter, if sent with `MsgType::Del` it will be removed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MsgType {
    /// Add the object to netfilter.
    Add,
    /// Remove the object from netfilter.
    Del,
}

/// Denotes a protocol. Used to specify which protocol a table or set belongs to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum ProtocolFamily {
    Unspec = sys::NFPROTO_UNSPEC,
    /// Inet - Means both IPv4 and IPv6
    Inet = sys::NFPROTO_INET,
    Ipv4 = sys::NFPROTO_IPV4,
    Arp = sys::NFPROTO_ARP,
    NetDev = sys::NFPROTO_NETDEV,
    Bridge = sys::NFPROTO_BRIDGE,
    Ipv6 = sys::NFPROTO_IPV6,
}

impl Default for ProtocolFamily {
    fn default() -> Self {
        Self::Unspec
    }
}

impl TryFrom<i32> for ProtocolFamily {
    type Error = DecodeError;
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            sys::NFPROTO_UNSPEC => Ok(ProtocolFamily::Unspec),
            sys::NFPROTO_INET => Ok(ProtocolFamily::Inet),
            sys::NFPROTO_IPV4 => Ok(ProtocolFamily::Ipv4),
            sys::NFPROTO_ARP => Ok(ProtocolFamily::Arp),
            sys::NFPROTO_NETDEV => Ok(ProtocolFamily::NetDev),
            sys::NFPROTO_BRIDGE => Ok(ProtocolFamily::Bridge),
            sys::NFPROTO_IPV6 => Ok(ProtocolFamily::Ipv6),
            _ => Err(DecodeError::UnknownProtocolFamily(value)),
        }
    }
}

#[cfg(test)]
mod tests;
