use super::Expression;
use crate::sys::{NFTA_COUNTER_BYTES, NFTA_COUNTER_PACKETS};
use crate::{impl_attr_getters_and_setters, impl_nested_deserialize};

/// A counter expression adds a counter to the rule that is incremented to count number of packets
/// and number of bytes for all packets that have matched the rule.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct Counter {
    nb_bytes: Option<u64>,
    nb_packets: Option<u64>,
}

impl_attr_getters_and_setters!(Counter, nested = true, [
    (nb_bytes, get_nb_bytes, set_nb_bytes, with_nb_bytes, NFTA_COUNTER_BYTES, u64),
    (nb_packets, get_nb_packets, set_nb_packets, with_nb_packets, NFTA_COUNTER_PACKETS, u64),
]);
impl_nested_deserialize!(Counter);

impl Counter {
    pub fn new() -> Self {
        Counter::default().with_nb_bytes(0u64).with_nb_packets(0u64)
    }
}

impl Expression for Counter {
    fn get_name() -> &'static str {
        "counter"
    }
}
