use crate::nlmsg::{NfNetlinkObject, NfNetlinkWriter};
use crate::sys::{NFNL_MSG_BATCH_BEGIN, NFNL_MSG_BATCH_END, NFNL_SUBSYS_NFTABLES};
use crate::{MsgType, ProtocolFamily};

/// A batch of netfilter messages to be performed in one atomic operation. Corresponds to
/// `nftnl_batch` in libnftnl.
///
/// The kernel applies a batch as a single transaction: either every object in it is committed,
/// or none is.
pub struct Batch {
    buf: Vec<u8>,
    seq: u32,
}

impl Batch {
    /// Creates a new nftnl batch with the [default page size].
    ///
    /// [default page size]: default_batch_page_size
    pub fn new() -> Self {
        Self::with_seq(0)
    }

    /// Creates a batch whose begin message uses the sequence number `seq`, the objects added
    /// afterwards being numbered from `seq + 1`.
    pub fn with_seq(seq: u32) -> Self {
        let mut buf = Vec::with_capacity(default_batch_page_size() as usize);
        let mut writer = NfNetlinkWriter::new(&mut buf);
        writer.write_header(
            NFNL_MSG_BATCH_BEGIN,
            ProtocolFamily::Unspec,
            0,
            seq,
            Some(NFNL_SUBSYS_NFTABLES),
        );
        writer.finalize_writing_object();
        Batch {
            buf,
            seq: seq.wrapping_add(1),
        }
    }

    /// Adds the given message to this batch.
    pub fn add<T: NfNetlinkObject>(&mut self, msg: &T, msg_type: MsgType) {
        trace!("Writing NlMsg with seq {} to batch", self.seq);
        let mut writer = NfNetlinkWriter::new(&mut self.buf);
        msg.add_or_remove(&mut writer, msg_type, self.seq);
        self.seq = self.seq.wrapping_add(1);
    }

    /// The sequence number the next object will get. The objects already in the batch use the
    /// numbers below it.
    pub fn next_seq(&self) -> u32 {
        self.seq
    }

    /// Adds the final end message to the batch and returns the bytes to send to netfilter.
    pub fn finalize(mut self) -> Vec<u8> {
        let mut writer = NfNetlinkWriter::new(&mut self.buf);
        writer.write_header(
            NFNL_MSG_BATCH_END,
            ProtocolFamily::Unspec,
            0,
            self.seq,
            Some(NFNL_SUBSYS_NFTABLES),
        );
        writer.finalize_writing_object();
        self.buf
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

/// Selected batch page is 256 Kbytes long to load ruleset of half a million rules without hitting
/// -EMSGSIZE due to large iovec.
pub fn default_batch_page_size() -> u32 {
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size > 0 {
        page_size as u32 * 32
    } else {
        4096 * 32
    }
}
