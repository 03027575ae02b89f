use crate::nlmsg::pad_netlink_object_with_variable_size;
use crate::parser::{get_operation_from_nlmsghdr_type, parse_nlmsg, NlMsg};
use crate::sys::*;
use crate::{Batch, MsgType};

use super::{get_test_chain, get_test_table};

// (type, flags, seq) of every message of a finalized batch
fn headers(buf: &[u8]) -> Vec<(u16, u16, u32)> {
    let mut res = Vec::new();
    let mut pos = 0;
    while pos < buf.len() {
        let (hdr, msg) = parse_nlmsg(&buf[pos..]).unwrap();
        assert!(matches!(msg, NlMsg::NfGenMsg(_, _)));
        res.push((hdr.nlmsg_type, hdr.nlmsg_flags, hdr.nlmsg_seq));
        pos += pad_netlink_object_with_variable_size(hdr.nlmsg_len as usize);
    }
    res
}

#[test]
fn empty_batch() {
    let buf = Batch::new().finalize();
    assert_eq!(
        headers(&buf),
        vec![
            (NFNL_MSG_BATCH_BEGIN, NLM_F_REQUEST, 0),
            (NFNL_MSG_BATCH_END, NLM_F_REQUEST, 1),
        ]
    );

    // the begin message addresses the nftables subsystem
    match parse_nlmsg(&buf).unwrap().1 {
        NlMsg::NfGenMsg(nfgenmsg, _) => assert_eq!(nfgenmsg.res_id, NFNL_SUBSYS_NFTABLES),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn objects_are_numbered_after_the_begin_message() {
    let mut batch = Batch::new();
    batch.add(&get_test_table(), MsgType::Add);
    batch.add(&get_test_chain(), MsgType::Add);
    batch.add(&get_test_chain(), MsgType::Del);
    assert_eq!(batch.next_seq(), 4);

    let hdrs = headers(&batch.finalize());
    assert_eq!(hdrs.len(), 5);
    assert_eq!(hdrs[0].2, 0);
    for (i, (ty, flags, seq)) in hdrs[1..4].iter().enumerate() {
        assert_eq!(*seq, i as u32 + 1);
        assert_eq!(*ty >> 8, NFNL_SUBSYS_NFTABLES);
        assert_eq!(flags & NLM_F_ACK, NLM_F_ACK);
    }
    assert_eq!(
        get_operation_from_nlmsghdr_type(hdrs[3].0),
        NFT_MSG_DELCHAIN as u8
    );
    assert_eq!(hdrs[4], (NFNL_MSG_BATCH_END, NLM_F_REQUEST, 4));
}

#[test]
fn batch_with_custom_seq() {
    let mut batch = Batch::with_seq(100);
    batch.add(&get_test_table(), MsgType::Add);
    batch.add(&get_test_table(), MsgType::Del);
    assert_eq!(batch.next_seq(), 103);

    let seqs: Vec<u32> = headers(&batch.finalize()).iter().map(|h| h.2).collect();
    assert_eq!(seqs, [100, 101, 102, 103]);
}
