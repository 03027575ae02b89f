use crate::nlmsg::{NfNetlinkDeserializable, NfNetlinkObject, NfNetlinkWriter};
use crate::parser::get_operation_from_nlmsghdr_type;
use crate::sys::*;
use crate::{MsgType, ProtocolFamily, Table};

use super::{
    get_test_nlmsg, get_test_nlmsg_with_msg_type, get_test_table, strz, NetlinkExpr,
    TABLE_NAME, TABLE_USERDATA,
};

#[test]
fn new_empty_table() {
    let table = get_test_table();
    let mut buf = Vec::new();
    let (nlmsghdr, _nfgenmsg, raw_expr) = get_test_nlmsg(&mut buf, &table);
    assert_eq!(
        get_operation_from_nlmsghdr_type(nlmsghdr.nlmsg_type),
        NFT_MSG_NEWTABLE as u8
    );
    assert_eq!(nlmsghdr.nlmsg_flags & NLM_F_CREATE, NLM_F_CREATE);
    assert_eq!(nlmsghdr.nlmsg_len, 44);

    assert_eq!(
        raw_expr,
        NetlinkExpr::List(vec![
            NetlinkExpr::Final(NFTA_TABLE_NAME, strz(TABLE_NAME)),
            NetlinkExpr::Final(NFTA_TABLE_FLAGS, 0u32.to_be_bytes().to_vec()),
        ])
        .to_raw()
    );
}

#[test]
fn new_empty_table_with_userdata() {
    let table = get_test_table().with_userdata(TABLE_USERDATA.as_bytes().to_vec());
    let mut buf = Vec::new();
    let (nlmsghdr, _nfgenmsg, raw_expr) = get_test_nlmsg(&mut buf, &table);
    assert_eq!(nlmsghdr.nlmsg_len, 64);

    assert_eq!(
        raw_expr,
        NetlinkExpr::List(vec![
            NetlinkExpr::Final(NFTA_TABLE_NAME, strz(TABLE_NAME)),
            NetlinkExpr::Final(NFTA_TABLE_FLAGS, 0u32.to_be_bytes().to_vec()),
            NetlinkExpr::Final(NFTA_TABLE_USERDATA, TABLE_USERDATA.as_bytes().to_vec()),
        ])
        .to_raw()
    );
}

#[test]
fn delete_empty_table() {
    let table = get_test_table();
    let mut buf = Vec::new();
    let (nlmsghdr, _nfgenmsg, raw_expr) =
        get_test_nlmsg_with_msg_type(&mut buf, &table, MsgType::Del);
    assert_eq!(
        get_operation_from_nlmsghdr_type(nlmsghdr.nlmsg_type),
        NFT_MSG_DELTABLE as u8
    );
    assert_eq!(nlmsghdr.nlmsg_flags & NLM_F_CREATE, 0);
    assert_eq!(nlmsghdr.nlmsg_len, 44);

    assert_eq!(
        raw_expr,
        NetlinkExpr::List(vec![
            NetlinkExpr::Final(NFTA_TABLE_NAME, strz(TABLE_NAME)),
            NetlinkExpr::Final(NFTA_TABLE_FLAGS, 0u32.to_be_bytes().to_vec()),
        ])
        .to_raw()
    );
}

#[test]
fn parse_table() {
    let table = get_test_table().with_handle(42u64).with_use(3u32);
    let mut buf = Vec::new();
    let mut writer = NfNetlinkWriter::new(&mut buf);
    table.add_or_remove(&mut writer, MsgType::Add, 0);

    let (parsed, remaining) = Table::deserialize(&buf).unwrap();
    assert!(remaining.is_empty());
    assert_eq!(parsed.get_family(), ProtocolFamily::Ipv4);
    assert_eq!(parsed.get_name().map(String::as_str), Some(TABLE_NAME));
    assert_eq!(parsed.get_handle(), Some(&42));
    assert_eq!(parsed.get_use(), Some(&3));
    assert!(parsed.is_same(&get_test_table()));
}

#[test]
fn unknown_attributes_are_ignored() {
    let mut buf = Vec::new();
    let mut writer = NfNetlinkWriter::new(&mut buf);
    writer.write_header(NFT_MSG_NEWTABLE, ProtocolFamily::Ipv4, 0, 0, None);
    let raw = NetlinkExpr::List(vec![
        NetlinkExpr::Final(NFTA_TABLE_NAME, strz(TABLE_NAME)),
        // an attribute from a newer kernel
        NetlinkExpr::Final(42, vec![1, 2, 3, 4]),
    ])
    .to_raw();
    writer.add_data_zeroed(raw.len()).copy_from_slice(&raw);
    writer.finalize_writing_object();

    let (parsed, _) = Table::deserialize(&buf).unwrap();
    assert_eq!(parsed.get_name().map(String::as_str), Some(TABLE_NAME));
    assert_eq!(parsed.get_flags(), None);
}

#[test]
fn truncated_table_is_rejected() {
    let mut buf = Vec::new();
    let mut writer = NfNetlinkWriter::new(&mut buf);
    get_test_table().add_or_remove(&mut writer, MsgType::Add, 0);

    assert!(Table::deserialize(&buf[..buf.len() - 4]).is_err());
    assert!(Table::deserialize(&buf[..8]).is_err());
}
