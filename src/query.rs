//! Synchronous exchanges with netfilter over an `AF_NETLINK` socket.
//!
//! A new socket is opened for every operation and closed once the kernel answered.

use std::os::unix::prelude::RawFd;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::socket::{
    self, sockopt, AddressFamily, MsgFlags, SockFlag, SockProtocol, SockType,
};
use nix::sys::time::{TimeVal, TimeValLike};

use crate::batch::Batch;
use crate::error::QueryError;
use crate::nlmsg::{pad_netlink_object_with_variable_size, NfNetlinkObject, NfNetlinkWriter};
use crate::parser::{nft_nlmsg_maxsize, parse_nlmsg, NlMsg};
use crate::sys::NLM_F_DUMP;
use crate::ProtocolFamily;

/// Opens a netfilter netlink socket. With a `timeout`, a receive that waits longer than that
/// fails with [`QueryError::Timeout`].
pub fn open_socket(timeout: Option<Duration>) -> Result<RawFd, QueryError> {
    let sock = socket::socket(
        AddressFamily::Netlink,
        SockType::Raw,
        SockFlag::empty(),
        SockProtocol::NetlinkNetFilter,
    )
    .map_err(QueryError::NetlinkOpenError)?;

    if let Some(timeout) = timeout {
        let tv = TimeVal::milliseconds(timeout.as_millis() as i64);
        if let Err(e) = socket::setsockopt(sock, sockopt::ReceiveTimeout, &tv) {
            let _ = nix::unistd::close(sock);
            return Err(QueryError::NetlinkConfigError(e));
        }
    }

    Ok(sock)
}

pub(crate) fn socket_close_wrapper<T>(
    sock: RawFd,
    cb: impl FnOnce(RawFd) -> Result<T, QueryError>,
) -> Result<T, QueryError> {
    let ret = cb(sock);

    // we don't need to shutdown the socket (in fact, Linux doesn't support that operation;
    // and return EOPNOTSUPP if we try)
    nix::unistd::close(sock).map_err(QueryError::CloseFailed)?;

    ret
}

fn send_all(sock: RawFd, buf: &[u8]) -> Result<(), QueryError> {
    let sent = socket::send(sock, buf, MsgFlags::empty()).map_err(QueryError::NetlinkSendError)?;
    if sent != buf.len() {
        return Err(QueryError::TruncatedSend);
    }
    Ok(())
}

/// Reads messages from `sock` until `NLMSG_DONE`, or until the message with sequence number
/// `max_seq` was processed. Every nf_tables message is handed to `cb` as a full netlink message.
///
/// A kernel error aborts the processing and is returned.
pub(crate) fn recv_and_process<T>(
    sock: RawFd,
    max_seq: Option<u32>,
    cb: Option<&dyn Fn(&[u8], &mut T) -> Result<(), QueryError>>,
    working_data: &mut T,
) -> Result<(), QueryError> {
    let mut msg_buffer = vec![0; nft_nlmsg_maxsize() as usize];

    loop {
        let nb_recv = match socket::recv(sock, &mut msg_buffer, MsgFlags::empty()) {
            Ok(n) => n,
            Err(Errno::EAGAIN) => return Err(QueryError::Timeout),
            Err(e) => return Err(QueryError::NetlinkRecvError(e)),
        };
        if nb_recv == 0 {
            return Ok(());
        }
        let mut buf = &msg_buffer[..nb_recv];
        while !buf.is_empty() {
            let (nlmsghdr, msg) = parse_nlmsg(buf)?;
            match msg {
                NlMsg::Done => {
                    return Ok(());
                }
                NlMsg::Error(Some(errno)) => {
                    return Err(QueryError::NetlinkError(errno));
                }
                NlMsg::Error(None) | NlMsg::Noop => {}
                NlMsg::NfGenMsg(_, _) => {
                    if let Some(cb) = cb {
                        cb(&buf[..nlmsghdr.nlmsg_len as usize], working_data)?;
                    }
                }
            }

            if let Some(max_seq) = max_seq {
                if nlmsghdr.nlmsg_seq >= max_seq {
                    return Ok(());
                }
            }

            // netlink messages are 4bytes aligned
            let aligned_length =
                pad_netlink_object_with_variable_size(nlmsghdr.nlmsg_len as usize).min(buf.len());
            buf = &buf[aligned_length..];
        }
    }
}

/// Sends a batch to netfilter and waits for the kernel to acknowledge every object in it.
pub fn send_batch(batch: Batch, timeout: Option<Duration>) -> Result<(), QueryError> {
    // the objects of the batch are numbered from 1, see `Batch::new`
    let last_seq = batch.next_seq().wrapping_sub(1);
    if last_seq == 0 {
        // an empty batch is never acknowledged
        return Ok(());
    }
    let buf = batch.finalize();

    let sock = open_socket(timeout)?;
    socket_close_wrapper(sock, move |sock| {
        send_all(sock, &buf)?;
        recv_and_process::<()>(sock, Some(last_seq), None, &mut ())
    })
}

/// Dumps every object of type `Object` known to netfilter.
///
/// `filter` restricts the dump: its family selects the protocol family to dump and its
/// attributes are sent along the request (for example the table and chain of a [`Rule`], to
/// list a single chain). Objects that fail to decode are skipped.
///
/// [`Rule`]: crate::Rule
pub fn list_objects_with_data<Object>(
    data_type: u16,
    filter: Option<&Object>,
    timeout: Option<Duration>,
) -> Result<Vec<Object>, QueryError>
where
    Object: NfNetlinkObject,
{
    debug!("Listing objects of kind {}", data_type);
    let mut request = Vec::new();
    let mut writer = NfNetlinkWriter::new(&mut request);
    writer.write_header(
        data_type,
        filter
            .map(|f| f.get_family())
            .unwrap_or(ProtocolFamily::Unspec),
        NLM_F_DUMP,
        0,
        None,
    );
    if let Some(filter) = filter {
        let buf = writer.add_data_zeroed(filter.get_size());
        filter.write_payload(buf);
    }
    writer.finalize_writing_object();

    let sock = open_socket(timeout)?;
    let mut objects = Vec::new();
    let cb: &dyn Fn(&[u8], &mut Vec<Object>) -> Result<(), QueryError> = &decode_into::<Object>;
    socket_close_wrapper(sock, |sock| {
        send_all(sock, &request)?;
        recv_and_process(sock, None, Some(cb), &mut objects)
    })?;
    debug!("Received {} objects of kind {}", objects.len(), data_type);

    Ok(objects)
}

fn decode_into<Object: NfNetlinkObject>(
    buf: &[u8],
    objects: &mut Vec<Object>,
) -> Result<(), QueryError> {
    match Object::deserialize(buf) {
        Ok((obj, _)) => objects.push(obj),
        Err(e) => warn!("Skipping an object netfilter sent that could not be decoded: {}", e),
    }
    Ok(())
}
