use crate::{
    error::DecodeError,
    expr::Verdict,
    impl_attr_getters_and_setters, impl_nested_deserialize,
    nlmsg::{NfNetlinkAttribute, NfNetlinkDeserializable},
    sys::{NFTA_DATA_VALUE, NFTA_DATA_VERDICT},
};

fn take<const N: usize>(buf: &[u8]) -> Result<([u8; N], &[u8]), DecodeError> {
    if buf.len() < N {
        return Err(DecodeError::InvalidDataSize);
    }
    let mut bytes = [0u8; N];
    bytes.copy_from_slice(&buf[..N]);
    Ok((bytes, &buf[N..]))
}

impl NfNetlinkAttribute for u8 {
    fn write_payload(&self, buf: &mut [u8]) {
        buf[0] = *self;
    }
}

impl NfNetlinkDeserializable for u8 {
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let (bytes, remaining) = take::<1>(buf)?;
        Ok((bytes[0], remaining))
    }
}

impl NfNetlinkAttribute for u16 {
    fn write_payload(&self, buf: &mut [u8]) {
        buf[..2].copy_from_slice(&self.to_be_bytes());
    }
}

impl NfNetlinkDeserializable for u16 {
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let (bytes, remaining) = take::<2>(buf)?;
        Ok((u16::from_be_bytes(bytes), remaining))
    }
}

impl NfNetlinkAttribute for i32 {
    fn write_payload(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&self.to_be_bytes());
    }
}

impl NfNetlinkDeserializable for i32 {
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let (bytes, remaining) = take::<4>(buf)?;
        Ok((i32::from_be_bytes(bytes), remaining))
    }
}

impl NfNetlinkAttribute for u32 {
    fn write_payload(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&self.to_be_bytes());
    }
}

impl NfNetlinkDeserializable for u32 {
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let (bytes, remaining) = take::<4>(buf)?;
        Ok((u32::from_be_bytes(bytes), remaining))
    }
}

impl NfNetlinkAttribute for u64 {
    fn write_payload(&self, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&self.to_be_bytes());
    }
}

impl NfNetlinkDeserializable for u64 {
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        let (bytes, remaining) = take::<8>(buf)?;
        Ok((u64::from_be_bytes(bytes), remaining))
    }
}

// strings are written NUL-terminated, the way libmnl's `mnl_attr_put_strz` does
impl NfNetlinkAttribute for String {
    fn get_size(&self) -> usize {
        self.len() + 1
    }

    fn write_payload(&self, buf: &mut [u8]) {
        buf[..self.len()].copy_from_slice(self.as_bytes());
        buf[self.len()] = 0;
    }
}

impl NfNetlinkDeserializable for String {
    fn deserialize(mut buf: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        // ignore the NULL byte terminator, if any
        if let Some(end) = buf.iter().position(|&c| c == 0) {
            buf = &buf[..end];
        }
        Ok((String::from_utf8(buf.to_vec())?, &[]))
    }
}

impl NfNetlinkAttribute for Vec<u8> {
    fn get_size(&self) -> usize {
        self.len()
    }

    fn write_payload(&self, buf: &mut [u8]) {
        buf[..self.len()].copy_from_slice(self);
    }
}

impl NfNetlinkDeserializable for Vec<u8> {
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        Ok((buf.to_vec(), &[]))
    }
}

/// `NFTA_DATA_*`: the value (or verdict) carried by `cmp`, `immediate` and `bitwise`
/// expressions.
#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct NfNetlinkData {
    value: Option<Vec<u8>>,
    verdict: Option<Verdict>,
}

impl_attr_getters_and_setters!(NfNetlinkData, nested = true, [
    (value, get_value, set_value, with_value, NFTA_DATA_VALUE, Vec<u8>),
    (verdict, get_verdict, set_verdict, with_verdict, NFTA_DATA_VERDICT, Verdict),
]);
impl_nested_deserialize!(NfNetlinkData);
