//! Hand-written fixed-layout account codec.
//!
//! Layout rules (shared with the on-chain program):
//! - 8-byte discriminator first
//! - integers little-endian, fixed width
//! - `bool` one byte, 0 or 1
//! - `Option<T>` one presence byte, then `T` only when present
//! - strings and vectors: u32 LE length, then UTF-8 bytes / elements
//! - pubkeys 32 raw bytes, fixed arrays at their declared width

use solana_sdk::pubkey::Pubkey;

use crate::errors::{SdkError, SdkResult};

/// An on-chain account type with a known discriminator and byte layout.
pub trait AccountLayout: Sized {
    const NAME: &'static str;
    const DISCRIMINATOR: [u8; 8];
    /// Smallest valid encoding, discriminator included (all vectors empty, options absent).
    const MIN_LEN: usize;

    fn read_body(r: &mut AccountReader<'_>) -> SdkResult<Self>;
    fn write_body(&self, w: &mut AccountWriter);
}

pub fn peek_discriminator(data: &[u8]) -> SdkResult<[u8; 8]> {
    let head = data.get(..8).ok_or(SdkError::TruncatedData {
        needed: 8,
        available: data.len(),
    })?;
    let mut out = [0u8; 8];
    out.copy_from_slice(head);
    Ok(out)
}

/// Decode `T` from raw account data. Trailing bytes past the body are ignored.
pub fn decode_account<T: AccountLayout>(data: &[u8]) -> SdkResult<T> {
    let disc = peek_discriminator(data)?;
    if disc != T::DISCRIMINATOR {
        return Err(SdkError::WrongAccountType {
            expected: T::NAME,
            expected_hex: hex::encode(T::DISCRIMINATOR),
            found_hex: hex::encode(disc),
        });
    }
    if data.len() < T::MIN_LEN {
        return Err(SdkError::TruncatedData {
            needed: T::MIN_LEN,
            available: data.len(),
        });
    }
    let mut r = AccountReader::new(&data[8..]);
    T::read_body(&mut r)
}

pub fn encode_account<T: AccountLayout>(value: &T) -> Vec<u8> {
    let mut w = AccountWriter::with_capacity(T::MIN_LEN);
    w.put_bytes(&T::DISCRIMINATOR);
    value.write_body(&mut w);
    w.into_inner()
}

pub struct AccountReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> AccountReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> SdkResult<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(SdkError::MathOverflow)?;
        let out = self.buf.get(self.pos..end).ok_or(SdkError::TruncatedData {
            // +8: report sizes in terms of the whole account
            needed: end + 8,
            available: self.buf.len() + 8,
        })?;
        self.pos = end;
        Ok(out)
    }

    pub fn array<const N: usize>(&mut self) -> SdkResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> SdkResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> SdkResult<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> SdkResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> SdkResult<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn u128(&mut self) -> SdkResult<u128> {
        Ok(u128::from_le_bytes(self.array()?))
    }

    pub fn i64(&mut self) -> SdkResult<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    pub fn bool(&mut self) -> SdkResult<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(SdkError::InvalidData(format!("bool byte {b} at offset {}", self.pos + 7))),
        }
    }

    pub fn pubkey(&mut self) -> SdkResult<Pubkey> {
        Ok(Pubkey::new_from_array(self.array()?))
    }

    pub fn option<T>(
        &mut self,
        read: impl FnOnce(&mut Self) -> SdkResult<T>,
    ) -> SdkResult<Option<T>> {
        match self.u8()? {
            0 => Ok(None),
            1 => read(self).map(Some),
            b => Err(SdkError::InvalidData(format!("option flag {b} at offset {}", self.pos + 7))),
        }
    }

    /// Length prefix of a vector whose elements take at least `min_elem` bytes.
    fn len_prefix(&mut self, min_elem: usize) -> SdkResult<usize> {
        let len = self.u32()? as usize;
        let needed = len.checked_mul(min_elem).ok_or(SdkError::MathOverflow)?;
        if needed > self.remaining() {
            return Err(SdkError::TruncatedData {
                needed: self.pos + needed + 8,
                available: self.buf.len() + 8,
            });
        }
        Ok(len)
    }

    pub fn vec<T>(
        &mut self,
        min_elem: usize,
        mut read: impl FnMut(&mut Self) -> SdkResult<T>,
    ) -> SdkResult<Vec<T>> {
        let len = self.len_prefix(min_elem)?;
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(read(self)?);
        }
        Ok(out)
    }

    pub fn bytes(&mut self) -> SdkResult<Vec<u8>> {
        let len = self.len_prefix(1)?;
        Ok(self.take(len)?.to_vec())
    }

    pub fn string(&mut self) -> SdkResult<String> {
        let raw = self.bytes()?;
        String::from_utf8(raw).map_err(|e| SdkError::InvalidData(format!("string is not utf-8: {e}")))
    }
}

#[derive(Default)]
pub struct AccountWriter {
    buf: Vec<u8>,
}

impl AccountWriter {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            buf: Vec::with_capacity(n),
        }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn put_bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u16(&mut self, v: u16) {
        self.put_bytes(&v.to_le_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.put_bytes(&v.to_le_bytes());
    }

    pub fn u64(&mut self, v: u64) {
        self.put_bytes(&v.to_le_bytes());
    }

    pub fn u128(&mut self, v: u128) {
        self.put_bytes(&v.to_le_bytes());
    }

    pub fn i64(&mut self, v: i64) {
        self.put_bytes(&v.to_le_bytes());
    }

    pub fn bool(&mut self, v: bool) {
        self.u8(v as u8);
    }

    pub fn pubkey(&mut self, k: &Pubkey) {
        self.put_bytes(k.as_ref());
    }

    pub fn option<T>(&mut self, v: Option<&T>, write: impl FnOnce(&mut Self, &T)) {
        match v {
            None => self.u8(0),
            Some(x) => {
                self.u8(1);
                write(self, x);
            }
        }
    }

    pub fn vec<T>(&mut self, items: &[T], mut write: impl FnMut(&mut Self, &T)) {
        self.u32(items.len() as u32);
        for it in items {
            write(self, it);
        }
    }

    pub fn bytes(&mut self, b: &[u8]) {
        self.u32(b.len() as u32);
        self.put_bytes(b);
    }

    pub fn string(&mut self, s: &str) {
        self.bytes(s.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_rejects_non_canonical_bool_and_option() {
        let mut r = AccountReader::new(&[2]);
        assert!(matches!(r.bool(), Err(SdkError::InvalidData(_))));
        let mut r = AccountReader::new(&[5, 0, 0]);
        assert!(matches!(r.option(|r| r.u8()), Err(SdkError::InvalidData(_))));
    }

    #[test]
    fn huge_length_prefix_is_truncation_not_allocation() {
        let mut data = u32::MAX.to_le_bytes().to_vec();
        data.extend_from_slice(&[0u8; 16]);
        let mut r = AccountReader::new(&data);
        assert!(matches!(
            r.vec(8, |r| r.u64()),
            Err(SdkError::TruncatedData { .. })
        ));
    }

    #[test]
    fn writer_layout_is_little_endian_with_prefixes() {
        let mut w = AccountWriter::default();
        w.u16(0x0102);
        w.option(Some(&7u8), |w, v| w.u8(*v));
        w.option(None::<&u8>, |w, v| w.u8(*v));
        w.string("ab");
        assert_eq!(w.into_inner(), vec![0x02, 0x01, 1, 7, 0, 2, 0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn invalid_utf8_is_reported() {
        let data = [2u8, 0, 0, 0, 0xff, 0xfe];
        let mut r = AccountReader::new(&data);
        assert!(matches!(r.string(), Err(SdkError::InvalidData(_))));
    }
}
