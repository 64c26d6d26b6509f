//! Flat byte serialization between processors of one world.
//!
//! Payloads travel as contiguous byte buffers written and read through an
//! index cursor: fixed-width values are native-endian byte copies,
//! strings and arrays carry a `u32` length prefix. The format is internal
//! to a single run of a single binary; no cross-run or cross-endian
//! compatibility is promised.
//!
//! A [`Scaler`] computes the exact buffer size for a heterogeneous set of
//! values without copying, so senders allocate each payload buffer once.

use std::mem;

use zerocopy::{FromBytes, Immutable, IntoBytes};

use crate::error::{CoreError, CoreResult};

/// Marker bound for values transported as raw fixed-width bytes.
///
/// Satisfied by the numeric primitives and by any `#[repr(C)]` type that
/// derives the `zerocopy` byte traits.
pub trait Flat: IntoBytes + FromBytes + Immutable + Copy + Send + Sync + 'static {}

impl<T: IntoBytes + FromBytes + Immutable + Copy + Send + Sync + 'static> Flat for T {}

/// Sizing pass over the values of one payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct Scaler {
    size: usize,
}

impl Scaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounts for one fixed-width value.
    pub fn flat<T: Flat>(&mut self) {
        self.size += mem::size_of::<T>();
    }

    /// Accounts for a length-prefixed string.
    pub fn string(&mut self, s: &str) {
        self.size += mem::size_of::<u32>() + s.len();
    }

    /// Accounts for a length-prefixed array of fixed-width elements.
    pub fn slice<T: Flat>(&mut self, xs: &[T]) {
        self.size += mem::size_of::<u32>() + xs.len() * mem::size_of::<T>();
    }

    /// Exact number of bytes the accounted values occupy on the wire.
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Write-and-advance cursor producing one payload buffer.
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Creates a writer whose buffer is allocated up front, typically from
    /// a [`Scaler`] pass over the same values.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn flat<T: Flat>(&mut self, value: &T) {
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub fn string(&mut self, s: &str) {
        self.flat(&(s.len() as u32));
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn slice<T: Flat>(&mut self, xs: &[T]) {
        self.flat(&(xs.len() as u32));
        self.buf.extend_from_slice(xs.as_bytes());
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Box<[u8]> {
        self.buf.into_boxed_slice()
    }
}

/// Read-and-advance cursor over one payload buffer.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    index: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, index: 0 }
    }

    pub fn flat<T: Flat>(&mut self) -> CoreResult<T> {
        let bytes = self.take(mem::size_of::<T>())?;
        T::read_from_bytes(bytes).map_err(|_| CoreError::decode("fixed-width read failed"))
    }

    pub fn string(&mut self) -> CoreResult<String> {
        let len = self.flat::<u32>()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|err| CoreError::decode(format!("string payload is not UTF-8: {err}")))
    }

    pub fn vec<T: Flat>(&mut self) -> CoreResult<Vec<T>> {
        let count = self.flat::<u32>()? as usize;
        let bytes = self.take(count * elem_size::<T>()?)?;
        decode_elems(count, bytes)
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.index
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, len: usize) -> CoreResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(CoreError::decode(format!(
                "buffer truncated: need {len} bytes, {} remain",
                self.remaining()
            )));
        }
        let bytes = &self.buf[self.index..self.index + len];
        self.index += len;
        Ok(bytes)
    }
}

/// Decodes `count` contiguous fixed-width elements out of `bytes`.
pub(crate) fn decode_elems<T: Flat>(count: usize, bytes: &[u8]) -> CoreResult<Vec<T>> {
    let elem = elem_size::<T>()?;
    if bytes.len() != count * elem {
        return Err(CoreError::decode(format!(
            "array payload of {} bytes does not hold {count} elements of {elem} bytes",
            bytes.len()
        )));
    }
    let mut out = Vec::with_capacity(count);
    for chunk in bytes.chunks_exact(elem) {
        let value =
            T::read_from_bytes(chunk).map_err(|_| CoreError::decode("array element read failed"))?;
        out.push(value);
    }
    Ok(out)
}

fn elem_size<T: Flat>() -> CoreResult<usize> {
    match mem::size_of::<T>() {
        0 => Err(CoreError::decode("zero-sized element type")),
        n => Ok(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaler_matches_writer_exactly() {
        let text = "six by nine";
        let xs = [3u64, 1, 4, 1, 5];

        let mut scaler = Scaler::new();
        scaler.flat::<i32>();
        scaler.string(text);
        scaler.slice(&xs);

        let mut writer = ByteWriter::with_capacity(scaler.size());
        writer.flat(&-42i32);
        writer.string(text);
        writer.slice(&xs);

        assert_eq!(writer.len(), scaler.size());
    }

    #[test]
    fn fixed_width_roundtrip_is_bitwise() {
        let mut writer = ByteWriter::with_capacity(16);
        writer.flat(&0x1234_5678_9abc_def0u64);
        writer.flat(&f64::MIN_POSITIVE);
        let buf = writer.finish();

        let mut reader = ByteReader::new(&buf);
        assert_eq!(reader.flat::<u64>().unwrap(), 0x1234_5678_9abc_def0);
        assert_eq!(
            reader.flat::<f64>().unwrap().to_bits(),
            f64::MIN_POSITIVE.to_bits()
        );
        assert!(reader.is_empty());
    }

    #[test]
    fn string_roundtrip_preserves_unicode() {
        let mut writer = ByteWriter::with_capacity(0);
        writer.string("grüße, wereld");
        writer.string("");
        let buf = writer.finish();

        let mut reader = ByteReader::new(&buf);
        assert_eq!(reader.string().unwrap(), "grüße, wereld");
        assert_eq!(reader.string().unwrap(), "");
        assert!(reader.is_empty());
    }

    #[test]
    fn vec_roundtrip() {
        let xs = vec![-7i32, 0, 7, i32::MAX];
        let mut writer = ByteWriter::with_capacity(0);
        writer.slice(&xs);
        let buf = writer.finish();

        let mut reader = ByteReader::new(&buf);
        assert_eq!(reader.vec::<i32>().unwrap(), xs);
    }

    #[test]
    fn empty_vec_roundtrip() {
        let mut writer = ByteWriter::with_capacity(4);
        writer.slice::<u8>(&[]);
        let buf = writer.finish();

        let mut reader = ByteReader::new(&buf);
        assert!(reader.vec::<u8>().unwrap().is_empty());
        assert!(reader.is_empty());
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let mut writer = ByteWriter::with_capacity(8);
        writer.flat(&1u64);
        let buf = writer.finish();

        let mut reader = ByteReader::new(&buf[..5]);
        assert!(reader.flat::<u64>().is_err());
    }

    #[test]
    fn truncated_vec_is_rejected() {
        let mut writer = ByteWriter::with_capacity(0);
        writer.slice(&[1u32, 2, 3]);
        let buf = writer.finish();

        let mut reader = ByteReader::new(&buf[..buf.len() - 1]);
        assert!(reader.vec::<u32>().is_err());
    }
}
