//! Message payload types carried by queues.
//!
//! A message is a value, or a tuple of values, that knows how to size,
//! write and read itself through the flat serialization cursors. Array
//! payloads (`Vec` of fixed-width elements) additionally support the bulk
//! wire form used by `send_many`: a raw element block plus the serialized
//! trailing fields.

use crate::error::{CoreError, CoreResult};
use crate::serialize::{decode_elems, ByteReader, ByteWriter, Flat, Scaler};

/// A value transportable through a queue.
pub trait Message: Clone + Send + Sync + 'static {
    /// Accounts for this value in a sizing pass.
    fn scale(&self, scaler: &mut Scaler);

    /// Appends this value to a payload buffer.
    fn write(&self, writer: &mut ByteWriter);

    /// Reads one value back out of a payload buffer.
    fn read(reader: &mut ByteReader<'_>) -> CoreResult<Self>;

    /// Assembles a message from the bulk wire form: `count` raw elements
    /// plus the serialized trailing fields. Only array-first message types
    /// accept this form.
    #[doc(hidden)]
    fn from_array_parts(count: usize, elems: &[u8], tail: &[u8]) -> CoreResult<Self> {
        let _ = (count, elems, tail);
        Err(CoreError::NotAnArray)
    }
}

/// Message types whose first component is an array, enabling `send_many`.
pub trait ArrayMessage: Message {
    /// Element type of the array component.
    type Elem: Flat;
    /// Tuple of the remaining message fields.
    type Tail: Message;
}

impl Message for () {
    fn scale(&self, _scaler: &mut Scaler) {}

    fn write(&self, _writer: &mut ByteWriter) {}

    fn read(_reader: &mut ByteReader<'_>) -> CoreResult<Self> {
        Ok(())
    }
}

impl Message for String {
    fn scale(&self, scaler: &mut Scaler) {
        scaler.string(self);
    }

    fn write(&self, writer: &mut ByteWriter) {
        writer.string(self);
    }

    fn read(reader: &mut ByteReader<'_>) -> CoreResult<Self> {
        reader.string()
    }
}

impl<T: Flat> Message for Vec<T> {
    fn scale(&self, scaler: &mut Scaler) {
        scaler.slice(self);
    }

    fn write(&self, writer: &mut ByteWriter) {
        writer.slice(self);
    }

    fn read(reader: &mut ByteReader<'_>) -> CoreResult<Self> {
        reader.vec()
    }

    fn from_array_parts(count: usize, elems: &[u8], _tail: &[u8]) -> CoreResult<Self> {
        decode_elems(count, elems)
    }
}

impl<T: Flat> ArrayMessage for Vec<T> {
    type Elem = T;
    type Tail = ();
}

macro_rules! impl_flat_message {
    ($($ty:ty),* $(,)?) => {$(
        impl Message for $ty {
            fn scale(&self, scaler: &mut Scaler) {
                scaler.flat::<$ty>();
            }

            fn write(&self, writer: &mut ByteWriter) {
                writer.flat(self);
            }

            fn read(reader: &mut ByteReader<'_>) -> CoreResult<Self> {
                reader.flat::<$ty>()
            }
        }
    )*};
}

impl_flat_message!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64);

macro_rules! impl_tuple_message {
    ($head:ident $hidx:tt $(, $tail:ident $tidx:tt)*) => {
        impl<$head: Message $(, $tail: Message)*> Message for ($head, $($tail,)*) {
            fn scale(&self, scaler: &mut Scaler) {
                self.$hidx.scale(scaler);
                $(self.$tidx.scale(scaler);)*
            }

            fn write(&self, writer: &mut ByteWriter) {
                self.$hidx.write(writer);
                $(self.$tidx.write(writer);)*
            }

            fn read(reader: &mut ByteReader<'_>) -> CoreResult<Self> {
                Ok(($head::read(reader)?, $($tail::read(reader)?,)*))
            }

            fn from_array_parts(count: usize, elems: &[u8], tail: &[u8]) -> CoreResult<Self> {
                // The head takes the element block; the rest decode from the
                // serialized tail. A non-array head rejects the whole form.
                let head = $head::from_array_parts(count, elems, &[])?;
                #[allow(unused_mut, unused_variables)]
                let mut reader = ByteReader::new(tail);
                Ok((head, $($tail::read(&mut reader)?,)*))
            }
        }
    };
}

impl_tuple_message!(A 0);
impl_tuple_message!(A 0, B 1);
impl_tuple_message!(A 0, B 1, C 2);
impl_tuple_message!(A 0, B 1, C 2, D 3);

impl<E: Flat> ArrayMessage for (Vec<E>,) {
    type Elem = E;
    type Tail = ();
}

impl<E: Flat, B: Message> ArrayMessage for (Vec<E>, B) {
    type Elem = E;
    type Tail = B;
}

impl<E: Flat, B: Message, C: Message> ArrayMessage for (Vec<E>, B, C) {
    type Elem = E;
    type Tail = (B, C);
}

impl<E: Flat, B: Message, C: Message, D: Message> ArrayMessage for (Vec<E>, B, C, D) {
    type Elem = E;
    type Tail = (B, C, D);
}

/// Serializes one message into a payload buffer sized by a scaling pass.
pub(crate) fn encode_message<M: Message>(msg: &M) -> Box<[u8]> {
    let mut scaler = Scaler::new();
    msg.scale(&mut scaler);
    let mut writer = ByteWriter::with_capacity(scaler.size());
    msg.write(&mut writer);
    debug_assert_eq!(writer.len(), scaler.size());
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<M: Message + PartialEq + std::fmt::Debug>(msg: M) {
        let buf = encode_message(&msg);
        let mut reader = ByteReader::new(&buf);
        assert_eq!(M::read(&mut reader).unwrap(), msg);
        assert!(reader.is_empty());
    }

    #[test]
    fn tuple_messages_roundtrip() {
        roundtrip((7u32, -3i64));
        roundtrip((1u8, "tag".to_string(), vec![1.5f64, -2.5]));
        roundtrip((vec![10i32, 20, 30],));
    }

    #[test]
    fn array_form_assembles_head_and_tail() {
        use zerocopy::IntoBytes;

        let elems = [5u32, 6, 7];
        let tail = encode_message(&-9i64);
        let msg = <(Vec<u32>, i64)>::from_array_parts(3, elems.as_bytes(), &tail).unwrap();
        assert_eq!(msg, (vec![5, 6, 7], -9));
    }

    #[test]
    fn array_form_rejects_scalar_head() {
        let err = <(u32, i64)>::from_array_parts(1, &[0, 0, 0, 0], &[]).unwrap_err();
        assert!(matches!(err, CoreError::NotAnArray));
    }

    #[test]
    fn array_form_rejects_short_element_block() {
        assert!(<Vec<u64>>::from_array_parts(2, &[0u8; 8], &[]).is_err());
    }
}
