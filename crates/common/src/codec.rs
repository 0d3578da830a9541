//! Little-endian byte readers and writers for the binary container.

use std::rc::Rc;

use crate::error::{DecodeError, EncodeError};
use crate::value::{Map, Value};

const TAG_NULL: u8 = 0;
const TAG_FALSE: u8 = 1;
const TAG_TRUE: u8 = 2;
const TAG_NUMBER: u8 = 3;
const TAG_STRING: u8 = 4;
const TAG_ARRAY: u8 = 5;
const TAG_OBJECT: u8 = 6;

#[derive(Default)]
pub(crate) struct Writer {
    pub(crate) bytes: Vec<u8>,
}

impl Writer {
    pub(crate) fn u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub(crate) fn u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn len_u32(&mut self, len: usize) -> Result<(), EncodeError> {
        let len = u32::try_from(len).map_err(|_| EncodeError::TooLarge(len))?;
        self.u32(len);
        Ok(())
    }

    pub(crate) fn str(&mut self, s: &str) -> Result<(), EncodeError> {
        self.len_u32(s.len())?;
        self.bytes.extend_from_slice(s.as_bytes());
        Ok(())
    }

    /// Overwrite a previously written `u32` at byte `at`.
    pub(crate) fn patch_u32(&mut self, at: usize, value: u32) {
        self.bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Write `body` prefixed by its byte length.
    pub(crate) fn entry<F>(&mut self, body: F) -> Result<(), EncodeError>
    where
        F: FnOnce(&mut Writer) -> Result<(), EncodeError>,
    {
        let mut inner = Writer::default();
        body(&mut inner)?;
        self.len_u32(inner.bytes.len())?;
        self.bytes.extend_from_slice(&inner.bytes);
        Ok(())
    }

    /// Write a data constant. `index` is only used for error reporting.
    pub(crate) fn constant(&mut self, value: &Value, index: usize) -> Result<(), EncodeError> {
        match value {
            Value::Null => self.u8(TAG_NULL),
            Value::Boolean(false) => self.u8(TAG_FALSE),
            Value::Boolean(true) => self.u8(TAG_TRUE),
            Value::Number(n) => {
                self.u8(TAG_NUMBER);
                self.bytes.extend_from_slice(&n.to_le_bytes());
            }
            Value::String(s) => {
                self.u8(TAG_STRING);
                self.str(s)?;
            }
            Value::Array(elements) => {
                self.u8(TAG_ARRAY);
                self.len_u32(elements.len())?;
                for element in elements.iter() {
                    self.constant(element, index)?;
                }
            }
            Value::Object(entries) => {
                self.u8(TAG_OBJECT);
                self.len_u32(entries.len())?;
                for (key, element) in entries.iter() {
                    self.str(key)?;
                    self.constant(element, index)?;
                }
            }
            other => {
                return Err(EncodeError::UnsupportedConstant {
                    index,
                    kind: other.type_of(),
                })
            }
        }
        Ok(())
    }
}

pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    pub(crate) pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(DecodeError::Truncated { at: self.pos })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn usize(&mut self) -> Result<usize, DecodeError> {
        Ok(self.u32()? as usize)
    }

    fn f64(&mut self) -> Result<f64, DecodeError> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(f64::from_le_bytes(raw))
    }

    pub(crate) fn utf8(&mut self, n: usize) -> Result<String, DecodeError> {
        let at = self.pos;
        let raw = self.take(n)?;
        std::str::from_utf8(raw)
            .map(str::to_string)
            .map_err(|_| DecodeError::InvalidUtf8 { at })
    }

    pub(crate) fn str(&mut self) -> Result<String, DecodeError> {
        let n = self.usize()?;
        self.utf8(n)
    }

    pub(crate) fn constant(&mut self) -> Result<Value, DecodeError> {
        let at = self.pos;
        Ok(match self.u8()? {
            TAG_NULL => Value::Null,
            TAG_FALSE => Value::Boolean(false),
            TAG_TRUE => Value::Boolean(true),
            TAG_NUMBER => Value::Number(self.f64()?),
            TAG_STRING => Value::String(Rc::from(self.str()?)),
            TAG_ARRAY => {
                let count = self.usize()?;
                let mut elements = Vec::new();
                for _ in 0..count {
                    elements.push(self.constant()?);
                }
                Value::array(elements)
            }
            TAG_OBJECT => {
                let count = self.usize()?;
                let mut entries = Map::new();
                for _ in 0..count {
                    let key = self.str()?;
                    entries.insert(key, self.constant()?);
                }
                Value::object(entries)
            }
            tag => return Err(DecodeError::UnknownConstantTag { tag, at }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_constant_roundtrip() {
        let value = Value::object_from([
            ("numbers", Value::array(vec![1.into(), 2.5.into(), Value::Null])),
            ("flag", Value::from(true)),
            ("name", Value::from("ünïcode")),
        ]);
        let mut writer = Writer::default();
        writer.constant(&value, 0).unwrap();
        let mut reader = Reader::new(&writer.bytes, 0);
        assert_eq!(reader.constant().unwrap(), value);
        assert_eq!(reader.pos, writer.bytes.len());
    }

    #[test]
    fn functions_are_not_constants() {
        let f = Value::native("f", Default::default(), |_, _| Ok(Value::Null));
        let mut writer = Writer::default();
        assert_eq!(
            writer.constant(&Value::array(vec![f]), 7),
            Err(EncodeError::UnsupportedConstant {
                index: 7,
                kind: "function"
            })
        );
    }

    #[test]
    fn truncated_reads_report_position() {
        let mut reader = Reader::new(&[1, 2], 0);
        assert_eq!(reader.u32(), Err(DecodeError::Truncated { at: 0 }));
    }

    #[test]
    fn unknown_tags_are_rejected() {
        let mut reader = Reader::new(&[9], 0);
        assert_eq!(
            reader.constant(),
            Err(DecodeError::UnknownConstantTag { tag: 9, at: 0 })
        );
    }
}
