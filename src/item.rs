//! Units of work and the pages they arrive in.

use bytes::Bytes;

/// A single unit of work, identified by a stable key.
///
/// The payload is immutable once built; stages consume the item and produce
/// whatever the next stage needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item<P> {
    key: String,
    payload: P,
}

impl<P> Item<P> {
    pub fn new(key: impl Into<String>, payload: P) -> Self {
        Self {
            key: key.into(),
            payload,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }

    pub fn into_parts(self) -> (String, P) {
        (self.key, self.payload)
    }

    /// Replace the payload, keeping the identity.
    pub fn map<Q>(self, f: impl FnOnce(P) -> Q) -> Item<Q> {
        Item {
            key: self.key,
            payload: f(self.payload),
        }
    }
}

/// Opaque continuation token handed back by a paginated source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(Bytes);

impl Cursor {
    pub fn new(token: impl Into<Bytes>) -> Self {
        Self(token.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<u64> for Cursor {
    fn from(offset: u64) -> Self {
        Self(Bytes::copy_from_slice(&offset.to_be_bytes()))
    }
}

/// One round-trip worth of rows plus the cursor for the next page.
///
/// `next` is `None` on the final page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<R> {
    rows: Vec<R>,
    next: Option<Cursor>,
}

impl<R> Page<R> {
    pub fn new(rows: Vec<R>, next: Option<Cursor>) -> Self {
        Self { rows, next }
    }

    pub fn last(rows: Vec<R>) -> Self {
        Self { rows, next: None }
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn next_cursor(&self) -> Option<&Cursor> {
        self.next.as_ref()
    }

    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_parts(self) -> (Vec<R>, Option<Cursor>) {
        (self.rows, self.next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_cursor_is_big_endian() {
        let cursor = Cursor::from(258u64);
        assert_eq!(cursor.as_bytes(), &[0, 0, 0, 0, 0, 0, 1, 2]);
    }

    #[test]
    fn map_keeps_key() {
        let item = Item::new("abc", 2u32).map(|v| v * 10);
        assert_eq!(item.key(), "abc");
        assert_eq!(*item.payload(), 20);
    }
}
