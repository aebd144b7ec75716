use std::borrow::Cow;

use quick_xml::escape::unescape;
use quick_xml::events::BytesStart;
use quick_xml::reader::Reader;

use crate::error::QueryError;

pub(crate) fn reader(payload: &[u8]) -> Reader<&[u8]> {
    let mut reader = Reader::from_reader(payload);
    reader.config_mut().trim_text(true);
    reader
}

/// Reads the text of the element opened by `start` up to and including its
/// closing tag, trimmed and with entities resolved.
pub(crate) fn element_text(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart<'_>,
    schema: &'static str,
) -> Result<String, QueryError> {
    let raw = reader
        .read_text(start.name())
        .map_err(|err| decode_error(reader, schema, err))?;
    let trimmed = raw.trim();
    match unescape(trimmed) {
        Ok(Cow::Borrowed(text)) => Ok(text.to_string()),
        Ok(Cow::Owned(text)) => Ok(text),
        Err(err) => Err(QueryError::xml(
            schema,
            format!(
                "{err} in <{}> (at byte {})",
                String::from_utf8_lossy(start.local_name().as_ref()),
                reader.buffer_position()
            ),
        )),
    }
}

pub(crate) fn element_number(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart<'_>,
    schema: &'static str,
) -> Result<u64, QueryError> {
    let text = element_text(reader, start, schema)?;
    text.parse::<u64>().map_err(|_| {
        QueryError::xml(
            schema,
            format!(
                "expected an unsigned integer in <{}>, found {text:?}",
                String::from_utf8_lossy(start.local_name().as_ref())
            ),
        )
    })
}

/// Consumes the whole subtree of `start` without looking inside it.
pub(crate) fn skip_element(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart<'_>,
    schema: &'static str,
) -> Result<(), QueryError> {
    reader
        .read_to_end(start.name())
        .map(|_| ())
        .map_err(|err| decode_error(reader, schema, err))
}

pub(crate) fn decode_error(
    reader: &Reader<&[u8]>,
    schema: &'static str,
    err: quick_xml::Error,
) -> QueryError {
    QueryError::xml(
        schema,
        format!("{err} (at byte {})", reader.error_position()),
    )
}

/// Open-element bookkeeping so a truncated document is reported instead of
/// silently accepted at end of input.
#[derive(Debug, Default)]
pub(crate) struct Depth {
    open: usize,
    seen_root: bool,
}

impl Depth {
    pub(crate) fn enter(&mut self) {
        self.open += 1;
        self.seen_root = true;
    }

    pub(crate) fn touch(&mut self) {
        self.seen_root = true;
    }

    pub(crate) fn leave(&mut self) {
        self.open = self.open.saturating_sub(1);
    }

    pub(crate) fn finish(&self, schema: &'static str) -> Result<(), QueryError> {
        if !self.seen_root {
            return Err(QueryError::xml(schema, "premature end of document: no root element"));
        }
        if self.open > 0 {
            return Err(QueryError::xml(
                schema,
                format!("premature end of document: {} unclosed element(s)", self.open),
            ));
        }
        Ok(())
    }
}
