//! Decoder for `esearch.fcgi` responses (`eSearchResult` documents).

use quick_xml::events::Event;
use tracing::debug;

use crate::error::QueryError;
use crate::xml::{self, Depth};

pub const SCHEMA: &str = "eSearchResult";

/// Elements whose subtrees reuse top-level names (`Count` in particular) with a
/// different meaning: inside `TranslationStack` a count may cover the organism
/// alone or the marker alone. They are skipped wholesale.
pub const SHADOWING_WRAPPERS: [&str; 3] = ["TranslationSet", "TranslationStack", "QueryTranslation"];

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    /// Total number of matches on the server.
    pub count: u64,
    /// Echoed `RetMax`.
    pub page_size: u64,
    /// Echoed `RetStart`.
    pub offset: u64,
    /// Identifiers in document order, duplicates kept.
    pub identifiers: Vec<u64>,
}

impl SearchResult {
    pub fn parse(payload: &[u8]) -> Result<Self, QueryError> {
        let mut reader = xml::reader(payload);
        let mut depth = Depth::default();
        let mut result = SearchResult::default();

        loop {
            let event = reader
                .read_event()
                .map_err(|err| xml::decode_error(&reader, SCHEMA, err))?;
            match event {
                Event::Start(start) => {
                    let local = start.local_name();
                    match local.as_ref() {
                        b"Id" => {
                            depth.touch();
                            let id = xml::element_number(&mut reader, &start, SCHEMA)?;
                            result.identifiers.push(id);
                        }
                        b"Count" => {
                            depth.touch();
                            result.count = xml::element_number(&mut reader, &start, SCHEMA)?;
                        }
                        b"RetMax" => {
                            depth.touch();
                            result.page_size = xml::element_number(&mut reader, &start, SCHEMA)?;
                        }
                        b"RetStart" => {
                            depth.touch();
                            result.offset = xml::element_number(&mut reader, &start, SCHEMA)?;
                        }
                        b"ERROR" => {
                            let message = xml::element_text(&mut reader, &start, SCHEMA)?;
                            return Err(QueryError::xml(
                                SCHEMA,
                                format!("server reported an error: {message}"),
                            ));
                        }
                        name if is_shadowing_wrapper(name) => {
                            depth.touch();
                            debug!(
                                element = %String::from_utf8_lossy(name),
                                "skipping wrapper subtree"
                            );
                            xml::skip_element(&mut reader, &start, SCHEMA)?;
                        }
                        _ => depth.enter(),
                    }
                }
                Event::Empty(_) => depth.touch(),
                Event::End(_) => depth.leave(),
                Event::Eof => break,
                _ => {}
            }
        }

        depth.finish(SCHEMA)?;
        Ok(result)
    }
}

fn is_shadowing_wrapper(name: &[u8]) -> bool {
    SHADOWING_WRAPPERS
        .iter()
        .any(|wrapper| wrapper.as_bytes() == name)
}
