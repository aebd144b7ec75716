//! Decoder for `efetch.fcgi` GenBank XML responses (`GBSet` documents).

use quick_xml::events::Event;
use serde::Serialize;
use tracing::debug;

use crate::error::QueryError;
use crate::xml::{self, Depth};

pub const SCHEMA: &str = "GBSet";

const RECORD: &[u8] = b"GBSeq";
const GI_TAG: &str = "gi";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Qualifier {
    pub name: String,
    pub value: String,
}

/// Metadata of one `GBSeq` record. Every field is optional: a record counts
/// even when nothing inside it could be read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SequenceRecord {
    pub accession_version: Option<String>,
    pub gi: Option<u64>,
    pub sequence: Option<String>,
    pub qualifiers: Vec<Qualifier>,
}

impl SequenceRecord {
    pub fn qualifier(&self, name: &str) -> Option<&str> {
        self.qualifiers
            .iter()
            .find(|qualifier| qualifier.name == name)
            .map(|qualifier| qualifier.value.as_str())
    }

    pub fn organism(&self) -> Option<&str> {
        self.qualifier("organism")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResult {
    /// Number of `GBSeq` elements in the payload.
    pub record_count: u64,
    pub records: Vec<SequenceRecord>,
}

impl FetchResult {
    pub fn parse(payload: &[u8]) -> Result<Self, QueryError> {
        let mut reader = xml::reader(payload);
        let mut depth = Depth::default();
        let mut result = FetchResult::default();
        let mut current: Option<SequenceRecord> = None;
        // Name half of a qualifier pair, waiting for its GBQualifier_value sibling.
        let mut pending_name: Option<String> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|err| xml::decode_error(&reader, SCHEMA, err))?;
            match event {
                Event::Start(start) => {
                    let local = start.local_name();
                    let name = local.as_ref();

                    if let Some(qualifier_name) = pending_name.take() {
                        if name == b"GBQualifier_value" {
                            depth.touch();
                            let value = xml::element_text(&mut reader, &start, SCHEMA)?;
                            if let Some(record) = current.as_mut() {
                                record.qualifiers.push(Qualifier {
                                    name: qualifier_name,
                                    value,
                                });
                            }
                            continue;
                        }
                        drop_qualifier(&qualifier_name, name);
                    }

                    match name {
                        b"GBSeq" => {
                            if let Some(record) = current.take() {
                                result.records.push(record);
                            }
                            current = Some(SequenceRecord::default());
                            result.record_count += 1;
                            depth.enter();
                        }
                        b"GBSeq_sequence" => {
                            depth.touch();
                            let sequence = xml::element_text(&mut reader, &start, SCHEMA)?;
                            if let Some(record) = current.as_mut() {
                                record.sequence = Some(sequence);
                            }
                        }
                        b"GBSeq_accession-version" => {
                            depth.touch();
                            let accession = xml::element_text(&mut reader, &start, SCHEMA)?;
                            if let Some(record) = current.as_mut() {
                                record.accession_version = Some(accession);
                            }
                        }
                        b"GBSeqid" => {
                            depth.touch();
                            let seqid = xml::element_text(&mut reader, &start, SCHEMA)?;
                            if let (Some(gi), Some(record)) = (gi_from_seqid(&seqid), current.as_mut())
                            {
                                record.gi = Some(gi);
                            }
                        }
                        b"GBQualifier_name" => {
                            depth.touch();
                            pending_name = Some(xml::element_text(&mut reader, &start, SCHEMA)?);
                        }
                        _ => depth.enter(),
                    }
                }
                Event::Empty(empty) => {
                    let local = empty.local_name();
                    if let Some(qualifier_name) = pending_name.take() {
                        if local.as_ref() == b"GBQualifier_value" {
                            depth.touch();
                            if let Some(record) = current.as_mut() {
                                record.qualifiers.push(Qualifier {
                                    name: qualifier_name,
                                    value: String::new(),
                                });
                            }
                            continue;
                        }
                        drop_qualifier(&qualifier_name, local.as_ref());
                    }
                    if local.as_ref() == RECORD {
                        if let Some(record) = current.take() {
                            result.records.push(record);
                        }
                        result.records.push(SequenceRecord::default());
                        result.record_count += 1;
                    }
                    depth.touch();
                }
                Event::End(end) => {
                    if let Some(qualifier_name) = pending_name.take() {
                        drop_qualifier(&qualifier_name, end.local_name().as_ref());
                    }
                    if end.local_name().as_ref() == RECORD {
                        if let Some(record) = current.take() {
                            result.records.push(record);
                        }
                    }
                    depth.leave();
                }
                Event::Eof => break,
                _ => {}
            }
        }

        depth.finish(SCHEMA)?;
        Ok(result)
    }
}

/// `gi|1040737823` yields `1040737823`; any other prefix (for example
/// `gb|KU530525.1|`) or a non-numeric second part yields nothing.
pub fn gi_from_seqid(seqid: &str) -> Option<u64> {
    let mut parts = seqid.split('|');
    if parts.next()? != GI_TAG {
        return None;
    }
    parts.next()?.trim().parse().ok()
}

fn drop_qualifier(name: &str, found: &[u8]) {
    debug!(
        qualifier = name,
        found = %String::from_utf8_lossy(found),
        "qualifier name not followed by GBQualifier_value, pair dropped"
    );
}
