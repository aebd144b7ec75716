use std::fs;

use assert_matches::assert_matches;

use ncbi_query::efetch::{FetchResult, gi_from_seqid};
use ncbi_query::error::QueryError;

#[test]
fn parse_records_fixture() {
    let raw = fs::read("tests/fixtures/efetch_records.xml").unwrap();
    let result = FetchResult::parse(&raw).unwrap();

    assert_eq!(result.record_count, 3);
    assert_eq!(result.records.len(), 3);

    let first = &result.records[0];
    assert_eq!(first.accession_version.as_deref(), Some("KU530525.1"));
    assert_eq!(first.gi, Some(1040737823));
    assert_eq!(first.sequence.as_deref(), Some("aactttatacttt"));
    assert_eq!(first.organism(), Some("Idotea pelagica"));
    assert_eq!(first.qualifier("isolate"), Some("IP-07"));
    assert_eq!(
        first.qualifier("country"),
        Some("Portugal: Viana do Castelo")
    );

    let third = &result.records[2];
    assert_eq!(third.accession_version, None);
    assert_eq!(third.gi, None);
    assert!(third.qualifiers.is_empty());
}

#[test]
fn unpaired_qualifier_names_are_dropped() {
    let raw = fs::read("tests/fixtures/efetch_records.xml").unwrap();
    let result = FetchResult::parse(&raw).unwrap();

    let second = &result.records[1];
    let names = second
        .qualifiers
        .iter()
        .map(|q| q.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["organism", "isolate"]);
    assert_eq!(second.qualifier("isolate"), Some("IP-08"));
    assert_eq!(second.qualifier("note"), None);
    assert_eq!(second.qualifier("mol_type"), None);
}

#[test]
fn only_gi_seqids_yield_numbers() {
    assert_eq!(gi_from_seqid("gb|KU530525.1|"), None);
    assert_eq!(gi_from_seqid("gi|1040737823"), Some(1040737823));
}

#[test]
fn record_count_ignores_broken_subfields() {
    let xml = br#"<GBSet>
        <GBSeq><GBSeqid>gi|notanumber</GBSeqid></GBSeq>
        <GBSeq><GBQualifier_name>organism</GBQualifier_name></GBSeq>
        <GBSeq><GBSeqid>ref|NC_1|</GBSeqid><GBQualifier_value>orphan</GBQualifier_value></GBSeq>
        <GBSeq/>
    </GBSet>"#;

    let result = FetchResult::parse(xml).unwrap();
    assert_eq!(result.record_count, 4);
    assert!(result.records.iter().all(|record| record.gi.is_none()));
    assert!(result.records.iter().all(|record| record.qualifiers.is_empty()));
}

#[test]
fn reparsing_is_stable() {
    let raw = fs::read("tests/fixtures/efetch_records.xml").unwrap();
    assert_eq!(
        FetchResult::parse(&raw).unwrap(),
        FetchResult::parse(&raw).unwrap()
    );
}

#[test]
fn malformed_payload_fails() {
    let xml = b"<GBSet><GBSeq><GBSeq_sequence>acgt</GBSeq></GBSet>";
    let err = FetchResult::parse(xml).unwrap_err();
    assert_matches!(err, QueryError::XmlParse { schema: "GBSet", .. });
}

#[test]
fn undefined_entity_fails() {
    let xml = b"<GBSet><GBSeq><GBSeq_sequence>ac&bogus;gt</GBSeq_sequence></GBSeq></GBSet>";
    let err = FetchResult::parse(xml).unwrap_err();
    assert_matches!(err, QueryError::XmlParse { schema: "GBSet", .. });
}

#[test]
fn empty_set_has_no_records() {
    let result = FetchResult::parse(b"<GBSet></GBSet>").unwrap();
    assert_eq!(result.record_count, 0);
}
