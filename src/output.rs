use std::io::{self, Write};

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::controller::{QueryEvent, QuerySink, RunSummary};
use crate::efetch::SequenceRecord;
use crate::error::QueryError;

/// Writes one JSON object per fetched record to stdout; progress goes to the log.
pub struct JsonOutput;

#[derive(Serialize)]
struct SummaryLine<'a> {
    #[serde(flatten)]
    summary: &'a RunSummary,
    finished_at: String,
}

impl JsonOutput {
    pub fn print_summary(summary: &RunSummary) -> Result<(), QueryError> {
        Self::print_json(&SummaryLine {
            summary,
            finished_at: Utc::now().to_rfc3339(),
        })
    }

    fn print_json<T: Serialize>(value: &T) -> Result<(), QueryError> {
        write_json_line(&mut io::stdout().lock(), value)
    }
}

fn write_json_line<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<(), QueryError> {
    serde_json::to_writer(&mut *out, value).map_err(|err| QueryError::Output(err.to_string()))?;
    out.write_all(b"\n").map_err(QueryError::output)?;
    out.flush().map_err(QueryError::output)
}

impl QuerySink for JsonOutput {
    fn event(&self, event: QueryEvent) {
        match event {
            QueryEvent::SearchIssued { offset } => info!(offset, "searching"),
            QueryEvent::SearchCompleted {
                offset,
                count,
                identifiers,
            } => info!(offset, count, identifiers, "search page received"),
            QueryEvent::FetchIssued {
                offset,
                identifiers,
            } => info!(offset, identifiers, "fetching records"),
            QueryEvent::PageCompleted {
                offset,
                records,
                processed,
                total,
            } => info!(offset, records, "{processed}/{total} records"),
            QueryEvent::Finished { processed, total } => {
                info!(processed, total, "query finished")
            }
            // Already reported by the controller.
            QueryEvent::Failed { .. } => {}
        }
    }

    fn record(&self, record: &SequenceRecord) {
        if let Err(err) = Self::print_json(record) {
            warn!(accession = ?record.accession_version, "{err}");
        }
    }
}
