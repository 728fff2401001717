//! Tab-separated writers for the taxonomy table and the review reports.
//!
//! Every writer emits its header even when there are no rows, uses `\n`
//! line endings and never quotes. Text reaching these writers has already
//! been scrubbed of tabs and line breaks, so an unquoted cell is always a
//! single cell.

use std::io::Write;

use crate::error::TaxalignError;
use crate::model::{DuplicateRow, GenusEntry, Issue, TaxonRecord, UnmatchedRow, TAXON_COLUMNS};
use crate::normalize::scrub_field;

fn tsv_writer<W: Write>(out: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(out)
}

fn io_err(e: impl std::fmt::Display) -> TaxalignError {
    TaxalignError::Io(e.to_string())
}

fn finish<W: Write>(mut wtr: csv::Writer<W>) -> Result<(), TaxalignError> {
    wtr.flush().map_err(io_err)
}

pub fn write_taxa<W: Write>(out: W, table: &[TaxonRecord]) -> Result<(), TaxalignError> {
    let mut wtr = tsv_writer(out);
    wtr.write_record(TAXON_COLUMNS).map_err(io_err)?;
    for r in table {
        let id = |v: &Option<crate::model::TaxonId>| v.as_ref().map(|i| i.to_string()).unwrap_or_default();
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        wtr.write_record([
            r.taxon_id.to_string(),
            id(&r.accepted_name_usage_id),
            id(&r.parent_name_usage_id),
            text(&r.scientific_name),
            text(&r.taxon_rank),
            text(&r.scientific_name_authorship),
            text(&r.taxonomic_status),
            text(&r.nomenclatural_status),
            text(&r.taxon_remarks),
            text(&r.kingdom),
            text(&r.phylum),
            text(&r.class),
            text(&r.order),
            text(&r.family),
            text(&r.genus),
            text(&r.species),
        ])
        .map_err(io_err)?;
    }
    finish(wtr)
}

pub fn write_genus_whitelist<W: Write>(out: W, genera: &[GenusEntry]) -> Result<(), TaxalignError> {
    let mut wtr = tsv_writer(out);
    wtr.write_record(["scientific_name", "rank"]).map_err(io_err)?;
    for g in genera {
        wtr.write_record([g.scientific_name.as_str(), g.rank]).map_err(io_err)?;
    }
    finish(wtr)
}

pub fn write_duplicates<W: Write>(out: W, rows: &[DuplicateRow]) -> Result<(), TaxalignError> {
    let mut wtr = tsv_writer(out);
    wtr.write_record(["valid_name", "query_name", "best_match", "taxon_id", "author"])
        .map_err(io_err)?;
    for d in rows {
        wtr.write_record([
            d.valid_name.as_str(),
            d.query_name.as_str(),
            d.best_match.as_str(),
            d.taxon_id.as_str(),
            d.author.as_deref().unwrap_or(""),
        ])
        .map_err(io_err)?;
    }
    finish(wtr)
}

pub fn write_unmatched<W: Write>(out: W, rows: &[UnmatchedRow]) -> Result<(), TaxalignError> {
    let mut wtr = tsv_writer(out);
    wtr.write_record(["query_name"]).map_err(io_err)?;
    for u in rows {
        wtr.write_record([u.query_name.as_str()]).map_err(io_err)?;
    }
    finish(wtr)
}

pub fn write_issues<W: Write>(out: W, rows: &[Issue]) -> Result<(), TaxalignError> {
    let mut wtr = tsv_writer(out);
    wtr.write_record(["kind", "subject", "detail"]).map_err(io_err)?;
    for i in rows {
        // Error text comes from transports and may carry line breaks.
        wtr.write_record([i.kind.to_string(), scrub_field(&i.subject), scrub_field(&i.detail)])
            .map_err(io_err)?;
    }
    finish(wtr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IssueKind, TaxonId};

    fn render<F>(f: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> Result<(), TaxalignError>,
    {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn taxa_header_and_nulls_as_empty() {
        let mut r = TaxonRecord::new(TaxonId::from(101u64));
        r.scientific_name = Some("Nitzschia".into());
        r.taxon_rank = Some("Genus".into());
        let out = render(|buf| write_taxa(buf, &[r]));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], TAXON_COLUMNS.join("\t"));
        assert_eq!(lines[1].split('\t').count(), 16);
        assert!(lines[1].starts_with("101\t\t\tNitzschia\tGenus\t"));
        assert!(out.ends_with('\n'));
        assert!(!out.contains('\r'));
    }

    #[test]
    fn empty_reports_still_have_headers() {
        assert_eq!(render(|b| write_taxa(b, &[])).lines().count(), 1);
        assert_eq!(render(|b| write_genus_whitelist(b, &[])), "scientific_name\trank\n");
        assert_eq!(
            render(|b| write_duplicates(b, &[])),
            "valid_name\tquery_name\tbest_match\ttaxon_id\tauthor\n"
        );
        assert_eq!(render(|b| write_unmatched(b, &[])), "query_name\n");
        assert_eq!(render(|b| write_issues(b, &[])), "kind\tsubject\tdetail\n");
    }

    #[test]
    fn no_quoting_of_special_characters() {
        let rows = vec![UnmatchedRow { query_name: "Nitzschia \"acicularis\", s.l.".into() }];
        let out = render(|b| write_unmatched(b, &rows));
        assert_eq!(out, "query_name\nNitzschia \"acicularis\", s.l.\n");
    }

    #[test]
    fn issue_detail_line_breaks_flattened() {
        let rows = vec![Issue {
            kind: IssueKind::LookupFailure,
            subject: "Amphora".into(),
            detail: "HTTP 500\nbody:\tinternal".into(),
        }];
        let out = render(|b| write_issues(b, &rows));
        assert_eq!(out.lines().count(), 2);
        assert_eq!(out.lines().nth(1), Some("lookup_failure\tAmphora\tHTTP 500 body: internal"));
    }
}
