use std::collections::HashSet;

use tracing::{debug, info, warn};

use super::validate;
use super::workbook::{read_workbook, Row};
use crate::error::CatalogError;
use crate::models::{TemplateFields, TemplateRecord};

/// Number of catalog columns: category, genre, style, mood, use case, tags, prompt.
pub const CATALOG_COLUMNS: usize = 7;

/// Parses a SpreadsheetML catalog into template records, in row order.
///
/// The first table row is the header. Rows with fewer than
/// [`CATALOG_COLUMNS`] cells, rows missing a category, genre or prompt, and
/// rows whose id repeats an earlier row are skipped; only an invalid or
/// undecodable document fails the whole parse.
pub fn parse(raw: &str) -> Result<Vec<TemplateRecord>, CatalogError> {
    validate::check(raw)?;

    let workbook = read_workbook(raw)?;
    if workbook.worksheets.len() > 1 {
        debug!(worksheets = workbook.worksheets.len(), "Catalog has several worksheets, using the first with a table");
    }
    let (sheet, table) = workbook
        .first_table()
        .ok_or_else(|| CatalogError::Parse("no worksheet contains a Table".into()))?;

    let mut records = Vec::with_capacity(table.rows.len().saturating_sub(1));
    let mut seen: HashSet<String> = HashSet::new();
    let mut skipped = 0usize;

    // Row numbers are 1-based and count the header, matching what a
    // spreadsheet editor shows.
    for (offset, row) in table.rows.iter().enumerate().skip(1) {
        let row_number = offset + 1;
        let Some(record) = record_from_row(row, row_number) else {
            skipped += 1;
            continue;
        };
        if !seen.insert(record.id.clone()) {
            warn!(
                row = row_number,
                id = %record.id,
                category = %record.category_name,
                "Duplicate template id, keeping the earlier row"
            );
            skipped += 1;
            continue;
        }
        records.push(record);
    }

    info!(
        worksheet = sheet.name.as_deref().unwrap_or(""),
        records = records.len(),
        skipped,
        "Parsed template catalog"
    );
    Ok(records)
}

fn record_from_row(row: &Row, row_number: usize) -> Option<TemplateRecord> {
    if row.len() < CATALOG_COLUMNS {
        debug!(row = row_number, cells = row.len(), "Skipping short row");
        return None;
    }

    let fields = TemplateFields {
        category_name: row.text(0).to_string(),
        genre: row.text(1).to_string(),
        style: row.text(2).to_string(),
        mood: row.text(3).to_string(),
        use_case: row.text(4).to_string(),
        tags: row.text(5).to_string(),
        prompt: row.text(6).to_string(),
    };
    if let Some(field) = fields.missing_required() {
        debug!(row = row_number, field, "Skipping row with empty required field");
        return None;
    }

    let record = TemplateRecord::from_fields(fields);
    if record.is_none() {
        debug!(row = row_number, "Skipping row whose category yields an empty id");
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(text: &str) -> String {
        format!(r#"<Cell><Data ss:Type="String">{text}</Data></Cell>"#)
    }

    fn row(cells: &[&str]) -> String {
        let cells: String = cells.iter().map(|c| cell(c)).collect();
        format!("<Row>{cells}</Row>")
    }

    fn document(rows: &[&[&str]]) -> String {
        let header = row(&["Category", "Genre", "Style", "Mood", "Use Case", "Tags", "Prompt"]);
        let body: String = rows.iter().map(|r| row(r)).collect();
        format!(
            r#"<?xml version="1.0"?>
<Workbook xmlns="urn:schemas-microsoft-com:office:spreadsheet"
 xmlns:ss="urn:schemas-microsoft-com:office:spreadsheet">
 <Worksheet ss:Name="Templates">
  <Table>{header}{body}</Table>
 </Worksheet>
</Workbook>"#
        )
    }

    const CHILL: [&str; 7] = [
        "Chill Vibes",
        "Lo-fi",
        "Smooth",
        "Chill",
        "Study",
        "lofi, chill, study",
        "A relaxing lo-fi beat",
    ];

    #[test]
    fn parses_single_row_catalog() {
        let records = parse(&document(&[&CHILL])).unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.id, "chill-vibes");
        assert_eq!(record.category_name, "Chill Vibes");
        assert_eq!(record.genre, "Lo-fi");
        assert_eq!(record.style, "Smooth");
        assert_eq!(record.mood, "Chill");
        assert_eq!(record.use_case, "Study");
        assert_eq!(record.tags, vec!["lofi", "chill", "study"]);
        assert_eq!(record.base_prompt, "A relaxing lo-fi beat");
        assert!(record.status.is_active());
    }

    #[test]
    fn header_only_catalog_yields_nothing() {
        assert!(parse(&document(&[])).unwrap().is_empty());
    }

    #[test]
    fn skips_short_rows_and_rows_missing_required_fields() {
        let short: &[&str] = &["Too Short", "Rock", "x", "y", "z", "tags"];
        let no_genre: &[&str] = &["No Genre", "", "x", "y", "z", "t", "prompt"];
        let no_prompt: &[&str] = &["No Prompt", "Jazz", "x", "y", "z", "t", "   "];
        let no_category: &[&str] = &["", "Jazz", "x", "y", "z", "t", "prompt"];
        let good: &[&str] = &["Night Drive", "Synthwave", "", "", "", "", "Retro synths at night"];

        let records =
            parse(&document(&[short, no_genre, &CHILL, no_prompt, no_category, good])).unwrap();

        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["chill-vibes", "night-drive"]);
        assert!(records[1].tags.is_empty());
    }

    #[test]
    fn values_are_trimmed() {
        let padded: &[&str] = &["  Deep Focus ", " Ambient", "Soft ", " Calm ", " Work ", " a , b ", "  Drones  "];
        let records = parse(&document(&[padded])).unwrap();
        assert_eq!(records[0].category_name, "Deep Focus");
        assert_eq!(records[0].genre, "Ambient");
        assert_eq!(records[0].tags, vec!["a", "b"]);
        assert_eq!(records[0].base_prompt, "Drones");
    }

    #[test]
    fn duplicate_ids_keep_first_row() {
        let mut twin = CHILL;
        twin[0] = "chill  vibes!";
        twin[6] = "A different prompt";

        let records = parse(&document(&[&CHILL, &twin])).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].base_prompt, "A relaxing lo-fi beat");
    }

    #[test]
    fn fingerprints_are_stable_across_parses() {
        let doc = document(&[&CHILL]);
        let first = parse(&doc).unwrap();
        let second = parse(&doc).unwrap();
        assert_eq!(first[0].fingerprint, second[0].fingerprint);
    }

    #[test]
    fn editing_one_field_changes_only_that_fingerprint() {
        let other: &[&str] = &["Night Drive", "Synthwave", "Retro", "Moody", "Driving", "synth", "Retro synths"];
        let mut smoother = CHILL;
        smoother[2] = "Smoother";

        let before = parse(&document(&[&CHILL, other])).unwrap();
        let after = parse(&document(&[&smoother, other])).unwrap();

        assert_ne!(before[0].fingerprint, after[0].fingerprint);
        assert_eq!(before[1].fingerprint, after[1].fingerprint);
    }

    #[test]
    fn invalid_document_fails_validation() {
        let err = parse("   ").unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));

        let err = parse("<Workbook><Worksheet><Table></Table></Worksheet></Workbook>").unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
    }

    #[test]
    fn undecodable_document_fails_parse() {
        let doc = "<Workbook><Worksheet><Table><Row><Cell></Row></Table></Worksheet></Workbook>";
        let err = parse(doc).unwrap_err();
        assert!(matches!(err, CatalogError::Parse(_)));
    }

    #[test]
    fn unreachable_cell_index_fails_parse() {
        let doc = r#"<Workbook><Worksheet><Table><Row><Cell ss:Index="18446744073709551615"><Data>x</Data></Cell></Row></Table></Worksheet></Workbook>"#;
        let err = parse(doc).unwrap_err();
        assert!(matches!(err, CatalogError::Parse(_)));
    }

    #[test]
    fn markers_in_comments_without_table_fail_parse() {
        let doc = "<!-- <Worksheet> <Table> <Row> <Cell> --><Workbook></Workbook>";
        let err = parse(doc).unwrap_err();
        assert!(matches!(err, CatalogError::Parse(_)));
    }
}
