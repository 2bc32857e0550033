//! Typed view of the parts of a SpreadsheetML 2003 document the catalog uses.
//!
//! Elements are matched by local name, so `ss:`-prefixed and default-namespace
//! documents read the same. Anything outside the
//! `Workbook > Worksheet > Table > Row > Cell` chain is ignored.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::CatalogError;

/// Highest column a SpreadsheetML 2003 worksheet can address.
pub const MAX_COLUMNS: usize = 256;

#[derive(Debug, Default)]
pub struct Workbook {
    pub worksheets: Vec<Worksheet>,
}

#[derive(Debug, Default)]
pub struct Worksheet {
    pub name: Option<String>,
    pub table: Option<Table>,
}

#[derive(Debug, Default)]
pub struct Table {
    pub rows: Vec<Row>,
}

#[derive(Debug, Default)]
pub struct Row {
    pub cells: Vec<Cell>,
}

#[derive(Debug, Default, Clone)]
pub struct Cell {
    pub text: String,
}

impl Row {
    /// Trimmed text of the cell at `index`, or `""` when the row is shorter.
    pub fn text(&self, index: usize) -> &str {
        self.cells.get(index).map_or("", |cell| cell.text.trim())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Workbook {
    /// The first worksheet that carries a table.
    pub fn first_table(&self) -> Option<(&Worksheet, &Table)> {
        self.worksheets
            .iter()
            .find_map(|sheet| sheet.table.as_ref().map(|table| (sheet, table)))
    }
}

/// Decodes `raw` into a [`Workbook`]. Fails when the markup is not well formed
/// or no `Workbook` element encloses the content.
pub fn read_workbook(raw: &str) -> Result<Workbook, CatalogError> {
    let mut reader = Reader::from_str(raw);
    let mut builder = TreeBuilder::default();

    loop {
        let event = reader.read_event().map_err(|e| {
            CatalogError::Parse(format!(
                "malformed markup near byte {}: {e}",
                reader.buffer_position()
            ))
        })?;
        match event {
            Event::Start(start) => builder.open(&start),
            Event::Empty(start) => {
                builder.open(&start);
                builder.close(start.local_name().as_ref())?;
            }
            Event::End(end) => builder.close(end.local_name().as_ref())?,
            Event::Text(text) if builder.collecting_text() => {
                let text = text
                    .unescape()
                    .map_err(|e| CatalogError::Parse(format!("invalid cell text: {e}")))?;
                builder.push_text(&text);
            }
            Event::CData(data) if builder.collecting_text() => {
                builder.push_text(&String::from_utf8_lossy(&data));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    builder.finish()
}

#[derive(Debug)]
struct PendingCell {
    index: Option<usize>,
    text: String,
    comment_depth: usize,
}

#[derive(Debug, Default)]
struct TreeBuilder {
    workbook: Option<Workbook>,
    workbook_closed: bool,
    sheet: Option<Worksheet>,
    table: Option<Table>,
    row: Option<Row>,
    cell: Option<PendingCell>,
}

impl TreeBuilder {
    fn collecting_text(&self) -> bool {
        self.cell.as_ref().is_some_and(|c| c.comment_depth == 0)
    }

    fn push_text(&mut self, text: &str) {
        if let Some(cell) = self.cell.as_mut() {
            cell.text.push_str(text);
        }
    }

    fn open(&mut self, start: &BytesStart<'_>) {
        let name = start.local_name();
        let name = name.as_ref();

        // Inside a cell only comments matter; everything else is formatting.
        if let Some(cell) = self.cell.as_mut() {
            if name == b"Comment" {
                cell.comment_depth += 1;
            }
            return;
        }

        match name {
            b"Workbook" if self.workbook.is_none() => self.workbook = Some(Workbook::default()),
            b"Worksheet" if self.workbook.is_some() && self.sheet.is_none() => {
                self.sheet = Some(Worksheet {
                    name: attribute(start, b"Name"),
                    table: None,
                });
            }
            b"Table" if self.sheet.as_ref().is_some_and(|s| s.table.is_none()) && self.table.is_none() => {
                self.table = Some(Table::default());
            }
            b"Row" if self.table.is_some() && self.row.is_none() => self.row = Some(Row::default()),
            b"Cell" if self.row.is_some() => {
                self.cell = Some(PendingCell {
                    index: attribute(start, b"Index").and_then(|v| v.trim().parse().ok()),
                    text: String::new(),
                    comment_depth: 0,
                });
            }
            _ => {}
        }
    }

    fn close(&mut self, name: &[u8]) -> Result<(), CatalogError> {
        if let Some(cell) = self.cell.as_mut() {
            match name {
                b"Comment" => cell.comment_depth = cell.comment_depth.saturating_sub(1),
                b"Cell" => self.finish_cell()?,
                _ => {}
            }
            return Ok(());
        }

        match name {
            b"Row" => {
                if let (Some(row), Some(table)) = (self.row.take(), self.table.as_mut()) {
                    table.rows.push(row);
                }
            }
            b"Table" => {
                if let (Some(table), Some(sheet)) = (self.table.take(), self.sheet.as_mut()) {
                    sheet.table = Some(table);
                }
            }
            b"Worksheet" => {
                if let (Some(sheet), Some(workbook)) = (self.sheet.take(), self.workbook.as_mut()) {
                    workbook.worksheets.push(sheet);
                }
            }
            b"Workbook" if self.workbook.is_some() => self.workbook_closed = true,
            _ => {}
        }
        Ok(())
    }

    fn finish_cell(&mut self) -> Result<(), CatalogError> {
        let (Some(cell), Some(row)) = (self.cell.take(), self.row.as_mut()) else {
            return Ok(());
        };
        let next = row.cells.len() + 1;
        // `ss:Index` is 1-based and may only skip forward over empty cells.
        if let Some(index) = cell.index {
            if index < next || index > MAX_COLUMNS {
                return Err(CatalogError::Parse(format!(
                    "cell index {index} out of range {next}..={MAX_COLUMNS}"
                )));
            }
            row.cells.resize(index - 1, Cell::default());
        } else if next > MAX_COLUMNS {
            return Err(CatalogError::Parse(format!(
                "row has more than {MAX_COLUMNS} cells"
            )));
        }
        row.cells.push(Cell { text: cell.text });
        Ok(())
    }

    fn finish(self) -> Result<Workbook, CatalogError> {
        match self.workbook {
            None => Err(CatalogError::Parse("no Workbook element found".into())),
            Some(_) if !self.workbook_closed => Err(CatalogError::Parse(
                "document ended before </Workbook>".into(),
            )),
            Some(workbook) => Ok(workbook),
        }
    }
}

fn attribute(start: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    start
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == local)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}
