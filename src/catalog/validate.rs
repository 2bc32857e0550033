use crate::error::ValidationError;

/// Container elements every SpreadsheetML catalog must contain, outermost first.
pub const REQUIRED_ELEMENTS: [&str; 5] = ["Workbook", "Worksheet", "Table", "Row", "Cell"];

/// Cheap textual pre-check run before the XML parse. Returns `false` for blank
/// input or when any required container element is absent.
pub fn validate(raw: &str) -> bool {
    check(raw).is_ok()
}

/// Same as [`validate`] but reports the first reason for rejection.
pub fn check(raw: &str) -> Result<(), ValidationError> {
    if raw.trim().is_empty() {
        return Err(ValidationError::Empty);
    }
    match REQUIRED_ELEMENTS
        .into_iter()
        .find(|name| !has_element_opening(raw, name))
    {
        Some(name) => Err(ValidationError::MissingMarker(name)),
        None => Ok(()),
    }
}

/// True when `raw` contains `<Name` or `<prefix:Name` followed by whitespace,
/// `>` or `/`, so `<Rows>` does not count as a `Row`.
fn has_element_opening(raw: &str, name: &str) -> bool {
    raw.match_indices(name).any(|(start, _)| {
        let before = &raw[..start];
        let opens = before.ends_with('<') || prefixed_opening(before);
        let after = raw[start + name.len()..].chars().next();
        opens && matches!(after, Some(c) if c.is_whitespace() || c == '>' || c == '/')
    })
}

fn prefixed_opening(before: &str) -> bool {
    let Some(prefix_end) = before.strip_suffix(':') else {
        return false;
    };
    // Byte offset just past the last character that cannot be part of a prefix.
    let prefix_start = prefix_end
        .char_indices()
        .rev()
        .find(|&(_, c)| !(c.is_alphanumeric() || c == '_' || c == '-' || c == '.'))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    prefix_start > 0
        && prefix_start < prefix_end.len()
        && prefix_end[..prefix_start].ends_with('<')
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"<?xml version="1.0"?>
<Workbook xmlns="urn:schemas-microsoft-com:office:spreadsheet">
  <Worksheet ss:Name="Templates">
    <Table>
      <Row><Cell><Data ss:Type="String">Category</Data></Cell></Row>
    </Table>
  </Worksheet>
</Workbook>"#;

    #[test]
    fn accepts_document_with_all_markers() {
        assert!(validate(MINIMAL));
        assert_eq!(check(MINIMAL), Ok(()));
    }

    #[test]
    fn accepts_prefixed_elements() {
        let prefixed = "<ss:Workbook><ss:Worksheet><ss:Table><ss:Row><ss:Cell/></ss:Row></ss:Table></ss:Worksheet></ss:Workbook>";
        assert!(validate(prefixed));
    }

    #[test]
    fn rejects_blank_input() {
        assert!(!validate(""));
        assert_eq!(check(" \n\t "), Err(ValidationError::Empty));
    }

    #[test]
    fn rejects_each_missing_marker() {
        for name in REQUIRED_ELEMENTS {
            let broken = MINIMAL
                .replace(&format!("<{name}"), "<Other")
                .replace(&format!("</{name}>"), "</Other>");
            assert_eq!(
                check(&broken),
                Err(ValidationError::MissingMarker(name)),
                "document without <{name}> must be rejected"
            );
        }
    }

    #[test]
    fn similar_names_are_not_markers() {
        let doc = "<Workbook><Worksheet><Table><Rows><Cell/></Rows></Table></Worksheet></Workbook>";
        assert_eq!(check(doc), Err(ValidationError::MissingMarker("Row")));
    }

    #[test]
    fn non_ascii_text_next_to_names_is_not_a_marker() {
        let doc = "<Worksheet><Table><Row><Cell>€:Workbook </Cell></Row></Table></Worksheet>";
        assert!(!validate(doc));
        assert_eq!(check(doc), Err(ValidationError::MissingMarker("Workbook")));

        for text in ["→:Workbook>", "“ss:Workbook ", "<é:Workbook>€", "€<Workbook>"] {
            assert!(!validate(text), "{text:?}");
        }
        let accented = "<ünï:Workbook><Worksheet><Table><Row><Cell>“€”</Cell></Row></Table></Worksheet></ünï:Workbook>";
        assert!(validate(accented));
    }

    #[test]
    fn plain_text_mentioning_names_is_rejected() {
        assert!(!validate("Workbook Worksheet Table Row Cell"));
    }
}
