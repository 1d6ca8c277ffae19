use thiserror::Error;

use super::document::{Document, DocumentError, Element};
use super::show::{DynamicRange, Show, ShowPayload, ShowSet};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing required attribute '{0}'")]
    MissingAttribute(String),

    #[error("malformed value for '{0}': {1:?}")]
    MalformedValue(String, String),

    #[error("document has no lightShow/shows collection")]
    StructuralMismatch,

    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Converts `lightShow/shows/*` documents into a [`ShowSet`].
///
/// A document is accepted or rejected as a whole: the first show that fails to parse fails
/// the entire document, and none of its shows are returned.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShowParser;

impl ShowParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_xml(&self, input: &str) -> Result<ShowSet, ParseError> {
        let document = Document::from_xml(input)?;
        self.parse(&document)
    }

    pub fn parse_json(&self, input: &str) -> Result<ShowSet, ParseError> {
        let document = Document::from_json(input)?;
        self.parse(&document)
    }

    pub fn parse(&self, document: &Document) -> Result<ShowSet, ParseError> {
        let collections: Vec<&Element> = document
            .root
            .descendants_named("lightShow")
            .into_iter()
            .flat_map(|light_show| light_show.children_named("shows"))
            .collect();

        if collections.is_empty() {
            return Err(ParseError::StructuralMismatch);
        }

        let mut shows = ShowSet::new();
        for (index, node) in collections
            .iter()
            .flat_map(|shows| shows.children.iter())
            .enumerate()
        {
            let show = parse_show(node).map_err(|err| {
                log::warn!("Show node {} <{}> rejected: {}", index, node.name, err);
                err
            })?;
            log::debug!("Found show {} called '{}'", show.id, show.name);
            shows.push(show);
        }

        Ok(shows)
    }
}

fn parse_show(node: &Element) -> Result<Show, ParseError> {
    let id = int_attribute(node, "id")?;
    let name = required(node, "name")?.to_string();
    let iterations = non_negative(node, "iterations")?;
    let speed = non_negative(node, "speed")?;

    let payload = if node.has_attribute("dynamic") {
        let start = int_attribute(node, "rangeStart")?;
        let end = int_attribute(node, "rangeEnd")?;
        let step = int_attribute(node, "step")?;
        if step <= 0 {
            return Err(malformed("step", required(node, "step")?));
        }
        ShowPayload::Dynamic {
            range: DynamicRange::new(start.into(), end.into(), step.into()),
        }
    } else {
        // Every pattern node first, then every byte node.
        let mut bytes = Vec::new();
        for pattern in node.children_named("pattern") {
            bytes.push(parse_pattern(&pattern.text)?);
        }
        for byte in node.children_named("byte") {
            bytes.push(parse_byte(&byte.text)?);
        }
        ShowPayload::Static { bytes }
    };

    Ok(Show {
        id,
        name,
        iterations: iterations as u32,
        speed_ms: speed as u64,
        payload,
    })
}

fn required<'a>(node: &'a Element, name: &str) -> Result<&'a str, ParseError> {
    node.attribute(name)
        .ok_or_else(|| ParseError::MissingAttribute(name.to_string()))
}

fn int_attribute(node: &Element, name: &str) -> Result<i32, ParseError> {
    let raw = required(node, name)?;
    raw.trim().parse::<i32>().map_err(|_| malformed(name, raw))
}

fn non_negative(node: &Element, name: &str) -> Result<i32, ParseError> {
    let value = int_attribute(node, name)?;
    if value < 0 {
        return Err(malformed(name, required(node, name)?));
    }
    Ok(value)
}

fn parse_pattern(raw: &str) -> Result<u8, ParseError> {
    let digits = raw.trim();
    if digits.is_empty() || digits.len() > 8 || !digits.bytes().all(|b| b == b'0' || b == b'1') {
        return Err(malformed("pattern", raw));
    }
    u8::from_str_radix(digits, 2).map_err(|_| malformed("pattern", raw))
}

fn parse_byte(raw: &str) -> Result<u8, ParseError> {
    raw.trim()
        .parse::<i32>()
        .map(|value| value as u8)
        .map_err(|_| malformed("byte", raw))
}

fn malformed(field: &str, raw: &str) -> ParseError {
    ParseError::MalformedValue(field.to_string(), raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIXED: &str = r#"
        <lightShow>
          <shows>
            <show id="1" name="Chase" iterations="2" speed="50">
              <byte>255</byte>
              <pattern>00000001</pattern>
              <pattern>10000000</pattern>
              <byte>7</byte>
            </show>
            <show id="2" name="Ramp" iterations="1" speed="0" dynamic="true"
                  rangeStart="0" rangeEnd="255" step="5"/>
          </shows>
        </lightShow>"#;

    #[test]
    fn test_patterns_before_bytes() {
        let shows = ShowParser::new().parse_xml(MIXED).unwrap();
        assert_eq!(shows.len(), 2);

        let chase = shows.iter().next().unwrap();
        assert_eq!(chase.id, 1);
        assert_eq!(chase.iterations, 2);
        assert_eq!(chase.speed_ms, 50);
        assert_eq!(
            chase.payload,
            ShowPayload::Static {
                bytes: vec![0b0000_0001, 0b1000_0000, 255, 7]
            }
        );
    }

    #[test]
    fn test_parsing_is_repeatable() {
        let parser = ShowParser::new();
        let json = r#"{"lightShow":{"shows":{"show":[
            {"@id":"1","@name":"Chase","@iterations":"2","@speed":"50","pattern":["00000001","10000000"],"byte":7},
            {"@id":"2","@name":"Ramp","@iterations":"1","@speed":"0","@dynamic":"true","@rangeStart":"0","@rangeEnd":"10","@step":"5"}
        ]}}}"#;

        let first = parser.parse_xml(MIXED).unwrap();
        let second = parser.parse_xml(MIXED).unwrap();
        assert_eq!(first, second);

        let first = parser.parse_json(json).unwrap();
        let second = parser.parse_json(json).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_dynamic_show_ignores_children() {
        let doc = r#"<lightShow><shows>
            <show id="3" name="D" iterations="1" speed="9" dynamic="" rangeStart="1" rangeEnd="3" step="1">
              <byte>9</byte>
            </show></shows></lightShow>"#;
        let shows = ShowParser::new().parse_xml(doc).unwrap();
        let show = shows.iter().next().unwrap();
        assert!(show.is_dynamic());
        assert_eq!(
            show.payload,
            ShowPayload::Dynamic {
                range: DynamicRange::new(1, 3, 1)
            }
        );
    }

    #[test]
    fn test_missing_attribute() {
        let doc = r#"<lightShow><shows><show id="1" iterations="1" speed="1"/></shows></lightShow>"#;
        assert_eq!(
            ShowParser::new().parse_xml(doc),
            Err(ParseError::MissingAttribute("name".to_string()))
        );
    }

    #[test]
    fn test_dynamic_requires_range() {
        let doc = r#"<lightShow><shows>
            <show id="1" name="D" iterations="1" speed="1" dynamic="1" rangeStart="0" step="1"/>
            </shows></lightShow>"#;
        assert_eq!(
            ShowParser::new().parse_xml(doc),
            Err(ParseError::MissingAttribute("rangeEnd".to_string()))
        );
    }

    #[test]
    fn test_malformed_values() {
        let cases = [
            (r#"<show id="x" name="a" iterations="1" speed="1"/>"#, "id", "x"),
            (r#"<show id="1" name="a" iterations="-1" speed="1"/>"#, "iterations", "-1"),
            (
                r#"<show id="1" name="a" iterations="1" speed="1"><pattern>0102</pattern></show>"#,
                "pattern",
                "0102",
            ),
            (
                r#"<show id="1" name="a" iterations="1" speed="1"><pattern>111111111</pattern></show>"#,
                "pattern",
                "111111111",
            ),
            (
                r#"<show id="1" name="a" iterations="1" speed="1"><byte>ten</byte></show>"#,
                "byte",
                "ten",
            ),
            (
                r#"<show id="1" name="a" iterations="1" speed="1" dynamic="1" rangeStart="0" rangeEnd="4" step="0"/>"#,
                "step",
                "0",
            ),
        ];

        for (show, field, raw) in cases {
            let doc = format!("<lightShow><shows>{}</shows></lightShow>", show);
            assert_eq!(
                ShowParser::new().parse_xml(&doc),
                Err(ParseError::MalformedValue(field.to_string(), raw.to_string())),
                "{}",
                show
            );
        }
    }

    #[test]
    fn test_byte_values_truncate() {
        let doc = r#"<lightShow><shows><show id="1" name="a" iterations="1" speed="1">
            <byte> 256 </byte><byte>-1</byte></show></shows></lightShow>"#;
        let shows = ShowParser::new().parse_xml(doc).unwrap();
        assert_eq!(
            shows.iter().next().unwrap().payload,
            ShowPayload::Static { bytes: vec![0, 255] }
        );
    }

    #[test]
    fn test_structural_mismatch() {
        assert_eq!(
            ShowParser::new().parse_xml("<lightShow><items/></lightShow>"),
            Err(ParseError::StructuralMismatch)
        );
        assert_eq!(
            ShowParser::new().parse_xml("<shows><show/></shows>"),
            Err(ParseError::StructuralMismatch)
        );
    }

    #[test]
    fn test_empty_collection_is_empty_set() {
        let shows = ShowParser::new()
            .parse_xml("<lightShow><shows/></lightShow>")
            .unwrap();
        assert!(shows.is_empty());
    }

    #[test]
    fn test_nested_light_show() {
        let doc = r#"<envelope><lightShow><shows>
            <show id="1" name="a" iterations="1" speed="1"><byte>1</byte></show>
            </shows></lightShow></envelope>"#;
        assert_eq!(ShowParser::new().parse_xml(doc).unwrap().len(), 1);
    }

    #[test]
    fn test_json_document() {
        let json = r#"{"lightShow":{"shows":{"show":[
            {"@id":"1","@name":"Blink","@iterations":"3","@speed":"100","pattern":["11111111","00000000"]},
            {"@id":"2","@name":"Count","@iterations":"1","@speed":"0","@dynamic":"true",
             "@rangeStart":"0","@rangeEnd":"10","@step":"2"}
        ]}}}"#;

        let shows = ShowParser::new().parse_json(json).unwrap();
        let shows: Vec<&Show> = shows.iter().collect();
        assert_eq!(shows.len(), 2);
        assert_eq!(shows[0].name, "Blink");
        assert_eq!(shows[0].total_writes(), 6);
        assert_eq!(shows[1].writes_per_iteration(), 6);
    }

    #[test]
    fn test_duplicate_ids_coexist() {
        let doc = r#"<lightShow><shows>
            <show id="1" name="a" iterations="1" speed="1"/>
            <show id="1" name="b" iterations="1" speed="1"/>
            </shows></lightShow>"#;
        let names: Vec<String> = ShowParser::new()
            .parse_xml(doc)
            .unwrap()
            .into_iter()
            .map(|show| show.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
