// XML reply bodies to (tag, time, value) records
use crate::application::importer::{ReplyFormat, ReplyRecord};
use quick_xml::events::Event;
use quick_xml::Reader;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Tag,
    Time,
    Value,
}

/// Where records sit in a provider's document and which child holds what.
struct Layout {
    format: ReplyFormat,
}

impl Layout {
    fn opens_record(&self, name: &[u8], depth: usize) -> bool {
        match self.format {
            // wfs:FeatureCollection > wfs:member > BsWfs:BsWfsElement
            ReplyFormat::Fmi => name == b"BsWfsElement",
            // events > event
            ReplyFormat::Fingrid => depth == 2,
        }
    }

    fn field(&self, name: &[u8]) -> Option<Field> {
        match (self.format, name) {
            (ReplyFormat::Fmi, b"ParameterName") => Some(Field::Tag),
            (ReplyFormat::Fmi, b"Time") => Some(Field::Time),
            (ReplyFormat::Fmi, b"ParameterValue") => Some(Field::Value),
            // Points are stamped with the start of their interval
            (ReplyFormat::Fingrid, b"start_time") => Some(Field::Time),
            (ReplyFormat::Fingrid, b"value") => Some(Field::Value),
            _ => None,
        }
    }
}

/// Extracts every record of a reply. Records missing a field keep it empty
/// and are rejected later when their time or value fails to parse.
pub fn parse_records(
    body: &str,
    format: ReplyFormat,
) -> Result<Vec<ReplyRecord>, quick_xml::Error> {
    let layout = Layout { format };
    let mut reader = Reader::from_str(body);
    reader.trim_text(true);

    let mut records = Vec::new();
    let mut depth = 0usize;
    // Open record and the depth of its element
    let mut record: Option<(usize, ReplyRecord)> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event()? {
            Event::Start(element) => {
                depth += 1;
                let name = element.local_name();
                if record.is_none() {
                    if layout.opens_record(name.as_ref(), depth) {
                        record = Some((depth, ReplyRecord::default()));
                    }
                } else {
                    field = layout.field(name.as_ref());
                }
            }
            Event::Text(text) => {
                if let (Some(field), Some((_, current))) = (field, record.as_mut()) {
                    let text = text.unescape()?.into_owned();
                    match field {
                        Field::Tag => current.tag = Some(text),
                        Field::Time => current.time = text,
                        Field::Value => current.value = text,
                    }
                }
            }
            Event::End(_) => {
                if matches!(record, Some((open_depth, _)) if open_depth == depth) {
                    if let Some((_, finished)) = record.take() {
                        records.push(finished);
                    }
                }
                field = None;
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(records)
}
