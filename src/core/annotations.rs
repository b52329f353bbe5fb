//! Footnote rewriting for annotated assistant text.

use crate::api::Annotation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FootnoteKind {
    Citation { quote: Option<String> },
    Download,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footnote {
    pub index: usize,
    pub file_id: String,
    pub filename: String,
    pub kind: FootnoteKind,
}

impl Footnote {
    pub fn render(&self) -> String {
        match &self.kind {
            FootnoteKind::Citation { quote: Some(quote) } if !quote.is_empty() => {
                format!("[{}] {} from {}", self.index, quote, self.filename)
            }
            FootnoteKind::Citation { .. } => format!("[{}] {}", self.index, self.filename),
            FootnoteKind::Download => {
                format!("[{}] {} available in downloads", self.index, self.filename)
            }
        }
    }

    pub fn is_download(&self) -> bool {
        matches!(self.kind, FootnoteKind::Download)
    }
}

pub fn footnote_marker(index: usize) -> String {
    format!(" [{index}]")
}

/// Replace each annotated span in `value` with its footnote marker.
///
/// `spans` pairs each annotation's literal text with its footnote index and
/// must be in the order the service listed them. A cursor walks forward
/// through the text: every span is searched at or after the end of the
/// previous marker, so a replacement can never shift or swallow a later span.
/// A span that cannot be found is left alone; its footnote still applies.
pub fn replace_spans(value: &str, spans: &[(&str, usize)]) -> String {
    let mut text = value.to_string();
    let mut cursor = 0;

    for (span, index) in spans {
        if span.is_empty() {
            continue;
        }
        let Some(offset) = text[cursor..].find(span) else {
            continue;
        };
        let start = cursor + offset;
        let marker = footnote_marker(*index);
        text.replace_range(start..start + span.len(), &marker);
        cursor = start + marker.len();
    }

    text
}

/// Append rendered footnotes after the body, one per line.
pub fn append_footnotes(body: &str, footnotes: &[Footnote]) -> String {
    if footnotes.is_empty() {
        return body.to_string();
    }
    let notes: Vec<String> = footnotes.iter().map(Footnote::render).collect();
    format!("{}\n{}", body, notes.join("\n"))
}

/// The file an annotation refers to, and whether it is a download.
pub fn annotation_file(annotation: &Annotation) -> Option<(&str, FootnoteKind)> {
    match annotation {
        Annotation::FileCitation { file_citation, .. } => Some((
            file_citation.file_id.as_str(),
            FootnoteKind::Citation {
                quote: file_citation.quote.clone(),
            },
        )),
        Annotation::FilePath { file_path, .. } => {
            Some((file_path.file_id.as_str(), FootnoteKind::Download))
        }
        Annotation::Unsupported => None,
    }
}
