//! Encoder for the remote index query mini-language.
//!
//! A query becomes a space-joined sequence of parts of the form
//! `#type(value)`, or `+#type(value)` for a required clause. Part order is
//! significant to the remote index and is preserved exactly.
//!
//! ```ignore
//! let data = QueryData::from_value(&json!({"textQueryType": "meta speech", "text": "cats"}))?;
//! let encoder = encode_query(&data);
//! assert_eq!(encoder.encoded_query(), "#meta(cats) #speech(cats)");
//! assert_eq!(encoder.query_text(), "cats");
//! ```

use super::query::{Clause, QueryData, QueryImage, Selection, SimpleQuery};

/// Clause types with this suffix carry an image reference instead of text.
pub const IMAGE_CLAUSE_SUFFIX: &str = "-i";

/// Accumulates mini-language parts and the human-readable query text.
#[derive(Debug, Clone, Default)]
pub struct QueryEncoder {
    parts: Vec<String>,
    text: Vec<String>,
}

impl QueryEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_part(&mut self, name: &str, value: &str, required: bool) {
        let prefix = if required { "+#" } else { "#" };
        self.parts
            .push(format!("{prefix}{name}({})", escape_parens(value)));
    }

    pub fn add_text(&mut self, text: &str) {
        let text = text.trim();
        if !text.is_empty() {
            self.text.push(text.to_string());
        }
    }

    pub fn encode_simple(&mut self, query: &SimpleQuery) {
        self.encode_query_text(&query.text_query_type, &query.text);
        if let Some(image_type) = &query.image_query_type {
            self.encode_query_images(image_type, &query.query_images);
        }
    }

    pub fn encode_query_text(&mut self, query_type: &str, text: &str) {
        if text.is_empty() || query_type.trim().is_empty() {
            return;
        }
        let text = sanitize_text(text);
        for name in query_type.split_whitespace() {
            self.add_part(name, &text, false);
        }
        self.add_text(&text);
    }

    pub fn encode_query_images(&mut self, query_type: &str, images: &[QueryImage]) {
        if images.is_empty() {
            return;
        }
        let list = format_image_list(images);
        for name in query_type.split_whitespace() {
            self.add_part(name, &list, false);
        }
    }

    pub fn encode_advanced(&mut self, clauses: &[Clause]) {
        for clause in clauses {
            self.encode_clause(clause);
        }
    }

    pub fn encode_clause(&mut self, clause: &Clause) {
        let text = if clause.kind.ends_with(IMAGE_CLAUSE_SUFFIX) {
            clause.text.clone()
        } else {
            let text = sanitize_text(&clause.text);
            self.add_text(&text);
            text
        };
        for name in clause.kind.split_whitespace() {
            self.add_part(name, &text, false);
        }
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn encoded_query(&self) -> String {
        self.parts.join(" ")
    }

    pub fn query_text(&self) -> String {
        self.text.join(" ")
    }
}

pub fn encode_query(data: &QueryData) -> QueryEncoder {
    let mut encoder = QueryEncoder::new();
    match data {
        QueryData::Simple(simple) => encoder.encode_simple(simple),
        QueryData::Advanced { clauses } => encoder.encode_advanced(clauses),
    }
    encoder
}

pub fn escape_parens(value: &str) -> String {
    value.replace('(', "\\(").replace(')', "\\)")
}

/// `+` and `#` are control characters in the remote query parser.
pub fn sanitize_text(text: &str) -> String {
    text.replace('+', " ").replace('#', "")
}

pub fn format_selection(sel: &Selection) -> String {
    format!("{}:{}:{}:{}", sel.x1, sel.y1, sel.x2, sel.y2)
}

pub fn format_image(image: &QueryImage) -> String {
    match &image.selection {
        Some(sel) => format!("{} {}", image.image_url, format_selection(sel)),
        None => image.image_url.clone(),
    }
}

pub fn format_image_list(images: &[QueryImage]) -> String {
    images
        .iter()
        .map(format_image)
        .collect::<Vec<_>>()
        .join(" ")
}
