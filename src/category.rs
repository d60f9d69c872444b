//! Question category resolution.
//!
//! The category table stores free-form type names ("Multiple Choice", "checkbox grid").
//! They are folded once into `CategoryKind`; option building and answer
//! normalization match on the kind and never on the raw string.

use tracing::warn;

/// Type name used for answers whose question carries no category.
pub const DEFAULT_TYPE_NAME: &str = "text";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CategoryKind {
    /// short answer, paragraph
    FreeText,
    /// multiple choice, dropdown
    SingleChoice,
    /// checkboxes
    MultiChoice,
    /// linear scale, rating
    Scale,
    /// multi-choice grid, checkbox grid
    Grid,
    FileUpload,
    /// date, time
    DateTime,
    /// Unresolved or unrecognised; handled like free text.
    Unknown,
}

impl CategoryKind {
    pub fn from_type_name(type_name: Option<&str>) -> Self {
        let Some(raw) = type_name else {
            return Self::Unknown;
        };
        let name = canonical_type_name(raw);
        match name.as_str() {
            "short answer" | "paragraph" => Self::FreeText,
            "multiple choice" | "dropdown" => Self::SingleChoice,
            "checkboxes" => Self::MultiChoice,
            "linear scale" | "rating" => Self::Scale,
            "multi-choice grid" | "checkbox grid" => Self::Grid,
            "file upload" => Self::FileUpload,
            "date" | "time" => Self::DateTime,
            "" | DEFAULT_TYPE_NAME => Self::Unknown,
            _ => {
                warn!(target: "category", type_name = %raw, "Unrecognised category type name; using plain-text shape");
                Self::Unknown
            }
        }
    }
}

/// Lowercased, trimmed name as stored on answers (`answer_type`).
pub fn canonical_type_name(raw: &str) -> String {
    raw.trim().to_lowercase()
}
