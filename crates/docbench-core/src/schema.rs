//! Extraction schema derived from ground truth, and the model prompt built from it.
//!
//! The model is never shown ground-truth values. It receives the shape only:
//! every leaf becomes the placeholder `"string"`, and arrays are described by
//! their first element.

use serde_json::{Map, Value};

/// Placeholder written in place of every ground-truth leaf.
pub const LEAF_PLACEHOLDER: &str = "string";

/// Document classes the model chooses `document_type` from.
pub const DOCUMENT_TYPES: &[&str] = &[
    "INVOICE",
    "RECEIPT",
    "GAS BILL",
    "ELECTRICITY BILL",
    "WATER BILL",
    "BANK STATEMENT",
    "SALARY SLIP",
    "PAYSLIP",
    "ITR FORM 16",
    "CHECK",
];

/// Replace every leaf of `ground_truth` with a type placeholder.
///
/// A non-empty array becomes a one-element array describing its first
/// element; an empty array stays empty.
///
/// # Examples
///
/// ```
/// use docbench_core::extract_schema;
/// use serde_json::json;
///
/// let gt = json!({"document_type": "INVOICE", "items": [{"qty": 2}, {"qty": 5}], "tags": []});
/// assert_eq!(
///     extract_schema(&gt),
///     json!({"document_type": "string", "items": [{"qty": "string"}], "tags": []})
/// );
/// ```
#[must_use = "returns the extraction schema"]
pub fn extract_schema(ground_truth: &Value) -> Value {
    match ground_truth {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), extract_schema(v)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.first().map(extract_schema).into_iter().collect()),
        _ => Value::String(LEAF_PLACEHOLDER.to_string()),
    }
}

/// Instruction text sent to the model together with the document image.
///
/// `ocr_text` is an optional plain-text extract offered as a cross-check.
#[must_use = "returns the extraction prompt"]
pub fn build_extraction_prompt(schema: &Value, ocr_text: Option<&str>) -> String {
    let document_types = DOCUMENT_TYPES.join(", ");
    let ocr = ocr_text.map(str::trim).unwrap_or_default();

    format!(
        r#"You are an expert document image extractor.
Analyze the image and extract data according to the schema below.
Classify the document and write the class into the "document_type" field.
The options are: {document_types}, other (use your judgement).
OCR extracted text for cross-checking (ignore if empty): {ocr}

Return ONLY valid JSON.

Schema Description:
{schema}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_leaves_become_placeholders() {
        let gt = json!({"a": 1, "b": true, "c": null, "d": "text"});
        assert_eq!(
            extract_schema(&gt),
            json!({"a": "string", "b": "string", "c": "string", "d": "string"})
        );
    }

    #[test]
    fn test_nested_arrays_use_first_element() {
        let gt = json!({"rows": [[{"x": 1}], [{"y": 2}]]});
        assert_eq!(extract_schema(&gt), json!({"rows": [[{"x": "string"}]]}));
    }

    #[test]
    fn test_schema_keeps_key_order() {
        let gt = json!({"zeta": "1", "alpha": "2"});
        let schema = extract_schema(&gt);
        let keys: Vec<&String> = schema.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_root_leaf() {
        assert_eq!(extract_schema(&json!(42)), json!("string"));
    }

    #[test]
    fn test_prompt_mentions_schema_and_types() {
        let schema = json!({"document_type": "string"});
        let prompt = build_extraction_prompt(&schema, None);
        assert!(prompt.contains(r#"{"document_type":"string"}"#));
        assert!(prompt.contains("ELECTRICITY BILL"));
        assert!(prompt.contains("Return ONLY valid JSON."));
        assert!(prompt.contains("(ignore if empty): \n"));
    }

    #[test]
    fn test_prompt_includes_ocr_hint() {
        let prompt = build_extraction_prompt(&json!({}), Some("  TOTAL 42.00\n"));
        assert!(prompt.contains("(ignore if empty): TOTAL 42.00\n"));
    }
}
