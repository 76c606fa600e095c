//! On-disk shape of one module's fact file.
//!
//! Field names are part of the contract with the extractor. Unknown fields are
//! ignored so newer extractors can add data without breaking ingestion.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RawModule {
    pub module: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub functions: Vec<RawFunction>,
    #[serde(default)]
    pub types: Vec<RawType>,
    #[serde(default)]
    pub classes: Vec<RawClass>,
    #[serde(default)]
    pub instances: Vec<RawInstance>,
    #[serde(default)]
    pub imports: Vec<RawImport>,
}

impl RawModule {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            path: None,
            functions: Vec::new(),
            types: Vec::new(),
            classes: Vec::new(),
            instances: Vec::new(),
            imports: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
pub struct RawSpan {
    pub start_line: u32,
    #[serde(default)]
    pub start_col: u32,
    pub end_line: u32,
    #[serde(default)]
    pub end_col: u32,
}

/// Reference to a symbol, either `{"module": .., "name": ..}` or a dotted string.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(from = "RawRefRepr")]
pub struct RawSymbolRef {
    pub module: Option<String>,
    pub name: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRefRepr {
    Text(String),
    Object {
        #[serde(default)]
        module: Option<String>,
        name: String,
    },
}

impl From<RawRefRepr> for RawSymbolRef {
    fn from(repr: RawRefRepr) -> Self {
        match repr {
            RawRefRepr::Object { module, name } => Self {
                module: module.filter(|m| !m.trim().is_empty()),
                name,
            },
            RawRefRepr::Text(text) => match text.rsplit_once('.') {
                Some((module, name)) if !module.is_empty() && !name.is_empty() => Self {
                    module: Some(module.to_string()),
                    name: name.to_string(),
                },
                _ => Self {
                    module: None,
                    name: text,
                },
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFunction {
    pub name: String,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub span: Option<RawSpan>,
    #[serde(default)]
    pub arity: Option<u32>,
    #[serde(default)]
    pub branches: u32,
    #[serde(default)]
    pub match_depth: u32,
    #[serde(default)]
    pub calls: Vec<RawCall>,
    #[serde(default)]
    pub type_refs: Vec<RawTypeRef>,
    #[serde(default)]
    pub where_functions: Vec<RawFunction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCall {
    #[serde(default)]
    pub module: Option<String>,
    pub name: String,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub col: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTypeRef {
    #[serde(default)]
    pub module: Option<String>,
    pub name: String,
    #[serde(default)]
    pub relation: Option<String>,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub col: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawType {
    pub name: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub span: Option<RawSpan>,
    #[serde(default)]
    pub constructors: Vec<RawConstructor>,
    #[serde(default)]
    pub references: Vec<RawSymbolRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawConstructor {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<RawField>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawField {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub type_ref: RawSymbolRef,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawClass {
    pub name: String,
    #[serde(default)]
    pub span: Option<RawSpan>,
    #[serde(default)]
    pub methods: Vec<RawMethod>,
    #[serde(default)]
    pub superclasses: Vec<RawSymbolRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMethod {
    pub name: String,
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawInstance {
    pub class: RawSymbolRef,
    #[serde(rename = "type")]
    pub type_ref: RawSymbolRef,
    #[serde(default)]
    pub constraints: Vec<RawSymbolRef>,
    #[serde(default)]
    pub span: Option<RawSpan>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawImport {
    pub module: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub qualified: bool,
    #[serde(default)]
    pub hiding: bool,
    #[serde(default)]
    pub package: Option<String>,
    #[serde(default)]
    pub span: Option<RawSpan>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unknown_fields_are_ignored() {
        let raw: RawModule = serde_json::from_str(
            r#"{"module":"A","extractor_version":"9.1","functions":[{"name":"f","ghc_flags":[]}]}"#,
        )
        .unwrap();
        assert_eq!(raw.module, "A");
        assert_eq!(raw.functions.len(), 1);
    }

    #[test]
    fn symbol_refs_accept_dotted_strings() {
        let raw: RawField =
            serde_json::from_str(r#"{"name":"next","type":"Data.Queue.Queue"}"#).unwrap();
        assert_eq!(raw.type_ref.module.as_deref(), Some("Data.Queue"));
        assert_eq!(raw.type_ref.name, "Queue");

        let bare: RawField = serde_json::from_str(r#"{"type":"Int"}"#).unwrap();
        assert_eq!(bare.type_ref.module, None);
        assert_eq!(bare.type_ref.name, "Int");
    }

    #[test]
    fn missing_module_name_is_a_parse_error() {
        let result = serde_json::from_str::<RawModule>(r#"{"functions":[]}"#);
        assert!(result.is_err());
    }
}
