use serde::{Deserialize, Serialize};
use std::fmt;

/// Synthetic key of an entity within one snapshot.
pub type EntityId = i64;

/// Human-meaningful identifier `(module, local name)`.
///
/// Ordering is module first, then local name; every deterministic result
/// ordering in the engine goes through this.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
    pub module: String,
    pub name: String,
}

impl NaturalKey {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }

    /// Split `Module.Path.name` after the last capitalized module segment.
    ///
    /// Operator names may contain dots themselves, so `Data.Map.!.` is `!.` in
    /// `Data.Map` and `Prelude..` is `.` in `Prelude`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let mut module_end = 0;
        let mut rest = text;
        loop {
            let segment_len = rest
                .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '\''))
                .unwrap_or(rest.len());
            let segment = &rest[..segment_len];
            let starts_upper = segment.chars().next().is_some_and(char::is_uppercase);
            match rest[segment_len..].strip_prefix('.') {
                Some(after) if starts_upper && !after.is_empty() => {
                    module_end = text.len() - rest.len() + segment_len;
                    rest = after;
                }
                _ => break,
            }
        }
        if module_end == 0 || rest.is_empty() {
            return None;
        }
        Some(Self::new(&text[..module_end], rest))
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.module.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.module, self.name)
        }
    }
}

/// How a caller names an entity: by synthetic id or by natural key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityRef {
    Id(EntityId),
    Key(NaturalKey),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Id(id) => write!(f, "#{id}"),
            EntityRef::Key(key) => write!(f, "{key}"),
        }
    }
}

impl From<NaturalKey> for EntityRef {
    fn from(key: NaturalKey) -> Self {
        EntityRef::Key(key)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub col: u32,
}

impl Location {
    pub const fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl Span {
    pub fn start(&self) -> Location {
        Location::new(self.start_line, self.start_col)
    }

    /// Whether `(line, col)` falls inside the span. `col == None` matches the whole line.
    pub fn contains(&self, line: u32, col: Option<u32>) -> bool {
        if line < self.start_line || line > self.end_line {
            return false;
        }
        let Some(col) = col else {
            return true;
        };
        if line == self.start_line && col < self.start_col {
            return false;
        }
        if line == self.end_line && self.end_col > 0 && col > self.end_col {
            return false;
        }
        true
    }

    pub fn line_extent(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Data,
    Record,
    Alias,
    Newtype,
    Other,
}

impl TypeKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            TypeKind::Data => "data",
            TypeKind::Record => "record",
            TypeKind::Alias => "alias",
            TypeKind::Newtype => "newtype",
            TypeKind::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "data" | "adt" | "sum" => TypeKind::Data,
            "record" | "struct" => TypeKind::Record,
            "alias" | "type" | "synonym" => TypeKind::Alias,
            "newtype" => TypeKind::Newtype,
            _ => TypeKind::Other,
        }
    }
}

/// How a type is used by the entity on the other end of a `TypeEdge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeRelation {
    FieldOf,
    ConstructorArgOf,
    ArgumentOf,
    ReturnOf,
    Contains,
    Uses,
}

impl TypeRelation {
    pub const fn as_str(self) -> &'static str {
        match self {
            TypeRelation::FieldOf => "field_of",
            TypeRelation::ConstructorArgOf => "constructor_arg_of",
            TypeRelation::ArgumentOf => "argument_of",
            TypeRelation::ReturnOf => "return_of",
            TypeRelation::Contains => "contains",
            TypeRelation::Uses => "uses",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "field" | "field_of" => TypeRelation::FieldOf,
            "constructor_arg" | "constructor_arg_of" => TypeRelation::ConstructorArgOf,
            "argument" | "arg" | "argument_of" | "param" => TypeRelation::ArgumentOf,
            "return" | "return_of" | "result" => TypeRelation::ReturnOf,
            "contains" | "nested" => TypeRelation::Contains,
            _ => TypeRelation::Uses,
        }
    }
}

/// Which table the source end of a `TypeEdge` lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeSource {
    Type,
    Function,
}

impl EdgeSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            EdgeSource::Type => "type",
            EdgeSource::Function => "function",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "type" => Some(EdgeSource::Type),
            "function" => Some(EdgeSource::Function),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: EntityId,
    pub name: String,
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub id: EntityId,
    pub module_id: EntityId,
    pub key: NaturalKey,
    pub signature: Option<String>,
    pub span: Option<Span>,
    pub arity: u32,
    pub branches: u32,
    pub match_depth: u32,
    /// Enclosing function for `where`-bound helpers.
    pub parent_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: Option<String>,
    pub type_key: NaturalKey,
    pub type_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constructor {
    pub name: String,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    pub id: EntityId,
    pub module_id: EntityId,
    pub key: NaturalKey,
    pub kind: TypeKind,
    pub span: Option<Span>,
    pub constructors: Vec<Constructor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMethod {
    pub name: String,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
    pub id: EntityId,
    pub module_id: EntityId,
    pub key: NaturalKey,
    pub span: Option<Span>,
    pub methods: Vec<ClassMethod>,
    pub superclasses: Vec<NaturalKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: EntityId,
    pub module_id: EntityId,
    pub module: String,
    pub class_key: NaturalKey,
    pub class_id: Option<EntityId>,
    pub type_key: NaturalKey,
    pub type_id: Option<EntityId>,
    pub constraints: Vec<NaturalKey>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub id: EntityId,
    pub module_id: EntityId,
    pub module: String,
    pub imported_module: String,
    /// `None` when the imported module is not part of the snapshot.
    pub imported_module_id: Option<EntityId>,
    pub alias: Option<String>,
    pub symbols: Vec<String>,
    pub qualified: bool,
    pub hiding: bool,
    pub package: Option<String>,
    pub location: Location,
}

/// A call site. `callee_id == None` is a dangling edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEdge {
    pub caller_id: EntityId,
    pub callee_id: Option<EntityId>,
    pub callee: NaturalKey,
    pub location: Location,
}

/// A type usage. `target_id == None` is a dangling edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeEdge {
    pub source: EdgeSource,
    pub source_id: EntityId,
    pub target_id: Option<EntityId>,
    pub target: NaturalKey,
    pub relation: TypeRelation,
    pub location: Location,
}

/// Everything ingested from one fact dump.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub modules: Vec<Module>,
    pub functions: Vec<Function>,
    pub types: Vec<TypeDef>,
    pub classes: Vec<Class>,
    pub instances: Vec<Instance>,
    pub imports: Vec<Import>,
    pub call_edges: Vec<CallEdge>,
    pub type_edges: Vec<TypeEdge>,
}

impl Snapshot {
    pub fn dangling_call_edges(&self) -> usize {
        self.call_edges.iter().filter(|e| e.callee_id.is_none()).count()
    }

    pub fn dangling_type_edges(&self) -> usize {
        self.type_edges.iter().filter(|e| e.target_id.is_none()).count()
    }
}
