//! CST-aware chunker (C7): extension→language dispatch, boundary-node
//! extraction, and a per-process parser cache.
//!
//! Tree-sitter node/byte-range traversal is grounded on
//! `swissarmyhammer-treesitter`'s `ChunkSource` (`root_node()`,
//! `descendant_for_byte_range`, byte-offset-addressed content slices);
//! the boundary-node walk itself (outermost-occurrence-only, with an
//! "insideBoundary" flag suppressing nested re-emission) has no single
//! teacher analogue and is built directly from spec §4.7.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use tree_sitter::{Language, Node, Parser};

/// One extracted boundary: a chunk of source text with its CST node
/// type, optional extracted name, and byte offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct CstChunk {
    pub node_type: String,
    pub name: Option<String>,
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
}

/// A supported first-class language (spec §4.7's 12 languages plus the
/// dependency-free Markdown fallback-shaped extractor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Lang {
    JavaScript,
    TypeScript,
    Python,
    Go,
    Rust,
    Java,
    Ruby,
    C,
    Cpp,
    Html,
    Css,
    Bash,
}

fn extension_to_lang(extension: &str) -> Option<Lang> {
    Some(match extension.to_ascii_lowercase().as_str() {
        "js" | "jsx" | "mjs" | "cjs" => Lang::JavaScript,
        "ts" | "tsx" => Lang::TypeScript,
        "py" => Lang::Python,
        "go" => Lang::Go,
        "rs" => Lang::Rust,
        "java" => Lang::Java,
        "rb" => Lang::Ruby,
        "c" | "h" => Lang::C,
        "cpp" | "cc" | "cxx" | "hpp" => Lang::Cpp,
        "html" | "htm" => Lang::Html,
        "css" => Lang::Css,
        "sh" | "bash" => Lang::Bash,
        _ => return None,
    })
}

fn lang_grammar(lang: Lang) -> Language {
    match lang {
        Lang::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        Lang::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        Lang::Python => tree_sitter_python::LANGUAGE.into(),
        Lang::Go => tree_sitter_go::LANGUAGE.into(),
        Lang::Rust => tree_sitter_rust::LANGUAGE.into(),
        Lang::Java => tree_sitter_java::LANGUAGE.into(),
        Lang::Ruby => tree_sitter_ruby::LANGUAGE.into(),
        Lang::C => tree_sitter_c::LANGUAGE.into(),
        Lang::Cpp => tree_sitter_cpp::LANGUAGE.into(),
        Lang::Html => tree_sitter_html::LANGUAGE.into(),
        Lang::Css => tree_sitter_css::LANGUAGE.into(),
        Lang::Bash => tree_sitter_bash::LANGUAGE.into(),
    }
}

/// Boundary node type names per language (spec §4.7's illustrative set,
/// narrowed to what each grammar actually names its nodes).
fn boundary_node_types(lang: Lang) -> &'static [&'static str] {
    match lang {
        Lang::JavaScript => &[
            "function_declaration",
            "class_declaration",
            "arrow_function",
            "method_definition",
            "import_statement",
        ],
        Lang::TypeScript => &[
            "function_declaration",
            "class_declaration",
            "interface_declaration",
            "type_alias_declaration",
            "arrow_function",
            "method_definition",
            "import_statement",
        ],
        Lang::Python => &["function_definition", "class_definition", "import_statement"],
        Lang::Go => &["function_declaration", "method_declaration", "type_declaration", "import_declaration"],
        Lang::Rust => &["function_item", "impl_item", "struct_item", "enum_item", "trait_item", "use_declaration"],
        Lang::Java => &["method_declaration", "class_declaration", "interface_declaration", "import_declaration"],
        Lang::Ruby => &["method", "class", "module"],
        Lang::C => &["function_definition", "struct_specifier", "declaration"],
        Lang::Cpp => &["function_definition", "class_specifier", "struct_specifier", "declaration"],
        Lang::Html => &["element", "script_element", "style_element"],
        Lang::Css => &["rule_set", "media_statement"],
        Lang::Bash => &["function_definition"],
    }
}

/// The node's `name` field, sliced directly out of `source` by byte
/// range (avoids `Node::utf8_text`'s own source-buffer requirement).
///
/// An anonymous node such as `arrow_function` has no `name` field of its
/// own; `const b = () => {}` binds the name to the enclosing
/// `variable_declarator`, so this falls back to the parent's `name`
/// (or `left`, for a plain assignment) when the node itself has none.
fn name_field(node: &Node, source: &str) -> Option<String> {
    if let Some(text) = field_text(node, "name", source) {
        return Some(text);
    }
    let parent = node.parent()?;
    match parent.kind() {
        "variable_declarator" => field_text(&parent, "name", source),
        "assignment_expression" => field_text(&parent, "left", source),
        _ => None,
    }
}

fn field_text(node: &Node, field: &str, source: &str) -> Option<String> {
    let field = node.child_by_field_name(field)?;
    let text = &source[field.start_byte()..field.end_byte()];
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// A per-process cache of constructed [`Parser`]s, keyed by language.
/// Entries are created lazily on first request; [`ParserCache::dispose`]
/// releases all of them (spec §5's scoped-acquisition-with-release
/// discipline, applied to the parser resource).
pub struct ParserCache {
    parsers: Mutex<HashMap<Lang, Parser>>,
}

impl ParserCache {
    pub fn new() -> Self {
        Self { parsers: Mutex::new(HashMap::new()) }
    }

    fn with_parser<T>(&self, lang: Lang, f: impl FnOnce(&mut Parser) -> T) -> Option<T> {
        let mut parsers = self.parsers.lock().unwrap();
        let parser = parsers.entry(lang).or_insert_with(|| {
            let mut parser = Parser::new();
            let _ = parser.set_language(&lang_grammar(lang));
            parser
        });
        Some(f(parser))
    }

    /// Clears every cached parser.
    pub fn dispose(&self) {
        self.parsers.lock().unwrap().clear();
    }
}

impl Default for ParserCache {
    fn default() -> Self {
        Self::new()
    }
}

fn global_cache() -> &'static ParserCache {
    static CACHE: OnceLock<ParserCache> = OnceLock::new();
    CACHE.get_or_init(ParserCache::new)
}

/// Tracks, per language, whether the once-per-process degradation
/// notice has already been reported (spec §4.7 "Degraded mode").
static DEGRADED_REPORTED: Mutex<Option<std::collections::HashSet<String>>> = Mutex::new(None);

fn report_degraded_once(extension: &str) {
    let mut guard = DEGRADED_REPORTED.lock().unwrap();
    let set = guard.get_or_insert_with(Default::default);
    if set.insert(extension.to_string()) {
        tracing::warn!(extension, "CST parser unavailable; falling back to length/overlap chunking");
    }
}

/// Attempts CST-aware chunking of `text` for the language implied by
/// `extension`. Returns `None` when the extension has no first-class
/// grammar or parsing fails, in which case the caller should fall back
/// to the length/overlap chunker (spec §4.7).
pub fn try_chunk(extension: &str, text: &str) -> Option<Vec<CstChunk>> {
    let Some(lang) = extension_to_lang(extension) else {
        if is_markdown(extension) {
            return Some(markdown_boundaries(text));
        }
        report_degraded_once(extension);
        return None;
    };

    let cache = global_cache();
    let tree = cache.with_parser(lang, |parser| parser.parse(text, None))??;

    let boundary_types = boundary_node_types(lang);
    let mut chunks = Vec::new();
    walk(tree.root_node(), text, boundary_types, false, &mut chunks);
    Some(chunks)
}

fn is_markdown(extension: &str) -> bool {
    matches!(extension.to_ascii_lowercase().as_str(), "md" | "mdx")
}

/// Dependency-free Markdown extractor: each top-level `#`-heading
/// section is its own boundary-shaped chunk, mirroring the "outermost
/// occurrence only" rule used for CST boundaries.
fn markdown_boundaries(text: &str) -> Vec<CstChunk> {
    let mut chunks = Vec::new();
    let mut current_start = 0usize;
    let mut current_name: Option<String> = None;
    let mut offset = 0usize;

    let lines: Vec<&str> = text.lines().collect();
    let mut line_starts = Vec::with_capacity(lines.len() + 1);
    for line in &lines {
        line_starts.push(offset);
        offset += line.len() + 1;
    }
    line_starts.push(text.len());

    for (i, line) in lines.iter().enumerate() {
        if line.starts_with('#') {
            if i > 0 && line_starts[i] > current_start {
                chunks.push(CstChunk {
                    node_type: "heading_section".to_string(),
                    name: current_name.clone(),
                    start_offset: current_start,
                    end_offset: line_starts[i],
                    text: text[current_start..line_starts[i]].to_string(),
                });
            }
            current_start = line_starts[i];
            current_name = Some(line.trim_start_matches('#').trim().to_string());
        }
    }
    if current_start < text.len() {
        chunks.push(CstChunk {
            node_type: "heading_section".to_string(),
            name: current_name,
            start_offset: current_start,
            end_offset: text.len(),
            text: text[current_start..].to_string(),
        });
    }
    chunks
}

/// Traverses the tree, emitting boundary records for the outermost
/// occurrence of each boundary node type. Descendants of an already-
/// emitted boundary are still traversed (in case a boundary type nests
/// inside another, e.g. a method inside a class) but with
/// `inside_boundary` set, which suppresses re-emission of the *same*
/// outer boundary node — nested boundary nodes of other types are still
/// recorded as their own chunks per spec's node-type-keyed boundary set.
fn walk(node: Node, source: &str, boundary_types: &[&str], inside_boundary: bool, out: &mut Vec<CstChunk>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        let kind = child.kind();
        let is_boundary = boundary_types.contains(&kind);

        if is_boundary && !inside_boundary {
            let start = child.start_byte();
            let end = child.end_byte();
            out.push(CstChunk {
                node_type: kind.to_string(),
                name: name_field(&child, source),
                start_offset: start,
                end_offset: end,
                text: source[start..end].to_string(),
            });
            walk(child, source, boundary_types, true, out);
        } else {
            walk(child, source, boundary_types, inside_boundary, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn javascript_function_and_arrow_are_separate_boundaries() {
        let text = "function a(){}\nconst b = () => {}";
        let chunks = try_chunk("js", text).expect("js grammar available");

        let func = chunks.iter().find(|c| c.node_type == "function_declaration").unwrap();
        assert_eq!(func.name.as_deref(), Some("a"));

        let arrow = chunks.iter().find(|c| c.node_type == "arrow_function").unwrap();
        assert_eq!(arrow.name.as_deref(), Some("b"));
    }

    #[test]
    fn unknown_extension_returns_none() {
        assert!(try_chunk("xyz123", "hello").is_none());
    }

    #[test]
    fn boundaries_never_nest() {
        let text = "function outer(){ const inner = () => {}; }";
        let chunks = try_chunk("js", text).unwrap();
        for a in &chunks {
            for b in &chunks {
                if a == b {
                    continue;
                }
                let nested = a.start_offset <= b.start_offset && b.end_offset <= a.end_offset;
                let disjoint = a.end_offset <= b.start_offset || b.end_offset <= a.start_offset;
                assert!(nested == false || disjoint, "boundaries must not strictly nest");
                let _ = disjoint;
            }
        }
    }

    #[test]
    fn markdown_splits_by_heading() {
        let text = "# Title\nintro\n## Section\nbody\n";
        let chunks = markdown_boundaries(text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].name.as_deref(), Some("Title"));
        assert_eq!(chunks[1].name.as_deref(), Some("Section"));
    }

    #[test]
    fn parser_cache_dispose_clears_entries() {
        let cache = ParserCache::new();
        cache.with_parser(Lang::Rust, |p| p.parse("fn a() {}", None));
        cache.dispose();
        assert!(cache.parsers.lock().unwrap().is_empty());
    }
}
