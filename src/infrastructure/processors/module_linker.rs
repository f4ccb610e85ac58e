use crate::core::models::{ImportKind, ImportRecord};
use crate::utils::{ErrorContext, KilnError, Result};
use once_cell::sync::Lazy;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    BindingPatternKind, Declaration, ExportDefaultDeclarationKind, ImportDeclarationSpecifier,
    Statement,
};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;

/// `require("x")` and `require.e("x")` as written by the linker and by CommonJS code
static REQUIRE_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(^|[^.\w$])require(\.e)?\(\s*"((?:[^"\\\n]|\\.)*)"\s*\)"#)
        .unwrap_or_else(|e| panic!("invalid require pattern: {e}"))
});

/// Dynamic `import("x")` calls as printed by codegen
static DYNAMIC_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(^|[^.\w$])import\(\s*"((?:[^"\\\n]|\\.)*)"\s*\)"#)
        .unwrap_or_else(|e| panic!("invalid import() pattern: {e}"))
});

/// `import(/* chunkName: "alarm" */ "./Alarm")` in the untransformed source
static CHUNK_NAME_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"import\(\s*/\*\s*(?:webpackChunkName|chunkName)\s*:\s*["']([^"']+)["']\s*\*/\s*["']([^"']+)["']\s*\)"#,
    )
    .unwrap_or_else(|e| panic!("invalid chunk name pattern: {e}"))
});

/// Rewrites an ES module into the body of a registry factory
/// `function (module, exports, require) { ... }`.
///
/// Imports become `require` calls with snapshot bindings, exports become
/// getters installed through `require.d`. Specifiers are left as written;
/// emission swaps them for module ids once the graph is resolved.
pub struct ModuleLinker;

#[derive(Debug, Default)]
struct LinkState {
    edits: Vec<(Span, String)>,
    exports: Vec<(String, String)>,
    next_binding: usize,
    is_esm: bool,
}

impl LinkState {
    fn binding(&mut self) -> String {
        let name = format!("__kiln_{}__", self.next_binding);
        self.next_binding += 1;
        name
    }

    fn replace(&mut self, span: Span, text: String) {
        self.edits.push((span, text));
    }

    fn export(&mut self, exported: impl Into<String>, expression: impl Into<String>) {
        self.exports.push((exported.into(), expression.into()));
    }
}

impl ModuleLinker {
    /// Link `code` (already transformed to plain JavaScript) and collect its imports.
    /// `original` is the untransformed source, used for chunk name comments.
    pub fn link(path: &Path, code: &str, original: &str) -> Result<(String, Vec<ImportRecord>)> {
        let allocator = Allocator::default();
        let source_type = SourceType::mjs();
        let parsed = Parser::new(&allocator, code, source_type).parse();

        if let Some(error) = parsed.errors.first() {
            let offset = error
                .labels
                .as_ref()
                .and_then(|labels| labels.first())
                .map(|label| label.offset())
                .unwrap_or(0);
            return Err(KilnError::transform_with_context(
                path,
                error.to_string(),
                ErrorContext::new()
                    .with_file(path.to_path_buf())
                    .at_offset(code, offset),
            ));
        }

        let mut state = LinkState::default();
        for statement in &parsed.program.body {
            Self::link_statement(statement, code, &mut state);
        }

        let linked = Self::apply(code, &state);
        let linked = Self::rewrite_dynamic_imports(&linked);
        let imports = Self::collect_imports(&linked, original);
        Ok((linked, imports))
    }

    fn link_statement(statement: &Statement, code: &str, state: &mut LinkState) {
        let text = |span: Span| code[span.start as usize..span.end as usize].to_string();

        match statement {
            Statement::ImportDeclaration(decl) => {
                state.is_esm = true;
                if decl.import_kind.is_type() {
                    state.replace(decl.span, String::new());
                    return;
                }

                let source = quote(decl.source.value.as_str());
                let specifiers = match &decl.specifiers {
                    Some(specifiers) if !specifiers.is_empty() => specifiers,
                    _ => {
                        state.replace(decl.span, format!("require({});", source));
                        return;
                    }
                };

                let binding = state.binding();
                let mut out = format!("var {} = require({});", binding, source);
                for specifier in specifiers {
                    match specifier {
                        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                            out.push_str(&format!(" var {} = require.n({});", s.local.name, binding));
                        }
                        ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                            out.push_str(&format!(" var {} = {};", s.local.name, binding));
                        }
                        ImportDeclarationSpecifier::ImportSpecifier(s) => {
                            if s.import_kind.is_type() {
                                continue;
                            }
                            out.push_str(&format!(
                                " var {} = {};",
                                s.local.name,
                                member(&binding, s.imported.name().as_str())
                            ));
                        }
                    }
                }
                state.replace(decl.span, out);
            }
            Statement::ExportNamedDeclaration(decl) => {
                state.is_esm = true;
                if decl.export_kind.is_type() {
                    state.replace(decl.span, String::new());
                    return;
                }

                if let Some(source) = &decl.source {
                    let binding = state.binding();
                    for specifier in &decl.specifiers {
                        state.export(
                            specifier.exported.name().to_string(),
                            member(&binding, specifier.local.name().as_str()),
                        );
                    }
                    state.replace(
                        decl.span,
                        format!("var {} = require({});", binding, quote(source.value.as_str())),
                    );
                    return;
                }

                if let Some(declaration) = &decl.declaration {
                    for name in Self::declared_names(declaration) {
                        state.export(name.clone(), name);
                    }
                    state.replace(decl.span, text(declaration.span()));
                    return;
                }

                for specifier in &decl.specifiers {
                    if specifier.export_kind.is_type() {
                        continue;
                    }
                    state.export(
                        specifier.exported.name().to_string(),
                        specifier.local.name().to_string(),
                    );
                }
                state.replace(decl.span, String::new());
            }
            Statement::ExportDefaultDeclaration(decl) => {
                state.is_esm = true;
                match &decl.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                        if let Some(id) = &func.id {
                            state.export("default", id.name.to_string());
                            state.replace(decl.span, text(func.span));
                        } else {
                            state.export("default", "__kiln_default__");
                            state.replace(
                                decl.span,
                                format!("var __kiln_default__ = {};", text(func.span)),
                            );
                        }
                    }
                    ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                        if let Some(id) = &class.id {
                            state.export("default", id.name.to_string());
                            state.replace(decl.span, text(class.span));
                        } else {
                            state.export("default", "__kiln_default__");
                            state.replace(
                                decl.span,
                                format!("var __kiln_default__ = {};", text(class.span)),
                            );
                        }
                    }
                    ExportDefaultDeclarationKind::TSInterfaceDeclaration(_) => {
                        state.replace(decl.span, String::new());
                    }
                    expression => {
                        state.export("default", "__kiln_default__");
                        state.replace(
                            decl.span,
                            format!("var __kiln_default__ = ({});", text(expression.span())),
                        );
                    }
                }
            }
            Statement::ExportAllDeclaration(decl) => {
                state.is_esm = true;
                if decl.export_kind.is_type() {
                    state.replace(decl.span, String::new());
                    return;
                }
                let source = quote(decl.source.value.as_str());
                match &decl.exported {
                    Some(exported) => {
                        let binding = state.binding();
                        state.export(exported.name().to_string(), binding.clone());
                        state.replace(decl.span, format!("var {} = require({});", binding, source));
                    }
                    None => {
                        state.replace(decl.span, format!("require.x(exports, require({}));", source));
                    }
                }
            }
            _ => {}
        }
    }

    fn declared_names(declaration: &Declaration) -> Vec<String> {
        match declaration {
            Declaration::VariableDeclaration(var) => var
                .declarations
                .iter()
                .flat_map(|declarator| Self::pattern_names(&declarator.id.kind))
                .collect(),
            Declaration::FunctionDeclaration(func) => {
                func.id.iter().map(|id| id.name.to_string()).collect()
            }
            Declaration::ClassDeclaration(class) => {
                class.id.iter().map(|id| id.name.to_string()).collect()
            }
            _ => Vec::new(),
        }
    }

    fn pattern_names(pattern: &BindingPatternKind) -> Vec<String> {
        match pattern {
            BindingPatternKind::BindingIdentifier(id) => vec![id.name.to_string()],
            BindingPatternKind::ObjectPattern(object) => {
                let mut names: Vec<String> = object
                    .properties
                    .iter()
                    .flat_map(|property| Self::pattern_names(&property.value.kind))
                    .collect();
                if let Some(rest) = &object.rest {
                    names.extend(Self::pattern_names(&rest.argument.kind));
                }
                names
            }
            BindingPatternKind::ArrayPattern(array) => {
                let mut names: Vec<String> = array
                    .elements
                    .iter()
                    .flatten()
                    .flat_map(|element| Self::pattern_names(&element.kind))
                    .collect();
                if let Some(rest) = &array.rest {
                    names.extend(Self::pattern_names(&rest.argument.kind));
                }
                names
            }
            BindingPatternKind::AssignmentPattern(assign) => Self::pattern_names(&assign.left.kind),
        }
    }

    fn apply(code: &str, state: &LinkState) -> String {
        let mut out = String::with_capacity(code.len() + 256);

        if state.is_esm {
            out.push_str("require.r(exports);\n");
            if !state.exports.is_empty() {
                // Later duplicates win, as with re-declared exports
                let getters: BTreeMap<&str, &str> = state
                    .exports
                    .iter()
                    .map(|(name, expr)| (name.as_str(), expr.as_str()))
                    .collect();
                let body = getters
                    .iter()
                    .map(|(name, expr)| format!("{}: function () {{ return {}; }}", quote(name), expr))
                    .collect::<Vec<_>>()
                    .join(", ");
                out.push_str(&format!("require.d(exports, {{ {} }});\n", body));
            }
        }

        let mut cursor = 0usize;
        let mut edits: Vec<&(Span, String)> = state.edits.iter().collect();
        edits.sort_by_key(|(span, _)| span.start);
        for (span, replacement) in edits {
            let (start, end) = (span.start as usize, span.end as usize);
            if start < cursor {
                continue;
            }
            out.push_str(&code[cursor..start]);
            out.push_str(replacement);
            cursor = end;
        }
        out.push_str(&code[cursor..]);
        out
    }

    fn rewrite_dynamic_imports(code: &str) -> String {
        DYNAMIC_IMPORT
            .replace_all(code, |caps: &regex::Captures| {
                format!("{}require.e(\"{}\")", &caps[1], &caps[2])
            })
            .into_owned()
    }

    /// Edges in order of first appearance in the linked body
    pub fn collect_imports(linked: &str, original: &str) -> Vec<ImportRecord> {
        let hints: BTreeMap<String, String> = CHUNK_NAME_HINT
            .captures_iter(original)
            .map(|caps| (caps[2].to_string(), caps[1].to_string()))
            .collect();

        let mut imports: Vec<ImportRecord> = Vec::new();
        for caps in REQUIRE_CALL.captures_iter(linked) {
            let specifier = caps[3].to_string();
            let kind = if caps.get(2).is_some() {
                ImportKind::Dynamic
            } else {
                ImportKind::Static
            };
            if imports.iter().any(|i| i.specifier == specifier && i.kind == kind) {
                continue;
            }
            let mut record = ImportRecord::new(specifier.clone(), kind);
            if kind == ImportKind::Dynamic {
                record.chunk_name = hints.get(&specifier).cloned();
            }
            imports.push(record);
        }
        imports
    }

    /// Swap specifiers in `require("...")` / `require.e("...")` calls through `replace`.
    /// `replace` gets the specifier and whether the call is dynamic; `None` keeps the call.
    pub fn rewrite_requires<F>(linked: &str, mut replace: F) -> String
    where
        F: FnMut(&str, bool) -> Option<String>,
    {
        REQUIRE_CALL
            .replace_all(linked, |caps: &regex::Captures| {
                let dynamic = caps.get(2).is_some();
                match replace(&caps[3], dynamic) {
                    Some(expression) => format!("{}{}", &caps[1], expression),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

fn quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value))
}

fn member(object: &str, property: &str) -> String {
    let is_identifier = !property.is_empty()
        && property
            .chars()
            .enumerate()
            .all(|(i, c)| c == '_' || c == '$' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()));
    if is_identifier {
        format!("{}.{}", object, property)
    } else {
        format!("{}[{}]", object, quote(property))
    }
}
