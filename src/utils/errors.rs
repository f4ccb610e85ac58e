use std::path::PathBuf;
use thiserror::Error;

/// Where in a source file a diagnostic points
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub file_path: Option<PathBuf>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub code_snippet: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }

    /// Derive line/column and a three-line snippet from a byte offset
    pub fn at_offset(mut self, source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let before = &source[..offset];
        let line = before.matches('\n').count() + 1;
        let column = offset - before.rfind('\n').map(|i| i + 1).unwrap_or(0) + 1;
        let first = line.saturating_sub(2);
        let snippet = source
            .lines()
            .skip(first)
            .take(3)
            .collect::<Vec<_>>()
            .join("\n");
        self.line = Some(line);
        self.column = Some(column);
        self.code_snippet = Some(snippet);
        self
    }
}

#[derive(Error, Debug)]
pub enum KilnError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot resolve '{specifier}' imported from {}", importer.display())]
    Resolution { specifier: String, importer: PathBuf },

    #[error("Transform failed for {}: {message}", path.display())]
    Transform {
        path: PathBuf,
        message: String,
        context: Option<ErrorContext>,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Emission {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Minification failed for {artifact}: {message}")]
    Optimization { artifact: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Build generation {generation} superseded by a newer change")]
    Superseded { generation: u64 },

    #[error("Server error: {0}")]
    Server(String),
}

impl KilnError {
    pub fn resolution(specifier: impl Into<String>, importer: impl Into<PathBuf>) -> Self {
        Self::Resolution {
            specifier: specifier.into(),
            importer: importer.into(),
        }
    }

    pub fn transform(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Transform {
            path: path.into(),
            message: message.into(),
            context: None,
        }
    }

    pub fn transform_with_context(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        context: ErrorContext,
    ) -> Self {
        Self::Transform {
            path: path.into(),
            message: message.into(),
            context: Some(context),
        }
    }

    pub fn emission(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Emission {
            path: path.into(),
            source,
        }
    }

    pub fn optimization(artifact: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Optimization {
            artifact: artifact.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded { .. })
    }

    /// Format error with file, location and snippet when known
    pub fn format_detailed(&self) -> String {
        match self {
            KilnError::Transform {
                message,
                context: Some(ctx),
                path,
            } => {
                let mut output = format!("❌ Transform Error: {}", message);
                output.push_str(&format!(
                    "\n📁 File: {}",
                    ctx.file_path.as_ref().unwrap_or(path).display()
                ));
                if let (Some(line), Some(column)) = (ctx.line, ctx.column) {
                    output.push_str(&format!("\n📍 Location: line {}, column {}", line, column));
                }
                if let Some(ref snippet) = ctx.code_snippet {
                    output.push_str(&format!(
                        "\n📝 Code:\n{}",
                        Self::format_code_snippet(snippet, ctx.line)
                    ));
                }
                output
            }
            other => format!("❌ {}", other),
        }
    }

    fn format_code_snippet(snippet: &str, error_line: Option<usize>) -> String {
        let lines: Vec<&str> = snippet.lines().collect();
        // Snippets start up to one line above the error line
        let first_line = error_line.map(|l| l.saturating_sub(1).max(1)).unwrap_or(1);
        let mut output = String::new();

        for (i, line) in lines.iter().enumerate() {
            let line_num = first_line + i;
            if error_line == Some(line_num) {
                output.push_str(&format!("→ {:3} │ {}\n", line_num, line));
            } else {
                output.push_str(&format!("  {:3} │ {}\n", line_num, line));
            }
        }

        output
    }
}

pub type Result<T> = std::result::Result<T, KilnError>;

impl From<regex::Error> for KilnError {
    fn from(err: regex::Error) -> Self {
        KilnError::Config(format!("Regex error: {}", err))
    }
}

impl From<anyhow::Error> for KilnError {
    fn from(err: anyhow::Error) -> Self {
        KilnError::Server(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_message_names_specifier_and_importer() {
        let err = KilnError::resolution("@components/Missing", "/project/src/index.tsx");
        let message = err.to_string();
        assert!(message.contains("@components/Missing"));
        assert!(message.contains("/project/src/index.tsx"));
    }

    #[test]
    fn test_context_from_offset() {
        let source = "const a = 1;\nconst b = ;\nconst c = 3;";
        let offset = source.find(" ;").unwrap();
        let ctx = ErrorContext::new().at_offset(source, offset);
        assert_eq!(ctx.line, Some(2));
        assert_eq!(ctx.column, Some(10));
        assert!(ctx.code_snippet.unwrap().contains("const b"));
    }

    #[test]
    fn test_detailed_transform_format() {
        let source = "let x = (;\n";
        let ctx = ErrorContext::new().at_offset(source, 9);
        let err = KilnError::transform_with_context("src/bad.ts", "Unexpected token", ctx);
        let detailed = err.format_detailed();
        assert!(detailed.contains("Transform Error"));
        assert!(detailed.contains("src/bad.ts"));
        assert!(detailed.contains("→   1 │ let x = (;"));
    }
}
