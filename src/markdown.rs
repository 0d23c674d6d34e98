//! Markdown preview rendering with syntax highlighting.
//!
//! Uses comrak for CommonMark parsing and syntect for fenced code.

use std::path::Path;

use comrak::plugins::syntect::SyntectAdapter;
use comrak::{Options, Plugins, markdown_to_html_with_plugins};
use syntect::highlighting::ThemeSet;
use tracing::warn;

const FALLBACK_THEME: &str = "base16-ocean.dark";

/// Turns markdown source into an HTML fragment.
pub trait MarkdownRenderer: Send + Sync {
    fn render(&self, source: &str) -> String;
}

/// Whether a file is rendered by the markdown preview.
pub fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md") || ext.eq_ignore_ascii_case("markdown"))
}

pub struct ComrakRenderer {
    adapter: SyntectAdapter,
}

impl ComrakRenderer {
    /// Renderer highlighting code with the named syntect theme.
    ///
    /// Unknown themes fall back to the default one.
    pub fn new(theme: &str) -> Self {
        let theme = if ThemeSet::load_defaults().themes.contains_key(theme) {
            theme
        } else {
            warn!(
                "Unknown markdown theme {:?}, using {}",
                theme, FALLBACK_THEME
            );
            FALLBACK_THEME
        };

        Self {
            adapter: SyntectAdapter::new(Some(theme)),
        }
    }
}

impl Default for ComrakRenderer {
    fn default() -> Self {
        Self::new(FALLBACK_THEME)
    }
}

impl MarkdownRenderer for ComrakRenderer {
    fn render(&self, source: &str) -> String {
        let mut options = Options::default();
        options.extension.strikethrough = true;
        options.extension.table = true;
        options.extension.autolink = true;
        options.extension.tasklist = true;
        options.render.r#unsafe = false; // Don't allow raw HTML
        options.render.escape = true;

        let mut plugins = Plugins::default();
        plugins.render.codefence_syntax_highlighter = Some(&self.adapter);

        markdown_to_html_with_plugins(source, &options, &plugins)
    }
}

/// Render raw file bytes, replacing invalid UTF-8.
pub fn render_bytes(renderer: &dyn MarkdownRenderer, bytes: &[u8]) -> String {
    renderer.render(&String::from_utf8_lossy(bytes))
}
