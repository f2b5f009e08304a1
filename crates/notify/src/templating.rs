//! Minijinja template rendering for alert messages.
//!
//! Two variants exist: an HTML fragment used for mail batches and a plain
//! text body used for chat pushes. Both have built-in defaults which a
//! template directory can override with `log.html` and `log.txt`.
//!
//! Templates are plain strings, so a fresh [`minijinja::Environment`] is
//! created per render call.

use std::path::Path;

use minijinja::AutoEscape;

use logpush_core::LogEvent;

use crate::traits::NotifyError;

const HTML_TEMPLATE_FILE: &str = "log.html";
const PLAIN_TEMPLATE_FILE: &str = "log.txt";

const DEFAULT_HTML: &str = r#"<div style="font-family: monospace">
<p><b>{{ event.level }}</b> {{ event.timestamp }}{% if data_center %} [{{ data_center }}]{% endif %}</p>
<p>host: {{ event.host }}<br/>source: {{ event.source }}<br/>tags: {{ event.tags | join(", ") }}</p>
<pre>{{ event.message }}</pre>
</div>"#;

const DEFAULT_PLAIN: &str = "{{ title }}\n\n{{ event.level }} {{ event.timestamp }} {{ event.host }}\n{{ event.message }}";

/// Output flavour of a rendered event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Html,
    Plain,
}

/// Context data available to templates.
#[derive(Debug, serde::Serialize)]
struct TemplateContext<'a> {
    event: &'a LogEvent,
    title: &'a str,
    data_center: Option<&'a str>,
}

/// Renders events with minijinja.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    html: String,
    plain: String,
    data_center: Option<String>,
}

impl TemplateRenderer {
    /// Renderer with the built-in templates.
    pub fn new(data_center: Option<String>) -> Self {
        Self {
            html: DEFAULT_HTML.to_string(),
            plain: DEFAULT_PLAIN.to_string(),
            data_center,
        }
    }

    /// Renderer whose templates are read from `dir` when present there.
    ///
    /// Both templates are syntax-checked before the renderer is returned.
    pub fn from_dir(dir: Option<&Path>, data_center: Option<String>) -> Result<Self, NotifyError> {
        let mut renderer = Self::new(data_center);

        if let Some(dir) = dir {
            if let Some(html) = read_optional(&dir.join(HTML_TEMPLATE_FILE))? {
                renderer.html = html;
            }
            if let Some(plain) = read_optional(&dir.join(PLAIN_TEMPLATE_FILE))? {
                renderer.plain = plain;
            }
        }

        renderer.validate()?;
        Ok(renderer)
    }

    fn build_env(variant: Variant) -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        let html = variant == Variant::Html;
        env.set_auto_escape_callback(move |_| if html { AutoEscape::Html } else { AutoEscape::None });
        env
    }

    fn source(&self, variant: Variant) -> &str {
        match variant {
            Variant::Html => &self.html,
            Variant::Plain => &self.plain,
        }
    }

    /// Render `event` with the given variant. `title` is exposed to the
    /// template as `title`.
    pub fn render(&self, event: &LogEvent, variant: Variant, title: &str) -> Result<String, NotifyError> {
        let ctx = TemplateContext {
            event,
            title,
            data_center: self.data_center.as_deref(),
        };
        Self::build_env(variant)
            .render_str(self.source(variant), ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Check that both templates parse.
    pub fn validate(&self) -> Result<(), NotifyError> {
        for variant in [Variant::Html, Variant::Plain] {
            Self::build_env(variant)
                .template_from_str(self.source(variant))
                .map_err(|e| NotifyError::Template(e.to_string()))?;
        }
        Ok(())
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, NotifyError> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(NotifyError::Template(format!("{}: {e}", path.display()))),
    }
}
