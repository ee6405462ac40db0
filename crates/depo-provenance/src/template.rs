//! Document templates with named insertion points.
//!
//! A marker is an HTML comment on its own or inline, e.g. `<!-- TABLES_AUTO -->`.
//! Rendering replaces each marker occurrence and copies every other byte
//! unchanged. Markers without a rendered section are left in place.

use std::fmt;
use std::path::Path;

use crate::error::{ProvenanceError, Result};

/// A named insertion point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Marker {
    Tables,
    Scripts,
    Figures,
    Timestamp,
    Caveats,
}

impl Marker {
    pub const ALL: [Marker; 5] = [
        Marker::Tables,
        Marker::Scripts,
        Marker::Figures,
        Marker::Timestamp,
        Marker::Caveats,
    ];

    /// The literal text of the marker in a template.
    pub fn token(self) -> &'static str {
        match self {
            Marker::Tables => "<!-- TABLES_AUTO -->",
            Marker::Scripts => "<!-- SCRIPTS_AUTO -->",
            Marker::Figures => "<!-- FIGS_AUTO -->",
            Marker::Timestamp => "<!-- TIMESTAMP_AUTO -->",
            Marker::Caveats => "<!-- CAVEATS_AUTO -->",
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A loaded template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
}

impl Template {
    pub fn new(source: impl Into<String>) -> Self {
        Template {
            source: source.into(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(ProvenanceError::io(path))?;
        Ok(Template::new(source))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Markers present in the template, in `Marker::ALL` order.
    pub fn markers(&self) -> Vec<Marker> {
        Marker::ALL
            .into_iter()
            .filter(|m| self.source.contains(m.token()))
            .collect()
    }

    /// Substitute markers using `section`; `None` keeps the marker verbatim.
    pub fn render(&self, mut section: impl FnMut(Marker) -> Option<String>) -> String {
        let mut out = String::with_capacity(self.source.len());
        let mut rest = self.source.as_str();
        while let Some((at, marker)) = next_marker(rest) {
            out.push_str(&rest[..at]);
            match section(marker) {
                Some(text) => out.push_str(&text),
                None => out.push_str(marker.token()),
            }
            rest = &rest[at + marker.token().len()..];
        }
        out.push_str(rest);
        out
    }
}

fn next_marker(text: &str) -> Option<(usize, Marker)> {
    Marker::ALL
        .into_iter()
        .filter_map(|m| text.find(m.token()).map(|at| (at, m)))
        .min_by_key(|(at, _)| *at)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_markers_and_keeps_everything_else() {
        let template = Template::new(
            "# Data\r\n\n<!-- TABLES_AUTO -->\n\n## Figures\n<!-- FIGS_AUTO -->\n_Generated <!-- TIMESTAMP_AUTO -->_  \n",
        );
        let out = template.render(|m| match m {
            Marker::Tables => Some("- `a.tsv`".into()),
            Marker::Figures => Some("- `Fig1.pdf`".into()),
            Marker::Timestamp => Some("2026-05-01T00:00:00Z".into()),
            _ => None,
        });
        assert_eq!(
            out,
            "# Data\r\n\n- `a.tsv`\n\n## Figures\n- `Fig1.pdf`\n_Generated 2026-05-01T00:00:00Z_  \n"
        );
    }

    #[test]
    fn unrendered_markers_survive() {
        let template = Template::new("a <!-- SCRIPTS_AUTO --> b <!-- SCRIPTS_AUTO -->");
        assert_eq!(template.render(|_| None), template.source());
        assert_eq!(template.markers(), vec![Marker::Scripts]);
        assert_eq!(
            template.render(|_| Some("x".into())),
            "a x b x"
        );
    }

    #[test]
    fn no_markers_is_identity() {
        let template = Template::new("plain text, no insertion points\n");
        assert!(template.markers().is_empty());
        assert_eq!(template.render(|_| Some("never".into())), template.source());
    }
}
