//! Per-cell configuration.

// ---------------------------------------------------------------------------
// CellConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`Cell`](crate::cell::Cell).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellConfig {
    /// Optional human-readable name, attached to every log line the cell emits.
    pub label: Option<String>,
    /// Emit a `trace` event for every refresh, even when nothing changed.
    pub trace_refresh: bool,
}

impl CellConfig {
    /// Create a new default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the label (builder).
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Enable or disable per-refresh tracing (builder).
    pub fn with_trace_refresh(mut self, enabled: bool) -> Self {
        self.trace_refresh = enabled;
        self
    }

    /// The label used in log output.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or("<anonymous>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config() {
        let cfg = CellConfig::default();
        assert_eq!(cfg.label, None);
        assert!(!cfg.trace_refresh);
        assert_eq!(cfg.display_label(), "<anonymous>");
    }

    #[test]
    fn builder_chain() {
        let cfg = CellConfig::new()
            .with_label("total")
            .with_trace_refresh(true);
        assert_eq!(cfg.label.as_deref(), Some("total"));
        assert!(cfg.trace_refresh);
        assert_eq!(cfg.display_label(), "total");
    }
}
