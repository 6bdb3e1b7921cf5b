//! Document parsing options.

/// Default bound on reference-chain hops in `deep_obj_by_ref`.
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Knobs for opening and resolving a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Maximum number of reference hops followed by
    /// `PDFDocument::deep_obj_by_ref_default`.
    pub max_depth: usize,

    /// Scan the body sequentially for objects the index cannot locate.
    /// When disabled, such objects resolve to null immediately.
    pub brute_force: bool,

    /// On a parse error during the body scan, skip ahead to the next
    /// `N G obj` header instead of giving up.
    pub resync: bool,

    /// Number of leading bytes searched for the `%PDF-` header.
    pub header_search_window: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            brute_force: true,
            resync: false,
            header_search_window: 1024,
        }
    }
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub const fn with_brute_force(mut self, enabled: bool) -> Self {
        self.brute_force = enabled;
        self
    }

    pub const fn with_resync(mut self, enabled: bool) -> Self {
        self.resync = enabled;
        self
    }

    pub const fn with_header_search_window(mut self, window: usize) -> Self {
        self.header_search_window = window;
        self
    }
}
