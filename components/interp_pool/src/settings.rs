//! Pool configuration.

/// Configuration applied when engines are created and contexts are
/// initialized. Plain data with defaults; the embedding host fills it from
/// its own configuration surface.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Compile procedure bodies in strict mode (unknown forms rejected at
    /// compile time).
    pub use_strict: bool,
    /// Engine expression nesting limit.
    pub max_eval_depth: usize,
    /// Source run once in every new engine, before any trust decision,
    /// with database access denied.
    pub on_init: Option<String>,
    /// Source run when a context is locked into trusted mode, inside the
    /// restricted engine.
    pub on_trusted_init: Option<String>,
    /// Source run when a context is initialized untrusted.
    pub on_untrusted_init: Option<String>,
    /// Modules registered in trusted engines before the lock, making them
    /// loadable from restricted code.
    pub trusted_modules: Vec<(String, String)>,
    /// Whether the platform can host more than one engine per session. On
    /// single-engine platforms only the held engine exists, and a second
    /// distinct context is a hard error.
    pub allow_multiple_engines: bool,
    /// Recursion limit for value conversion.
    pub max_conversion_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            use_strict: false,
            max_eval_depth: 128,
            on_init: None,
            on_trusted_init: None,
            on_untrusted_init: None,
            trusted_modules: Vec::new(),
            allow_multiple_engines: true,
            max_conversion_depth: 16,
        }
    }
}
