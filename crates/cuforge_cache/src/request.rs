//! Compile requests and the logical fingerprint engine.

use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use cuforge_common::Hash64;

/// In-process cache key: a 64-bit composite hash of a request's raw fields.
///
/// Derived from the source path, option string, define mapping, and preamble
/// before any preprocessing, so Tier-1 lookups touch neither the filesystem
/// nor a subprocess.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Fingerprint(Hash64);

impl Fingerprint {
    /// The underlying hash value.
    pub fn hash(self) -> Hash64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A logical kernel compile request.
///
/// Callers mutate a request through its setters between compiles; during a
/// single compile the request is treated as immutable. Each field's
/// sub-hash is cached and invalidated only by the setter that touches that
/// field, so re-fingerprinting after a small mutation rehashes just what
/// changed.
#[derive(Debug)]
pub struct CompileRequest {
    source_file: PathBuf,
    options: String,
    defines: HashMap<String, String>,
    preamble: String,
    forced_arch: Option<u32>,

    source_hash: Cell<Option<Hash64>>,
    option_hash: Cell<Option<Hash64>>,
    define_hash: Cell<Option<Hash64>>,
    preamble_hash: Cell<Option<Hash64>>,
    composite_hash: Cell<Option<Hash64>>,
}

impl CompileRequest {
    /// Creates a request for the given kernel source file with empty
    /// options, defines, and preamble.
    pub fn new(source_file: impl Into<PathBuf>) -> Self {
        Self {
            source_file: source_file.into(),
            options: String::new(),
            defines: HashMap::new(),
            preamble: String::new(),
            forced_arch: None,
            source_hash: Cell::new(None),
            option_hash: Cell::new(None),
            define_hash: Cell::new(None),
            preamble_hash: Cell::new(None),
            composite_hash: Cell::new(None),
        }
    }

    /// The kernel source file path.
    pub fn source_file(&self) -> &Path {
        &self.source_file
    }

    /// Replaces the kernel source file path.
    pub fn set_source_file(&mut self, path: impl Into<PathBuf>) {
        self.source_file = path.into();
        self.source_hash.set(None);
        self.composite_hash.set(None);
    }

    /// The request's free-form option string.
    pub fn options(&self) -> &str {
        &self.options
    }

    /// Replaces the option string.
    pub fn set_options(&mut self, options: impl Into<String>) {
        self.options = options.into();
        self.option_hash.set(None);
        self.composite_hash.set(None);
    }

    /// The define mapping. Key order is meaningless.
    pub fn defines(&self) -> &HashMap<String, String> {
        &self.defines
    }

    /// Sets one preprocessor define, replacing any previous value.
    pub fn define(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.defines.insert(name.into(), value.into());
        self.define_hash.set(None);
        self.composite_hash.set(None);
    }

    /// Removes one preprocessor define.
    pub fn undefine(&mut self, name: &str) {
        if self.defines.remove(name).is_some() {
            self.define_hash.set(None);
            self.composite_hash.set(None);
        }
    }

    /// Removes every preprocessor define.
    pub fn clear_defines(&mut self) {
        self.defines.clear();
        self.define_hash.set(None);
        self.composite_hash.set(None);
    }

    /// The request's preamble text.
    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    /// Replaces the preamble text.
    pub fn set_preamble(&mut self, preamble: impl Into<String>) {
        self.preamble = preamble.into();
        self.preamble_hash.set(None);
        self.composite_hash.set(None);
    }

    /// The forced SM generation, if any.
    pub fn forced_arch(&self) -> Option<u32> {
        self.forced_arch
    }

    /// Forces the target architecture for this request.
    ///
    /// Not part of the fingerprint: the override reshapes the final option
    /// string during preprocessing and therefore lands in the artifact hash.
    pub fn set_forced_arch(&mut self, arch: Option<u32>) {
        self.forced_arch = arch;
    }

    /// Computes the request's logical fingerprint.
    ///
    /// A pure function of the request's fields: the source *path* is hashed,
    /// not its contents, so editing the file on disk without mutating the
    /// request yields the same fingerprint for the remainder of this
    /// process. The define mapping contributes through an order-independent
    /// accumulation, making the fingerprint stable across insertion orders.
    pub fn fingerprint(&self) -> Fingerprint {
        if let Some(h) = self.composite_hash.get() {
            return Fingerprint(h);
        }
        let h = self
            .source_hash()
            .mix(self.option_hash())
            .mix(self.preamble_hash())
            .mix(self.define_hash());
        self.composite_hash.set(Some(h));
        Fingerprint(h)
    }

    fn source_hash(&self) -> Hash64 {
        if let Some(h) = self.source_hash.get() {
            return h;
        }
        let h = Hash64::from_bytes(self.source_file.to_string_lossy().as_bytes());
        self.source_hash.set(Some(h));
        h
    }

    fn option_hash(&self) -> Hash64 {
        if let Some(h) = self.option_hash.get() {
            return h;
        }
        let h = Hash64::from_bytes(self.options.as_bytes());
        self.option_hash.set(Some(h));
        h
    }

    fn preamble_hash(&self) -> Hash64 {
        if let Some(h) = self.preamble_hash.get() {
            return h;
        }
        let h = Hash64::from_bytes(self.preamble.as_bytes());
        self.preamble_hash.set(Some(h));
        h
    }

    /// Order-independent accumulation: each entry contributes the mix of its
    /// key and value hashes, contributions are summed with wrapping
    /// addition, and the sum is finalized through one more mix.
    fn define_hash(&self) -> Hash64 {
        if let Some(h) = self.define_hash.get() {
            return h;
        }
        let mut acc: u64 = 0;
        for (name, value) in &self.defines {
            let pair = Hash64::from_bytes(name.as_bytes()).mix(Hash64::from_bytes(value.as_bytes()));
            acc = acc.wrapping_add(pair.value());
        }
        let h = Hash64::from_accumulator(acc);
        self.define_hash.set(Some(h));
        h
    }
}
